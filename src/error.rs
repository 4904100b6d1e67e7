// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Library-level error module.

// From dependency library
use thiserror::Error;

// From standard library

// From this library
use crate::autofs::AutofsError;
use crate::core::errors::CommandError;
use crate::core::errors::ParserError;
use crate::daemon::DaemonError;
use crate::mount::MountError;
use crate::mount::UnmountError;

/// A specialized [`Result`](std::result::Result) type for `rsmediad`.
///
/// This typedef is generally used at the program-level to avoid writing out [`RsMediadError`]
/// directly, and is, otherwise, a direct mapping to [`Result`](std::result::Result).
#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, RsMediadError>;

/// Library-level runtime errors.
///
/// This enum includes all variants of error types susceptible to occur in the library. Other,
/// more granular error types, are automatically converted to `RsMediadError` when needed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RsMediadError {
    #[error(transparent)]
    Autofs(#[from] AutofsError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Unmount(#[from] UnmountError),
}
