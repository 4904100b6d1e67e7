// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// Command channel runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// The peer sent a command byte other than `+` or `-`.
    #[error("bad command {0:?}")]
    BadCommand(char),

    /// A length-prefixed string did not decode as UTF-8.
    #[error("malformed string in command frame: {0}")]
    Encoding(String),

    /// The peer closed the connection in the middle of a frame.
    #[error("truncated command frame")]
    Truncated,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// A string exceeds the 16-bit length prefix.
    #[error("string too long for command frame ({0} bytes)")]
    Oversized(usize),
}
