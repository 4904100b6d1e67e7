// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// Configuration file parser runtime errors.
///
/// A parse error invalidates one line; the remaining lines of the file are still loaded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParserError {
    /// Error while reading a keyword.
    #[error("{0}")]
    Keyword(String),

    /// Error while reading a quoted or bare string value.
    #[error("{0}")]
    Value(String),

    /// Error while reading a `=` assignment.
    #[error("{0}")]
    Assignment(String),

    /// Error while reading a boolean value.
    #[error("{0}")]
    Boolean(String),

    /// Error while reading a positive integer value.
    #[error("{0}")]
    Number(String),

    /// Error while reading a keyboard LED name.
    #[error("{0}")]
    Led(String),

    /// Error while reading a match condition list.
    #[error("{0}")]
    Condition(String),
}
