// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fmt;
use std::str::FromStr;

// From this library
use crate::core::errors::ParserError;

/// Comparison operator of a match condition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MatchOp {
    /// Attribute equals the literal (`==`).
    Equals,
    /// Attribute differs from the literal (`!=`).
    Differs,
}

impl MatchOp {
    /// Applies the operator to the raw equality outcome of an atom.
    pub fn apply(&self, is_equal: bool) -> bool {
        match self {
            Self::Equals => is_equal,
            Self::Differs => !is_equal,
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Equals => "==",
            Self::Differs => "!=",
        };

        write!(f, "{}", symbol)
    }
}

impl FromStr for MatchOp {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Equals),
            "!=" => Ok(Self::Differs),
            _ => {
                let err_msg = format!("bad match operator {:?} (expected `==` or `!=`)", s);
                Err(ParserError::Condition(err_msg))
            }
        }
    }
}
