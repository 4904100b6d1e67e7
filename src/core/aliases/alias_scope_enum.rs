// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library
use crate::core::flags::AliasFlags;

/// Selects which aliases an operation applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AliasScope {
    /// Aliases derived from device hardware identity only.
    NonSpecific,
    /// Aliases derived from on-media identity only.
    FsSpecific,
    /// Every alias.
    All,
}

impl AliasScope {
    /// Returns `true` if an alias carrying `flags` falls within the scope.
    pub fn includes(&self, flags: AliasFlags) -> bool {
        match self {
            Self::All => true,
            Self::FsSpecific => flags.contains(AliasFlags::FS_SPECIFIC),
            Self::NonSpecific => !flags.contains(AliasFlags::FS_SPECIFIC),
        }
    }
}
