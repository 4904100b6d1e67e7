// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::path::{Path, PathBuf};

// From this library
use crate::core::flags::AliasFlags;

/// An alternative name for a mountpoint under the automount root.
///
/// The `name` may still contain a `%u` uniquifier placeholder; `created` holds the on-disk
/// symlink path once the alias is materialised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Alias {
    name: String,
    flags: AliasFlags,
    created: Option<PathBuf>,
}

impl Alias {
    pub(super) fn new(name: String, flags: AliasFlags) -> Alias {
        Self {
            name,
            flags,
            created: None,
        }
    }

    /// Returns the alias name (partition placeholders already expanded).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the alias classification bits.
    pub fn flags(&self) -> AliasFlags {
        self.flags
    }

    /// Returns the on-disk symlink path, if the alias has been materialised.
    pub fn created(&self) -> Option<&Path> {
        self.created.as_deref()
    }

    pub(super) fn flags_mut(&mut self) -> &mut AliasFlags {
        &mut self.flags
    }

    pub(super) fn set_created(&mut self, path: Option<PathBuf>) {
        self.created = path;
    }
}
