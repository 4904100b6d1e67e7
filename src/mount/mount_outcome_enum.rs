// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// How a mount attempt succeeded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MountOutcome {
    /// Mounted with the requested options.
    Mounted,
    /// The device refused writes; mounted read-only instead.
    MountedReadOnly,
}

impl MountOutcome {
    /// Returns `true` if read-only mode was forced on the mount.
    pub fn forced_read_only(&self) -> bool {
        matches!(self, Self::MountedReadOnly)
    }
}
