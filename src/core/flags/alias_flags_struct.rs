// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use bitflags::bitflags;

// From standard library

// From this library

bitflags! {
    /// Classification bits of a mountpoint alias.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct AliasFlags: u8 {
        /// The alias is derived from on-media identity (label, UUID, file system type), as
        /// opposed to device hardware identity (model, serial).
        const FS_SPECIFIC = 0x01;

        /// The alias was declared by external permanent configuration and survives attribute
        /// resets when a device is re-added.
        const PERMANENT = 0x02;

        /// Transient sweep marker: set on surviving aliases before a re-probe, cleared on the
        /// ones the re-probe emits again, then everything still marked is collected.
        const STALE = 0x04;
    }
}
