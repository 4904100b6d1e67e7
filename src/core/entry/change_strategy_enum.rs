// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// How media changes are detected on a device.
///
/// The kernel notices media changes reliably, but only optical drives expose the result
/// through a dedicated ioctl. PC floppy drives keep a generation counter in their drive
/// status. For everything else there is no usable interface, so a change is conservatively
/// assumed on every check.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChangeStrategy {
    /// Not probed yet; the first check picks a strategy and memoises it.
    #[default]
    Unknown,
    /// No usable detection interface; always report a change.
    None,
    /// `CDROM_MEDIA_CHANGED` ioctl.
    Optical,
    /// Drive status generation counter, compared against the last seen value.
    LegacyFloppy {
        /// Generation counter at the previous check.
        generation: i32,
    },
}
