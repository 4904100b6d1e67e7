// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use bitflags::bitflags;

// From standard library

// From this library

bitflags! {
    /// Per-entry option bits computed from the mount-option rule table.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct EntryOptions: u32 {
        /// Mount the device as soon as it is registered, and refuse kernel-driven expiry;
        /// the mount stays up until the device is removed.
        const NO_AUTOMOUNT = 0x01;
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn entry_options_default_is_empty() {
        let actual = EntryOptions::default();
        let expected = EntryOptions::empty();
        assert_eq!(actual, expected);
    }
}
