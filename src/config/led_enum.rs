// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// Keyboard LED selectable as the mount activity indicator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Led {
    /// Scroll lock LED.
    Scroll,
    /// Num lock LED.
    Num,
    /// Caps lock LED.
    Caps,
}

impl Led {
    /// Returns the LED's bit in the console LED state byte.
    pub fn bit(&self) -> u8 {
        match self {
            Self::Scroll => 0x01,
            Self::Num => 0x02,
            Self::Caps => 0x04,
        }
    }
}
