// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fmt;

// From this library

/// Identity keys recognised on the hotplug channel and in udev property bags.
///
/// Anything else is ignored.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum IdentityKey {
    /// Kernel device path relative to `/sys`.
    DevPath,
    /// Hardware vendor string.
    Vendor,
    /// Hardware model string.
    Model,
    /// Hardware serial number.
    Serial,
    /// Detected file system type.
    FsType,
    /// File system UUID.
    FsUuid,
    /// File system label.
    FsLabel,
    /// File system label, legacy sanitised spelling.
    FsLabelLegacy,
}

impl IdentityKey {
    /// Maps a `KEY=VALUE` key to its identity slot, `None` for unrecognised keys.
    pub fn from_key(key: &str) -> Option<IdentityKey> {
        match key {
            "DEVPATH" => Some(Self::DevPath),
            "ID_VENDOR" => Some(Self::Vendor),
            "ID_MODEL" => Some(Self::Model),
            "ID_SERIAL" => Some(Self::Serial),
            "ID_FS_TYPE" => Some(Self::FsType),
            "ID_FS_UUID" => Some(Self::FsUuid),
            "ID_FS_LABEL" => Some(Self::FsLabel),
            "ID_FS_LABEL_SAFE" => Some(Self::FsLabelLegacy),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            Self::DevPath => "DEVPATH",
            Self::Vendor => "ID_VENDOR",
            Self::Model => "ID_MODEL",
            Self::Serial => "ID_SERIAL",
            Self::FsType => "ID_FS_TYPE",
            Self::FsUuid => "ID_FS_UUID",
            Self::FsLabel => "ID_FS_LABEL",
            Self::FsLabelLegacy => "ID_FS_LABEL_SAFE",
        };

        write!(f, "{}", key)
    }
}
