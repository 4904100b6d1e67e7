// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fmt;
use std::str::FromStr;

// From this library
use crate::core::errors::ParserError;

/// Device attribute a match condition inspects.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum MatchField {
    /// Canonical block device path (e.g. `/dev/sdb1`).
    Device,
    /// Device path as recorded in the mount table by external configuration.
    MtabDevice,
    /// Hardware vendor string.
    Vendor,
    /// Hardware model string.
    Model,
    /// Hardware serial number.
    Serial,
    /// Partition number, `0` for a whole device.
    Partition,
    /// File system type detected on the medium.
    FsType,
    /// File system universally unique identifier.
    Uuid,
    /// File system label.
    Label,
}

impl MatchField {
    /// Returns the field's match priority. Lower values rank higher: a rule keyed on a UUID
    /// beats a rule keyed on a file system type.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Uuid => 0,
            Self::Label => 1,
            Self::Serial => 2,
            Self::Vendor | Self::Model => 3,
            Self::Device => 4,
            Self::MtabDevice => 5,
            Self::FsType => 6,
            Self::Partition => 999,
        }
    }

    /// Returns `true` if the field describes the medium's file system rather than the device
    /// hardware.
    pub fn is_fs_specific(&self) -> bool {
        matches!(self, Self::FsType | Self::Uuid | Self::Label)
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Self::Device => "device",
            Self::MtabDevice => "mtab-device",
            Self::Vendor => "vendor",
            Self::Model => "model",
            Self::Serial => "serial",
            Self::Partition => "partition",
            Self::FsType => "fstype",
            Self::Uuid => "uuid",
            Self::Label => "label",
        };

        write!(f, "{}", keyword)
    }
}

impl FromStr for MatchField {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" => Ok(Self::Device),
            "vendor" => Ok(Self::Vendor),
            "model" => Ok(Self::Model),
            "serial" => Ok(Self::Serial),
            "partition" => Ok(Self::Partition),
            "fstype" => Ok(Self::FsType),
            "uuid" => Ok(Self::Uuid),
            "label" => Ok(Self::Label),
            _ => {
                let err_msg = format!("unknown match condition {:?}", s);
                Err(ParserError::Condition(err_msg))
            }
        }
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn match_field_uuid_outranks_everything() {
        for field in [
            MatchField::Label,
            MatchField::Serial,
            MatchField::Vendor,
            MatchField::Model,
            MatchField::Device,
            MatchField::MtabDevice,
            MatchField::FsType,
            MatchField::Partition,
        ] {
            assert!(MatchField::Uuid.priority() < field.priority());
        }
    }

    #[test]
    fn match_field_fs_specific_covers_media_identity_only() {
        assert!(MatchField::FsType.is_fs_specific());
        assert!(MatchField::Uuid.is_fs_specific());
        assert!(MatchField::Label.is_fs_specific());
        assert!(!MatchField::Device.is_fs_specific());
        assert!(!MatchField::Serial.is_fs_specific());
        assert!(!MatchField::Partition.is_fs_specific());
    }

    #[test]
    fn match_field_parses_configuration_keywords() {
        let actual = MatchField::from_str("vendor").unwrap();
        let expected = MatchField::Vendor;
        assert_eq!(actual, expected);

        let actual = MatchField::from_str("fstype").unwrap();
        let expected = MatchField::FsType;
        assert_eq!(actual, expected);

        assert!(MatchField::from_str("bus").is_err());
    }
}
