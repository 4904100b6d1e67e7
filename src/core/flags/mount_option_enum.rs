// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use enum_iterator::Sequence;
use nix::mount::MsFlags;

// From standard library
use std::fmt;

// From this library

/// Mount option tokens with a kernel flag equivalent.
///
/// Each token in an `fstab`-style comma-separated option list either sets or clears one flag
/// bit passed to [mount(2)](https://www.man7.org/linux/man-pages/man2/mount.2.html). Tokens
/// without a flag equivalent are forwarded verbatim as filesystem-specific data (see
/// [`parse_mount_options`](crate::core::optstring::parse_mount_options)).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Sequence)]
#[non_exhaustive]
pub enum MountOption {
    /// Mount the file system read-only.
    ReadOnly,

    /// Mount the file system read-write.
    ReadWrite,

    /// Ignore Set-User-ID and Set-Group-ID permissions on files.
    NoSuid,

    /// Honour Set-User-ID and Set-Group-ID permissions on files.
    Suid,

    /// Do not allow access to device special files.
    NoDev,

    /// Allow access to device special files.
    Dev,

    /// Do not allow executing programs from the file system.
    NoExec,

    /// Allow executing programs from the file system.
    Exec,

    /// Synchronize data to disk before each write completes.
    Synchronous,

    /// Keep writes in the buffer cache.
    Asynchronous,

    /// Permit mandatory locking on files.
    MandatoryLocking,

    /// Do not permit mandatory locking on files.
    NoMandatoryLocking,

    /// Do not update file access times.
    NoAccessTime,

    /// Update file access times.
    AccessTime,

    /// Do not update directory access times.
    NoDirectoryAccessTime,

    /// Update directory access times.
    DirectoryAccessTime,
}

impl MountOption {
    /// Returns the keyword as written in an option list.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
            Self::NoSuid => "nosuid",
            Self::Suid => "suid",
            Self::NoDev => "nodev",
            Self::Dev => "dev",
            Self::NoExec => "noexec",
            Self::Exec => "exec",
            Self::Synchronous => "sync",
            Self::Asynchronous => "async",
            Self::MandatoryLocking => "mand",
            Self::NoMandatoryLocking => "nomand",
            Self::NoAccessTime => "noatime",
            Self::AccessTime => "atime",
            Self::NoDirectoryAccessTime => "nodiratime",
            Self::DirectoryAccessTime => "diratime",
        }
    }

    /// Returns the flag bit the token operates on.
    pub fn flag(&self) -> MsFlags {
        match self {
            Self::ReadOnly | Self::ReadWrite => MsFlags::MS_RDONLY,
            Self::NoSuid | Self::Suid => MsFlags::MS_NOSUID,
            Self::NoDev | Self::Dev => MsFlags::MS_NODEV,
            Self::NoExec | Self::Exec => MsFlags::MS_NOEXEC,
            Self::Synchronous | Self::Asynchronous => MsFlags::MS_SYNCHRONOUS,
            Self::MandatoryLocking | Self::NoMandatoryLocking => MsFlags::MS_MANDLOCK,
            Self::NoAccessTime | Self::AccessTime => MsFlags::MS_NOATIME,
            Self::NoDirectoryAccessTime | Self::DirectoryAccessTime => MsFlags::MS_NODIRATIME,
        }
    }

    /// Returns `true` if the token sets its flag bit, `false` if it clears it.
    pub fn sets_flag(&self) -> bool {
        matches!(
            self,
            Self::ReadOnly
                | Self::NoSuid
                | Self::NoDev
                | Self::NoExec
                | Self::Synchronous
                | Self::MandatoryLocking
                | Self::NoAccessTime
                | Self::NoDirectoryAccessTime
        )
    }

    /// Converts a keyword to its corresponding `MountOption`.
    ///
    /// Returns `None` if the keyword has no kernel flag equivalent.
    pub fn from_keyword(keyword: &str) -> Option<MountOption> {
        enum_iterator::all::<MountOption>().find(|option| option.keyword() == keyword)
    }
}

impl fmt::Display for MountOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn mount_option_keywords_round_trip() {
        for option in enum_iterator::all::<MountOption>() {
            let actual = MountOption::from_keyword(option.keyword());
            let expected = Some(option);
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn mount_option_recognizes_no_unknown_keyword() {
        let actual = MountOption::from_keyword("loop");
        let expected = None;
        assert_eq!(actual, expected);
    }

    #[test]
    fn mount_option_paired_tokens_share_a_flag_bit() {
        let pairs = [
            (MountOption::ReadOnly, MountOption::ReadWrite),
            (MountOption::NoSuid, MountOption::Suid),
            (MountOption::NoDev, MountOption::Dev),
            (MountOption::NoExec, MountOption::Exec),
            (MountOption::Synchronous, MountOption::Asynchronous),
            (MountOption::MandatoryLocking, MountOption::NoMandatoryLocking),
            (MountOption::NoAccessTime, MountOption::AccessTime),
            (
                MountOption::NoDirectoryAccessTime,
                MountOption::DirectoryAccessTime,
            ),
        ];

        for (setter, clearer) in pairs {
            assert_eq!(setter.flag(), clearer.flag());
            assert!(setter.sets_flag());
            assert!(!clearer.sets_flag());
        }
    }
}
