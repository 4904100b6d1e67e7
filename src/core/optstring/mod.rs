// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Low-level functions to manipulate mount option strings.

// From dependency library
use nix::mount::MsFlags;

// From standard library

// From this library
use crate::core::flags::MountOption;

/// Option keywords that only have meaning to `mount(8)` or `fstab(5)` and must not reach the
/// kernel, neither as a flag nor as data.
const DISCARDED_KEYWORDS: [&str; 6] = ["auto", "noauto", "user", "nouser", "users", "nousers"];

/// Splits an `fstab`-style comma-separated option list into the flag bits understood by
/// [mount(2)](https://www.man7.org/linux/man-pages/man2/mount.2.html) and the residual
/// filesystem-specific data string.
///
/// Tokens with a flag equivalent set or clear their bit in encounter order (`ro,rw` ends up
/// read-write). Keywords only meaningful to `mount(8)` (`auto`, `noauto`, `user`, `nouser`,
/// `users`, `nousers`, `fs=*`) are discarded. Everything else is forwarded verbatim,
/// comma-separated, as mount data.
///
/// # Examples
///
/// ```
/// # use pretty_assertions::assert_eq;
/// use nix::mount::MsFlags;
/// use rsmediad::core::optstring;
///
/// fn main() {
///     let (flags, data) = optstring::parse_mount_options("nosuid,nodev,utf8");
///
///     let expected = MsFlags::MS_NOSUID | MsFlags::MS_NODEV;
///     assert_eq!(flags, expected);
///     assert_eq!(data, "utf8");
/// }
/// ```
pub fn parse_mount_options(options: &str) -> (MsFlags, String) {
    let mut flags = MsFlags::empty();
    let mut data = String::new();

    for token in options.split(',') {
        if token.is_empty() {
            continue;
        }

        if let Some(option) = MountOption::from_keyword(token) {
            if option.sets_flag() {
                flags.insert(option.flag());
            } else {
                flags.remove(option.flag());
            }
        } else if DISCARDED_KEYWORDS.contains(&token) || token.starts_with("fs=") {
            log::debug!("parse_mount_options discarding token {:?}", token);
        } else {
            if !data.is_empty() {
                data.push(',');
            }
            data.push_str(token);
        }
    }

    (flags, data)
}

/// Reassembles an option list from flag bits and a residual data string.
///
/// The output, fed back through [`parse_mount_options`], yields the same flag set and the
/// same data string.
///
/// # Examples
///
/// ```
/// # use pretty_assertions::assert_eq;
/// use nix::mount::MsFlags;
/// use rsmediad::core::optstring;
///
/// fn main() {
///     let flags = MsFlags::MS_RDONLY | MsFlags::MS_NOSUID;
///
///     let actual = optstring::encode_mount_options(flags, "umask=077");
///     let expected = "ro,nosuid,umask=077";
///     assert_eq!(actual, expected);
/// }
/// ```
pub fn encode_mount_options(flags: MsFlags, data: &str) -> String {
    let mut options = String::new();

    for option in enum_iterator::all::<MountOption>() {
        if option.sets_flag() && flags.contains(option.flag()) {
            if !options.is_empty() {
                options.push(',');
            }
            options.push_str(option.keyword());
        }
    }

    if !data.is_empty() {
        if !options.is_empty() {
            options.push(',');
        }
        options.push_str(data);
    }

    options
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn parse_mount_options_maps_tokens_to_flag_bits() {
        let (flags, data) = parse_mount_options("ro,nosuid,nodev,noexec,sync,mand,noatime,nodiratime");

        let expected = MsFlags::MS_RDONLY
            | MsFlags::MS_NOSUID
            | MsFlags::MS_NODEV
            | MsFlags::MS_NOEXEC
            | MsFlags::MS_SYNCHRONOUS
            | MsFlags::MS_MANDLOCK
            | MsFlags::MS_NOATIME
            | MsFlags::MS_NODIRATIME;
        assert_eq!(flags, expected);
        assert_eq!(data, "");
    }

    #[test]
    fn parse_mount_options_later_tokens_clear_earlier_bits() {
        let (flags, data) = parse_mount_options("ro,rw,nosuid,suid");

        let expected = MsFlags::empty();
        assert_eq!(flags, expected);
        assert_eq!(data, "");
    }

    #[test]
    fn parse_mount_options_discards_userspace_keywords() {
        let (flags, data) = parse_mount_options("auto,noauto,user,nouser,users,nousers,fs=subfs");

        assert_eq!(flags, MsFlags::empty());
        assert_eq!(data, "");
    }

    #[test]
    fn parse_mount_options_forwards_unknown_tokens_as_data() {
        let (flags, data) = parse_mount_options("nosuid,umask=077,shortname=mixed");

        assert_eq!(flags, MsFlags::MS_NOSUID);
        assert_eq!(data, "umask=077,shortname=mixed");
    }

    #[test]
    fn parse_mount_options_accepts_an_empty_list() {
        let (flags, data) = parse_mount_options("");

        assert_eq!(flags, MsFlags::empty());
        assert_eq!(data, "");
    }

    #[test]
    fn optstring_parse_then_encode_round_trips() {
        let list = "ro,nosuid,nodev,umask=077,codepage=850";
        let (flags, data) = parse_mount_options(list);

        let encoded = encode_mount_options(flags, &data);
        let (reparsed_flags, reparsed_data) = parse_mount_options(&encoded);

        assert_eq!(reparsed_flags, flags);
        assert_eq!(reparsed_data, data);
    }
}
