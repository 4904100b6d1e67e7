// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Miscellaneous utilities.

// From dependency library

// From standard library
use std::sync::atomic::{AtomicBool, Ordering};

// From this library

/// Characters replaced by `_` in values received from the hotplug channel, besides ASCII
/// control characters.
const UNTRUSTED_CHARS: &str = "!\"&'()*;<>[\\]^`{|}~";

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Marks the process as shutting down. Teardown failures that are expected while the mount
/// namespace is being dismantled are demoted to debug messages from this point on.
pub fn begin_shutdown() {
    SHUTTING_DOWN.store(true, Ordering::SeqCst);
}

/// Returns `true` once [`begin_shutdown`] has been called.
pub fn shutting_down() -> bool {
    SHUTTING_DOWN.load(Ordering::SeqCst)
}

/// Replaces ASCII control characters and shell metacharacters by `_`.
///
/// Values arriving over the hotplug channel end up in file names under the automount root and
/// in log lines; they are scrubbed before anything else looks at them.
///
/// # Examples
///
/// ```
/// # use pretty_assertions::assert_eq;
/// use rsmediad::core::utils;
///
/// fn main() {
///     let actual = utils::scrub_untrusted_chars("ID_MODEL=Yoyodyne `rm -rf`");
///     let expected = "ID_MODEL=Yoyodyne _rm -rf_";
///     assert_eq!(actual, expected);
/// }
/// ```
pub fn scrub_untrusted_chars(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_control() || UNTRUSTED_CHARS.contains(c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Packs a kernel version triple the way `KERNEL_VERSION()` does.
pub const fn kernel_version(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 16) + (minor << 8) + patch
}

/// Parses a `uname -r` release string (`"6.8.0-31-generic"`) into a packed version code.
///
/// Missing components count as zero; a release that does not start with a number yields `0`.
pub fn parse_kernel_release(release: &str) -> u32 {
    let mut components = release
        .split('.')
        .map(|part| {
            part.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<u32>()
                .unwrap_or(0)
        })
        .chain(std::iter::repeat(0));

    let major = components.next().unwrap_or(0);
    let minor = components.next().unwrap_or(0);
    let patch = components.next().unwrap_or(0);

    kernel_version(major, minor, patch)
}

/// Returns the running kernel's packed version code, `0` if it cannot be determined.
pub fn linux_version_code() -> u32 {
    match nix::sys::utsname::uname() {
        Ok(info) => parse_kernel_release(&info.release().to_string_lossy()),
        Err(e) => {
            log::debug!("linux_version_code uname failed: {}", e);

            0
        }
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn scrub_untrusted_chars_keeps_benign_values() {
        let value = "SanDisk Cruzer_2.0 (rev-1)";
        let actual = scrub_untrusted_chars(value);
        let expected = "SanDisk Cruzer_2.0 _rev-1_";
        assert_eq!(actual, expected);
    }

    #[test]
    fn scrub_untrusted_chars_replaces_control_characters() {
        let actual = scrub_untrusted_chars("a\x07b\tc");
        let expected = "a_b_c";
        assert_eq!(actual, expected);
    }

    #[test]
    fn scrub_untrusted_chars_replaces_shell_metacharacters() {
        let actual = scrub_untrusted_chars("$(true);`false`|x&y");
        let expected = "$_true___false__x_y";
        assert_eq!(actual, expected);

        let actual = scrub_untrusted_chars("a;b|c`d");
        let expected = "a_b_c_d";
        assert_eq!(actual, expected);
    }

    #[test]
    fn parse_kernel_release_handles_distribution_suffixes() {
        let actual = parse_kernel_release("6.8.0-31-generic");
        let expected = kernel_version(6, 8, 0);
        assert_eq!(actual, expected);
    }

    #[test]
    fn parse_kernel_release_pads_missing_components() {
        let actual = parse_kernel_release("5.4");
        let expected = kernel_version(5, 4, 0);
        assert_eq!(actual, expected);

        let actual = parse_kernel_release("5");
        let expected = kernel_version(5, 0, 0);
        assert_eq!(actual, expected);
    }

    #[test]
    fn kernel_version_orders_releases() {
        assert!(kernel_version(3, 3, 0) > kernel_version(3, 2, 36));
        assert!(kernel_version(4, 0, 0) > kernel_version(3, 19, 8));
    }
}
