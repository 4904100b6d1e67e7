// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The mount executor: mount(2) invocation, per-filesystem helper binaries, forced
//! read-only fallback.

// From dependency library
use nix::errno::Errno;
use nix::mount::MsFlags;
use once_cell::sync::Lazy;

// From standard library
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// From this library
use crate::core::optstring;
use crate::core::rules::RuleSet;
use crate::mtab;

pub use mount_error_enum::MountError;
pub use mount_outcome_enum::MountOutcome;
pub use unmount_error_enum::UnmountError;

mod mount_error_enum;
mod mount_outcome_enum;
mod unmount_error_enum;

const SBIN_DIRS: [&str; 3] = ["/sbin", "/usr/sbin", "/usr/local/sbin"];

#[derive(Debug)]
struct MountHelper {
    fstype: String,
    binary: PathBuf,
}

/// `mount.<fstype>` helpers found in the sbin directories. Scanned once, at first use.
static MOUNT_HELPERS: Lazy<Vec<MountHelper>> = Lazy::new(discover_mount_helpers);

fn discover_mount_helpers() -> Vec<MountHelper> {
    let mut helpers = Vec::new();

    for dir in SBIN_DIRS {
        let Ok(listing) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in listing.flatten() {
            let name = entry.file_name();
            let Some(fstype) = name.to_string_lossy().strip_prefix("mount.").map(String::from)
            else {
                continue;
            };

            let binary = entry.path();
            log::debug!(
                "discover_mount_helpers found mount helper {} for fstype {}",
                binary.display(),
                fstype
            );
            helpers.push(MountHelper { fstype, binary });
        }
    }

    helpers
}

fn find_mount_helper(fstype: &str) -> Option<&'static Path> {
    MOUNT_HELPERS
        .iter()
        .find(|helper| helper.fstype == fstype)
        .map(|helper| helper.binary.as_path())
}

fn call_mount_helper(
    helper: &Path,
    device: &str,
    path: &Path,
    options: &str,
) -> Result<MountOutcome, MountError> {
    log::debug!(
        "call_mount_helper calling {} {} {} -o {}",
        helper.display(),
        device,
        path.display(),
        options
    );

    let status = Command::new(helper)
        .arg(device)
        .arg(path)
        .arg("-o")
        .arg(options)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| MountError::HelperSpawn {
            helper: helper.display().to_string(),
            source: e,
        })?;

    log::debug!("call_mount_helper helper returned {}", status);
    if status.success() {
        Ok(MountOutcome::Mounted)
    } else {
        Err(MountError::Helper {
            helper: helper.display().to_string(),
            status: status.code().unwrap_or(-1),
        })
    }
}

fn kernel_mount(
    device: &str,
    path: &Path,
    fstype: &str,
    flags: MsFlags,
    data: &str,
) -> nix::Result<()> {
    let data = if data.is_empty() { None } else { Some(data) };

    nix::mount::mount(Some(device), path, Some(fstype), flags, data)
}

/// Mounts `device` on `path`.
///
/// The file system type may be substituted by a configured replacement. If a
/// `mount.<fstype>` helper binary exists it runs the mount; otherwise the option list is
/// split into flag bits and data and handed to mount(2) directly. A device that rejects the
/// first attempt with `EROFS` is retried read-only.
pub fn call_mount(
    device: &str,
    path: &Path,
    fstype: &str,
    options: &str,
    rules: &RuleSet,
) -> Result<MountOutcome, MountError> {
    let fstype = match rules.replacement_for(fstype) {
        Some(replacement) => {
            log::debug!("call_mount replacing fstype {} by {}", fstype, replacement);
            replacement
        }
        None => fstype,
    };

    if let Some(helper) = find_mount_helper(fstype) {
        return call_mount_helper(helper, device, path, options);
    }

    let (mut flags, data) = optstring::parse_mount_options(options);

    match kernel_mount(device, path, fstype, flags, &data) {
        Ok(()) => {
            mtab::add(device, path, fstype, options);
            Ok(MountOutcome::Mounted)
        }
        Err(Errno::EROFS) => {
            flags.insert(MsFlags::MS_RDONLY);
            match kernel_mount(device, path, fstype, flags, &data) {
                Ok(()) => {
                    mtab::add(device, path, fstype, options);
                    Ok(MountOutcome::MountedReadOnly)
                }
                Err(e) => Err(MountError::Syscall {
                    device: device.to_owned(),
                    source: e,
                }),
            }
        }
        Err(e) => Err(MountError::Syscall {
            device: device.to_owned(),
            source: e,
        }),
    }
}
