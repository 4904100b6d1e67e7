// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Medium presence and media-change detection.
//!
//! The kernel notices media changes reliably but only optical drives expose the result to
//! userspace, through `CDROM_MEDIA_CHANGED`. PC floppy drives keep a generation counter in
//! their drive status. Everything else gets the conservative strategy: assume a change on
//! every check.

// From dependency library
use libc::c_int;
use nix::errno::Errno;

// From standard library
use std::fs::File;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

// From this library
use crate::core::aliases::AliasScope;
use crate::core::entry::{ChangeStrategy, EntryState, MountEntry};
use crate::core::flags::AliasFlags;
use crate::probe;
use crate::registry::registry_struct::{add_label_alias, add_rule_aliases, add_uuid_alias};
use crate::registry::Registry;

const CDROM_MEDIA_CHANGED: libc::c_ulong = 0x5325;

/// Drive status block of the PC floppy driver, `<linux/fd.h>`.
#[repr(C)]
#[derive(Clone, Copy)]
struct FloppyDriveStruct {
    flags: libc::c_ulong,
    spinup_date: libc::c_ulong,
    select_date: libc::c_ulong,
    first_read_date: libc::c_ulong,
    probed_format: libc::c_short,
    track: libc::c_short,
    maxblock: libc::c_short,
    maxtrack: libc::c_short,
    generation: c_int,
    keep_data: c_int,
    fd_ref: c_int,
    fd_device: c_int,
    last_checked: c_int,
    dmabuf: *mut libc::c_char,
    bufblocks: c_int,
}

nix::ioctl_read!(floppy_drive_status, 2, 0x12, FloppyDriveStruct);

fn is_no_medium_raw(code: i32) -> bool {
    matches!(
        code,
        libc::ENOMEDIUM | libc::ENXIO | libc::ENODEV | libc::EIO
    )
}

/// Returns `true` for the errno values that mean "no medium in the drive".
pub fn is_no_medium(errno: Errno) -> bool {
    is_no_medium_raw(errno as i32)
}

/// Probes medium presence by opening the device node. Open failures outside the no-medium
/// set still count as "present" — the device exists, it just refused us.
pub fn device_openable(device: &str) -> bool {
    match File::open(device) {
        Ok(_) => true,
        Err(e) => !e.raw_os_error().map(is_no_medium_raw).unwrap_or(false),
    }
}

fn optical_changed(fd: RawFd) -> nix::Result<bool> {
    let result = Errno::result(unsafe { libc::ioctl(fd, CDROM_MEDIA_CHANGED, 0) })?;

    Ok(result == 1)
}

fn floppy_generation(fd: RawFd) -> nix::Result<c_int> {
    let mut status = MaybeUninit::<FloppyDriveStruct>::zeroed();
    unsafe { floppy_drive_status(fd, status.as_mut_ptr()) }?;

    Ok(unsafe { status.assume_init() }.generation)
}

impl Registry {
    /// Runs the medium state machine before an on-demand mount.
    ///
    /// Partition entries delegate to their whole-device entry: a medium change makes the
    /// kernel re-read the partition table, so partitions see removal and re-addition events
    /// instead. When a change is detected the attributes are re-probed and the
    /// filesystem-specific aliases refreshed.
    pub(crate) fn check_medium_change(&self, entry: &Arc<MountEntry>, state: &mut EntryState) {
        if let Some(weak) = state.parent.clone() {
            let _ = self.with_parent(&weak, |parent, parent_state| {
                self.medium_step(parent, parent_state)
            });
        } else {
            self.medium_step(entry, state);
        }
    }

    fn medium_step(&self, entry: &Arc<MountEntry>, state: &mut EntryState) {
        if !state.medium_present {
            if device_openable(entry.device()) {
                log::debug!("{}: medium now present, assuming changed", entry.device());
                state.medium_present = true;
                state.medium_changed = true;
            } else {
                log::debug!("{}: still no medium", entry.device());
            }
        } else if !state.medium_changed {
            state.medium_changed = self.detect_change(entry, state);
            if state.medium_changed {
                log::debug!("{}: change detected", entry.device());
            } else {
                log::debug!("{}: no change detected", entry.device());
            }
        } else {
            log::debug!("{}: was already marked as changed", entry.device());
        }

        if state.medium_present && state.medium_changed {
            self.refresh_fs_aliases(entry, state);
            state.medium_changed = false;
        }
    }

    fn detect_change(&self, entry: &Arc<MountEntry>, state: &mut EntryState) -> bool {
        let device = match File::open(entry.device()) {
            Ok(device) => device,
            Err(e) => {
                if e.raw_os_error().map(is_no_medium_raw).unwrap_or(false) {
                    self.mark_no_medium(entry, state);
                }
                log::debug!("detect_change({}): open failed: {}", entry.device(), e);
                return false;
            }
        };
        let fd = device.as_raw_fd();

        match state.change_strategy {
            ChangeStrategy::Unknown => {
                if let Ok(changed) = optical_changed(fd) {
                    state.change_strategy = ChangeStrategy::Optical;
                    changed
                } else if let Ok(generation) = floppy_generation(fd) {
                    state.change_strategy = ChangeStrategy::LegacyFloppy { generation };
                    generation != 0
                } else {
                    state.change_strategy = ChangeStrategy::None;
                    true
                }
            }
            ChangeStrategy::None => true,
            ChangeStrategy::Optical => optical_changed(fd).unwrap_or(true),
            ChangeStrategy::LegacyFloppy { generation } => match floppy_generation(fd) {
                Ok(current) if current == generation => false,
                Ok(current) => {
                    state.change_strategy = ChangeStrategy::LegacyFloppy { generation: current };
                    true
                }
                Err(_) => true,
            },
        }
    }

    /// Marks the medium as gone, tearing down the filesystem-specific aliases. Partition
    /// entries redirect to their whole-device entry.
    pub(crate) fn set_no_medium(&self, entry: &Arc<MountEntry>, state: &mut EntryState) {
        if let Some(weak) = state.parent.clone() {
            let _ = self.with_parent(&weak, |parent, parent_state| {
                self.mark_no_medium(parent, parent_state)
            });
        } else {
            self.mark_no_medium(entry, state);
        }
    }

    fn mark_no_medium(&self, entry: &Arc<MountEntry>, state: &mut EntryState) {
        log::debug!("{}: no medium anymore", entry.device());
        state.medium_present = false;
        state.aliases.remove(AliasScope::FsSpecific);
        state
            .aliases
            .gc(AliasFlags::FS_SPECIFIC, AliasFlags::FS_SPECIFIC);
    }

    /// The media-change alias refresh: mark the surviving filesystem-specific aliases stale,
    /// re-probe attributes, emit the new set, materialise, collect what was not confirmed.
    fn refresh_fs_aliases(&self, entry: &Arc<MountEntry>, state: &mut EntryState) {
        state.aliases.mark(
            AliasFlags::FS_SPECIFIC,
            AliasFlags::FS_SPECIFIC,
            AliasFlags::STALE,
        );

        if let Some(syspath) = entry.syspath() {
            probe::load_attributes(entry.device(), syspath, state);
        }

        if state.fstype.is_some() {
            let snapshot = self.config().current();
            add_label_alias(state, AliasFlags::STALE, &snapshot.settings);
            add_uuid_alias(state, AliasFlags::STALE, &snapshot.settings);
            add_rule_aliases(entry, state, &snapshot.rules, true, AliasFlags::STALE);
        }

        state
            .aliases
            .materialise(self.root(), entry.dir(), AliasScope::FsSpecific);
        state.aliases.gc(AliasFlags::STALE, AliasFlags::STALE);
    }
}
