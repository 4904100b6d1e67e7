// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};

// From standard library
use std::sync::{Arc, Weak};

// From this library
use crate::core::aliases::AliasList;
use crate::core::entry::ChangeStrategy;
use crate::core::entry::IdentityKey;
use crate::core::matcher::DeviceFacts;

/// A registered removable device.
///
/// `device` and `dir` are fixed at creation and `syspath` is write-once, so all three can be
/// read under the registry lock alone. Everything mutable lives in the [`EntryState`] behind
/// the entry lock. Strong references are owned by the registry; partitions point back at
/// their whole-device entry through a [`Weak`] handle.
#[derive(Debug)]
pub struct MountEntry {
    device: String,
    dir: String,
    syspath: OnceCell<String>,
    state: Mutex<EntryState>,
}

impl MountEntry {
    /// Creates an entry for `device`, mounted under the leaf directory `dir`.
    pub fn new(device: String, dir: String) -> Arc<MountEntry> {
        Arc::new(Self {
            device,
            dir,
            syspath: OnceCell::new(),
            state: Mutex::new(EntryState::default()),
        })
    }

    /// Returns the canonical block device path.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the mountpoint leaf name under the automount root.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Returns the kernel device path relative to `/sys`, once resolved.
    pub fn syspath(&self) -> Option<&str> {
        self.syspath.get().map(String::as_str)
    }

    /// Records the kernel device path. The first resolution wins; later values are ignored.
    pub fn set_syspath(&self, syspath: &str) {
        if self.syspath.set(syspath.to_owned()).is_ok() {
            log::debug!("set_syspath found syspath={} for {}", syspath, self.device);
        }
    }

    /// Acquires the entry lock, blocking.
    ///
    /// Only safe from code that holds no other entry lock; lock ordering is documented on
    /// [`Registry`](crate::registry::Registry).
    pub fn lock_state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock()
    }

    /// Attempts to acquire the entry lock without blocking.
    pub fn try_lock_state(&self) -> Option<MutexGuard<'_, EntryState>> {
        self.state.try_lock()
    }
}

/// Mutable state of a [`MountEntry`], guarded by the entry lock.
#[derive(Debug, Default)]
pub struct EntryState {
    /// Partition number, `0` for a whole device.
    pub partition: u32,
    /// Hardware vendor string.
    pub vendor: Option<String>,
    /// Hardware model string.
    pub model: Option<String>,
    /// Hardware serial number.
    pub serial: Option<String>,
    /// Detected file system type.
    pub fstype: Option<String>,
    /// File system UUID.
    pub uuid: Option<String>,
    /// File system label.
    pub label: Option<String>,
    /// Whole-device entry when this entry is a partition.
    pub parent: Option<Weak<MountEntry>>,
    /// Number of partition entries pointing back here.
    pub children: u32,
    /// Alias candidates and their on-disk symlinks.
    pub aliases: AliasList,
    /// A medium is present in the drive.
    pub medium_present: bool,
    /// The medium changed since the last probe and attributes must be refreshed.
    pub medium_changed: bool,
    /// The device is mounted on its mountpoint.
    pub mounted: bool,
    /// Suppress the removal message (the announcement went to a child instead).
    pub suppress_message: bool,
    /// Mounted eagerly on registration; kernel-driven expiry is refused.
    pub no_automount: bool,
    /// Media change detection strategy, memoised on first use.
    pub change_strategy: ChangeStrategy,
}

impl EntryState {
    /// Returns the attribute snapshot used for condition matching.
    pub fn facts<'a>(&'a self, device: &'a str) -> DeviceFacts<'a> {
        DeviceFacts {
            device,
            vendor: self.vendor.as_deref(),
            model: self.model.as_deref(),
            serial: self.serial.as_deref(),
            partition: self.partition,
            fstype: self.fstype.as_deref(),
            uuid: self.uuid.as_deref(),
            label: self.label.as_deref(),
        }
    }

    /// Stores one identity value. An empty value clears the slot.
    ///
    /// [`IdentityKey::DevPath`] is not an attribute; the caller routes it to
    /// [`MountEntry::set_syspath`].
    pub fn set_attribute(&mut self, key: IdentityKey, value: &str) {
        let slot = match key {
            IdentityKey::DevPath => return,
            IdentityKey::Vendor => &mut self.vendor,
            IdentityKey::Model => &mut self.model,
            IdentityKey::Serial => &mut self.serial,
            IdentityKey::FsType => &mut self.fstype,
            IdentityKey::FsUuid => &mut self.uuid,
            IdentityKey::FsLabel | IdentityKey::FsLabelLegacy => &mut self.label,
        };

        if value.is_empty() {
            *slot = None;
        } else {
            log::debug!("set_attribute found {} = {:?}", key, value);
            *slot = Some(value.to_owned());
        }
    }
}

/// Splits a `KEY=VALUE` identity line, `None` when the key is unrecognised or the `=` is
/// missing.
pub fn split_identity(line: &str) -> Option<(IdentityKey, &str)> {
    let (key, value) = line.split_once('=')?;

    IdentityKey::from_key(key).map(|key| (key, value))
}

/// Derives the mountpoint leaf name from a device path: the `/dev/` prefix is stripped, `/`
/// becomes `_`, and a leading `.` hides the directory when `hide` is set.
pub fn dev_to_dir(device: &str, hide: bool) -> String {
    let stripped = device.strip_prefix("/dev/").unwrap_or(device);
    let mut dir = String::with_capacity(stripped.len() + 1);

    if hide {
        dir.push('.');
    }
    for c in stripped.chars() {
        dir.push(if c == '/' { '_' } else { c });
    }

    dir
}
