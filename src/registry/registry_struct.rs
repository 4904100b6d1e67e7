// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use nix::errno::Errno;
use nix::mount::MntFlags;
use parking_lot::Mutex;

// From standard library
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::os::unix::fs::{symlink, DirBuilderExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

// From this library
use crate::autofs::MountCounter;
use crate::autofs::blinker;
use crate::config::{Settings, SharedConfig};
use crate::core::aliases::AliasScope;
use crate::core::entry::{dev_to_dir, split_identity, EntryState, IdentityKey, MountEntry};
use crate::core::flags::{AliasFlags, EntryOptions};
use crate::core::rules::RuleSet;
use crate::core::utils;
use crate::mount;
use crate::mount::{MountError, UnmountError};
use crate::probe;
use crate::registry::medium;

/// Options used when no file system option rule matches.
pub const DEFAULT_FS_OPTIONS: &str = "nosuid,nodev";

pub(crate) const LOCK_RETRY_PAUSE: Duration = Duration::from_millis(50);
const BOUNDED_RETRY_PAUSE: Duration = Duration::from_millis(500);
const CHILD_DRAIN_TRIES: u32 = 6;

/// Retry policy of a registry lookup whose entry lock is contended.
#[derive(Clone, Copy, Debug)]
pub enum LookupTries {
    /// Retry every 50 ms until the entry lock is acquired or the entry disappears.
    Unbounded,
    /// Retry every 500 ms, give up after this many attempts.
    Bounded(u32),
}

/// The concurrent collection of registered devices.
///
/// # Locking
///
/// The registry lock guards the entry list; each entry guards its own state. The only legal
/// acquisition order is registry lock → entry lock → parent entry lock, and every entry lock
/// taken while another lock is held is a try-lock with sleep backoff — a blocked holder of
/// the registry lock would otherwise deadlock against a worker that holds an entry lock and
/// needs the registry. The `&mut EntryState` handed to closures is the witness that the
/// entry lock is held; inner helpers take it by parameter and never re-acquire.
pub struct Registry {
    root: PathBuf,
    sysfs_root: PathBuf,
    config: Arc<SharedConfig>,
    counter: Arc<MountCounter>,
    entries: Mutex<Vec<Arc<MountEntry>>>,
}

impl Registry {
    /// Creates an empty registry publishing `root`.
    pub fn new(root: &Path, config: Arc<SharedConfig>, counter: Arc<MountCounter>) -> Registry {
        Self {
            root: root.to_path_buf(),
            sysfs_root: PathBuf::from("/sys"),
            config,
            counter,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the kernel sysfs view, used by tests to fake partition layouts.
    pub fn with_sysfs_root(mut self, sysfs_root: &Path) -> Registry {
        self.sysfs_root = sysfs_root.to_path_buf();
        self
    }

    /// Returns the automount root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn config(&self) -> &Arc<SharedConfig> {
        &self.config
    }

    /// Returns the number of registered devices.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Finds the first entry matching `predicate` and runs `f` with its lock held.
    ///
    /// Returns `None` when no entry matches, or when the entry lock stayed contended through
    /// a bounded retry budget. The registry lock is dropped before `f` runs.
    pub fn with_entry<P, F, R>(&self, predicate: P, tries: LookupTries, f: F) -> Option<R>
    where
        P: Fn(&MountEntry) -> bool,
        F: FnOnce(&Arc<MountEntry>, &mut EntryState) -> R,
    {
        let mut attempt: u32 = 0;

        loop {
            let entries = self.entries.lock();
            let entry = entries.iter().find(|entry| predicate(entry)).cloned();
            let Some(entry) = entry else {
                return None;
            };

            if let Some(mut state) = entry.try_lock_state() {
                drop(entries);
                return Some(f(&entry, &mut state));
            }
            drop(entries);

            match tries {
                LookupTries::Bounded(max) => {
                    if attempt >= max {
                        return None;
                    }
                    attempt += 1;
                    thread::sleep(BOUNDED_RETRY_PAUSE);
                }
                LookupTries::Unbounded => thread::sleep(LOCK_RETRY_PAUSE),
            }
        }
    }

    /// Finds the entry for `device` or inserts a fresh one, and runs `f` with the entry lock
    /// held. The registry lock covers the find-or-insert decision, so two concurrent adds of
    /// the same device cannot both insert.
    fn with_entry_or_new<F, R>(&self, device: &str, hide: bool, f: F) -> R
    where
        F: FnOnce(&Arc<MountEntry>, &mut EntryState, bool) -> R,
    {
        loop {
            let mut entries = self.entries.lock();

            if let Some(entry) = entries.iter().find(|e| e.device() == device).cloned() {
                if let Some(mut state) = entry.try_lock_state() {
                    drop(entries);
                    return f(&entry, &mut state, true);
                }
                drop(entries);
                thread::sleep(LOCK_RETRY_PAUSE);
                continue;
            }

            let entry = MountEntry::new(device.to_owned(), dev_to_dir(device, hide));
            let mut state = entry.lock_state();
            entries.push(Arc::clone(&entry));
            drop(entries);

            return f(&entry, &mut state, false);
        }
    }

    /// Upgrades a parent handle and runs `f` with the parent lock held. The caller holds a
    /// child entry lock, so the parent lock is try-locked with backoff. Returns `None` when
    /// the parent entry is already gone.
    pub(crate) fn with_parent<F, R>(&self, weak: &Weak<MountEntry>, f: F) -> Option<R>
    where
        F: FnOnce(&Arc<MountEntry>, &mut EntryState) -> R,
    {
        let parent = weak.upgrade()?;

        loop {
            if let Some(mut state) = parent.try_lock_state() {
                return Some(f(&parent, &mut state));
            }
            thread::sleep(LOCK_RETRY_PAUSE);
        }
    }

    /// Registers `device` or refreshes an existing registration.
    ///
    /// Identity lines are `KEY=VALUE` pairs, already scrubbed by the receiving channel.
    /// `perm_alias` attaches a permanent alias when it differs from the mountpoint name.
    pub fn add_device(self: &Arc<Self>, device: &str, perm_alias: Option<&str>, ids: &[String]) {
        log::debug!("add request for {}", device);
        self.config.reload_if_changed();
        let snapshot = self.config.current();

        let (dir, no_automount) = self.with_entry_or_new(
            device,
            snapshot.settings.hide_device_name,
            |entry, state, existed| {
                if existed {
                    log::debug!("device {} already existed, replacing it", device);
                    state.aliases.remove(AliasScope::All);
                    state.aliases.gc(AliasFlags::PERMANENT, AliasFlags::empty());
                    state.fstype = None;
                }

                for line in ids {
                    let Some((key, value)) = split_identity(line) else {
                        continue;
                    };
                    if key == IdentityKey::DevPath {
                        if !value.is_empty() {
                            entry.set_syspath(value);
                        }
                    } else {
                        state.set_attribute(key, value);
                    }
                }
                if entry.syspath().is_none() {
                    if let Some(syspath) = probe::resolve_syspath(device) {
                        entry.set_syspath(&syspath);
                    }
                }

                let parent_medium = self.adopt_parent(entry, state);
                if state.parent.is_none() {
                    state.medium_present = medium::device_openable(device);
                }
                let medium_present = parent_medium.unwrap_or(state.medium_present);

                if medium_present && state.fstype.is_none() {
                    if let Some(syspath) = entry.syspath() {
                        probe::load_attributes(device, syspath, state);
                    }
                }

                if let Some(alias) = perm_alias {
                    if !alias.is_empty() && alias != entry.dir() {
                        state
                            .aliases
                            .add_candidate(alias, state.partition, AliasFlags::PERMANENT);
                    }
                }
                add_model_alias(state, &snapshot.settings);
                add_label_alias(state, AliasFlags::empty(), &snapshot.settings);
                add_uuid_alias(state, AliasFlags::empty(), &snapshot.settings);
                add_rule_aliases(entry, state, &snapshot.rules, false, AliasFlags::empty());

                let options = {
                    let facts = state.facts(device);
                    snapshot.rules.mount_options.find_all_union(&facts)
                };
                if options.contains(EntryOptions::NO_AUTOMOUNT) {
                    state.no_automount = true;
                }

                if state.partition == 0 && state.fstype.is_none() {
                    // Looks like a partitioned device: delay the announcement, it is
                    // suppressed if children appear in the meantime.
                    let registry = Arc::clone(self);
                    let target = Arc::downgrade(entry);
                    thread::spawn(move || registry.delayed_announcement(target));
                } else {
                    let description = describe_medium(state, medium_present);
                    log::info!(
                        "new {}/{} available ({})",
                        self.root.display(),
                        entry.dir(),
                        description
                    );
                    if state.parent.is_none() {
                        if let Some(serial) = &state.serial {
                            log::info!("(serial number is {})", serial);
                        }
                    }
                }

                self.make_mount_dir(entry);
                let scope = if state.fstype.is_some() {
                    AliasScope::All
                } else {
                    AliasScope::NonSpecific
                };
                state.aliases.materialise(&self.root, entry.dir(), scope);

                (entry.dir().to_owned(), state.no_automount)
            },
        );

        if no_automount {
            let _ = self.mount_leaf(&dir);
        }
    }

    /// Unregisters `device`: unlinks it from the registry, unmounts its mountpoint, severs
    /// the parent relationship, and tears down its directory and aliases.
    ///
    /// A whole-device entry with live partition entries waits for the partition removals to
    /// drain, then gives up silently. Returns `false` on that give-up.
    pub fn remove_device(&self, device: &str) -> bool {
        log::debug!("remove request for {}", device);
        let mut drain_tries = CHILD_DRAIN_TRIES;

        loop {
            let mut entries = self.entries.lock();
            let Some(index) = entries.iter().position(|e| e.device() == device) else {
                log::debug!("to-be-removed device {} unknown", device);
                return true;
            };

            let entry = Arc::clone(&entries[index]);
            let Some(mut state) = entry.try_lock_state() else {
                drop(entries);
                log::debug!("removal of {} waiting for the entry lock", device);
                thread::sleep(LOCK_RETRY_PAUSE);
                continue;
            };

            if state.children > 0 {
                log::debug!(
                    "{} has {} children, waiting for their removal ({} tries left)",
                    device,
                    state.children,
                    drain_tries
                );
                drop(state);
                drop(entries);

                if drain_tries == 0 {
                    return false;
                }
                drain_tries -= 1;
                thread::sleep(BOUNDED_RETRY_PAUSE);
                continue;
            }

            entries.remove(index);
            drop(entries);

            self.teardown(&entry, &mut state);
            return true;
        }
    }

    /// Removes every registered device, newest first. Used at shutdown.
    pub fn drain(&self) {
        loop {
            let device = {
                let entries = self.entries.lock();
                entries.last().map(|entry| entry.device().to_owned())
            };
            let Some(device) = device else {
                return;
            };

            if !self.remove_device(&device) {
                log::warn!("giving up on {} during teardown", device);
                return;
            }
        }
    }

    /// Mounts the entry behind the mountpoint leaf `name`, on demand from the kernel.
    pub fn mount_leaf(self: &Arc<Self>, name: &str) -> Result<(), MountError> {
        let outcome = self.with_entry(
            |entry| entry.dir() == name,
            LookupTries::Unbounded,
            |entry, state| self.mount_locked(name, entry, state),
        );

        match outcome {
            None => Err(MountError::UnknownMountpoint(name.to_owned())),
            Some(Ok(newly_mounted)) => {
                if newly_mounted {
                    self.counter.increment();
                    if let Some(led) = self.config.current().settings.blink_led {
                        blinker::ensure_running(Arc::clone(&self.counter), led.bit());
                    }
                }
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    fn mount_locked(
        self: &Arc<Self>,
        name: &str,
        entry: &Arc<MountEntry>,
        state: &mut EntryState,
    ) -> Result<bool, MountError> {
        if state.mounted {
            log::debug!("{} already mounted by another thread", name);
            return Ok(false);
        }

        self.check_medium_change(entry, state);
        let Some(fstype) = state.fstype.clone() else {
            log::debug!("no filesystem found on {}", entry.device());
            return Err(MountError::NoFilesystem(entry.device().to_owned()));
        };

        let snapshot = self.config.current();
        let options = {
            let facts = state.facts(entry.device());
            snapshot
                .rules
                .fs_options
                .find_first(&facts)
                .cloned()
                .unwrap_or_else(|| DEFAULT_FS_OPTIONS.to_owned())
        };

        let path = self.root.join(name);
        match mount::call_mount(entry.device(), &path, &fstype, &options, &snapshot.rules) {
            Ok(outcome) => {
                state.mounted = true;
                log::debug!(
                    "mounted {} on {} (type {}{})",
                    entry.device(),
                    path.display(),
                    fstype,
                    if outcome.forced_read_only() {
                        ", forced read-only"
                    } else {
                        ""
                    }
                );
                Ok(true)
            }
            Err(e) => {
                match &e {
                    MountError::Syscall { source, .. } if medium::is_no_medium(*source) => {
                        self.set_no_medium(entry, state);
                        if state.parent.is_some() {
                            state.aliases.remove(AliasScope::FsSpecific);
                            state
                                .aliases
                                .gc(AliasFlags::FS_SPECIFIC, AliasFlags::FS_SPECIFIC);
                        }
                    }
                    _ => log::error!("{}", e),
                }
                Err(e)
            }
        }
    }

    /// Unmounts the entry behind the mountpoint leaf `name`, on kernel-driven expiry.
    pub fn unmount_leaf(&self, name: &str) -> Result<(), UnmountError> {
        let path = self.root.join(name);
        let outcome = self.with_entry(
            |entry| entry.dir() == name,
            LookupTries::Unbounded,
            |_, state| {
                if !state.mounted {
                    log::debug!("{} already unmounted by another thread", name);
                    return Ok(false);
                }
                if state.no_automount {
                    return Err(UnmountError::Pinned(name.to_owned()));
                }

                match nix::mount::umount(&path) {
                    Ok(()) => {
                        log::debug!("umount {} -> 0", path.display());
                        state.mounted = false;
                        Ok(true)
                    }
                    Err(e) => {
                        log::debug!("umount {} -> {}", path.display(), e);
                        if !matches!(e, Errno::EINVAL | Errno::EBUSY | Errno::ENOENT) {
                            log::warn!("cannot unmount {}: {}", path.display(), e);
                        }
                        Err(UnmountError::Syscall {
                            path: path.display().to_string(),
                            source: e,
                        })
                    }
                }
            },
        );

        match outcome {
            None => Err(UnmountError::UnknownMountpoint(name.to_owned())),
            Some(Ok(newly_unmounted)) => {
                if newly_unmounted {
                    crate::mtab::rm(&path);
                    self.counter.decrement();
                }
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Checks whether the entry is a partition (its syspath has a `start` attribute in the
    /// kernel sysfs view); if so, links it to its whole-device entry. Returns the parent's
    /// `medium_present`, or `None` when the entry stands alone.
    fn adopt_parent(&self, entry: &Arc<MountEntry>, state: &mut EntryState) -> Option<bool> {
        let syspath = entry.syspath()?.to_owned();
        let start_marker = self
            .sysfs_root
            .join(syspath.strip_prefix('/').unwrap_or(&syspath))
            .join("start");
        if !start_marker.exists() {
            // No start attribute: not a partition.
            return None;
        }

        let trimmed = syspath.trim_end_matches(|c: char| c.is_ascii_digit());
        state.partition = syspath[trimmed.len()..].parse().unwrap_or(0);
        let parent_syspath = syspath[..syspath.rfind('/')?].to_owned();

        let adopted = self.with_entry(
            |candidate| candidate.syspath() == Some(parent_syspath.as_str()),
            LookupTries::Bounded(6),
            |parent, parent_state| {
                self.add_child(parent, parent_state, entry, state);
                parent_state.medium_present
            },
        );

        if adopted.is_none() {
            log::warn!(
                "parent device (syspath={}) for {} not found",
                parent_syspath,
                entry.device()
            );
        }
        adopted
    }

    fn add_child(
        &self,
        parent: &Arc<MountEntry>,
        parent_state: &mut EntryState,
        child: &Arc<MountEntry>,
        child_state: &mut EntryState,
    ) {
        if let Some(existing) = child_state.parent.as_ref().and_then(Weak::upgrade) {
            if Arc::ptr_eq(&existing, parent) {
                return;
            }
            log::error!(
                "add_child: {} already has parent {}",
                child.device(),
                existing.device()
            );
            return;
        }

        log::debug!("setting parent of {} to {}", child.device(), parent.device());
        let link_path = self
            .root
            .join(parent.dir())
            .join(format!("part{:02}", child_state.partition));
        let target = format!("../{}", child.dir());
        if let Err(e) = symlink(&target, &link_path) {
            log::error!("symlink({}, {}): {}", target, link_path.display(), e);
        }

        child_state.parent = Some(Arc::downgrade(parent));
        parent_state.children += 1;
    }

    fn rm_child(
        &self,
        parent: &Arc<MountEntry>,
        parent_state: &mut EntryState,
        child: &Arc<MountEntry>,
        child_state: &mut EntryState,
    ) {
        let points_back = child_state
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|existing| Arc::ptr_eq(&existing, parent))
            .unwrap_or(false);
        if !points_back {
            log::error!("parent inconsistency between {} and {}", child.device(), parent.device());
            return;
        }

        log::debug!(
            "dropping parent of {} ({})",
            child.device(),
            parent.device()
        );
        child_state.parent = None;
        parent_state.children = parent_state.children.saturating_sub(1);

        let link_path = self
            .root
            .join(parent.dir())
            .join(format!("part{:02}", child_state.partition));
        if let Err(e) = std::fs::remove_file(&link_path) {
            log::error!("unlink({}): {}", link_path.display(), e);
        }
    }

    fn teardown(&self, entry: &Arc<MountEntry>, state: &mut EntryState) {
        let path = self.root.join(entry.dir());

        match nix::mount::umount(&path) {
            Ok(()) => self.counter.decrement(),
            Err(Errno::EBUSY) => {
                let _ = nix::mount::umount2(&path, MntFlags::MNT_DETACH);
                log::warn!("{} still busy, will be unmounted later", path.display());
                self.counter.decrement();
            }
            Err(Errno::EINVAL) | Err(Errno::ENOENT) => {}
            Err(e) => log::warn!("umount({}): {}", path.display(), e),
        }

        if let Some(weak) = state.parent.clone() {
            let severed = self.with_parent(&weak, |parent, parent_state| {
                self.rm_child(parent, parent_state, entry, state);
            });
            if severed.is_none() {
                // Parent entry already destroyed, nothing left to sever.
                state.parent = None;
            }
        }

        state.aliases.remove(AliasScope::All);
        state.aliases.gc(AliasFlags::empty(), AliasFlags::empty());

        if let Err(e) = std::fs::remove_dir(&path) {
            if !(utils::shutting_down() && e.kind() == ErrorKind::PermissionDenied) {
                log::warn!("rmdir({}): {}", path.display(), e);
            }
        }

        if !state.suppress_message {
            log::info!("{}/{} removed", self.root.display(), entry.dir());
        }
    }

    fn make_mount_dir(&self, entry: &MountEntry) {
        let path = self.root.join(entry.dir());
        let result = std::fs::DirBuilder::new().mode(0o755).create(&path);

        if let Err(e) = result {
            if e.kind() != ErrorKind::AlreadyExists {
                log::error!("mkdir({}): {}", path.display(), e);
            }
        }
    }

    /// One-second delayed announcement for devices that look partitioned: if partition
    /// entries appeared in the meantime, the message moves to them and the whole-device
    /// removal message is suppressed.
    fn delayed_announcement(self: Arc<Self>, target: Weak<MountEntry>) {
        thread::sleep(Duration::from_secs(1));

        let Some(target) = target.upgrade() else {
            // The entry disappeared in the meantime.
            return;
        };

        self.with_entry(
            |entry| std::ptr::eq(entry, target.as_ref()),
            LookupTries::Unbounded,
            |entry, state| {
                if state.children > 0 {
                    state.suppress_message = true;
                    if let Some(serial) = &state.serial {
                        log::info!(
                            "new {} available (serial number is {})",
                            entry.dir(),
                            serial
                        );
                    }
                    return;
                }

                log::info!(
                    "new {}/{} available (no filesystem)",
                    self.root.display(),
                    entry.dir()
                );
                if state.parent.is_none() {
                    if let Some(serial) = &state.serial {
                        log::info!("(serial number is {})", serial);
                    }
                }
            },
        );
    }
}

/// Builds the human-readable description used in announcement messages.
fn describe_medium(state: &EntryState, medium_present: bool) -> String {
    let mut description = String::new();

    if let Some(vendor) = &state.vendor {
        description.push_str(vendor);
    }
    if let Some(model) = &state.model {
        if !description.is_empty() {
            description.push(' ');
        }
        description.push_str(model);
    }
    if !description.is_empty() {
        description.push_str(", ");
    }

    if !medium_present {
        description.push_str("no medium");
    } else {
        match (&state.fstype, &state.label) {
            (None, _) => description.push_str("no filesystem"),
            (Some(fstype), Some(label)) if !label.is_empty() => {
                let _ = write!(description, "{} filesystem '{}'", fstype, label);
            }
            (Some(fstype), _) => {
                let _ = write!(description, "{} filesystem without label", fstype);
            }
        }
    }

    description
}

pub(crate) fn add_model_alias(state: &mut EntryState, settings: &Settings) {
    if !settings.model_alias {
        return;
    }
    let Some(model) = state.model.clone() else {
        return;
    };
    if model.is_empty() {
        return;
    }

    let template = format!("{}%u%P", model);
    state
        .aliases
        .add_candidate(&template, state.partition, AliasFlags::empty());
}

pub(crate) fn add_label_alias(state: &mut EntryState, flags: AliasFlags, settings: &Settings) {
    if !settings.label_alias {
        return;
    }
    let Some(label) = state.label.clone() else {
        return;
    };
    if label.is_empty() {
        return;
    }

    let template = if settings.label_unique {
        format!("{}%u", label)
    } else {
        label
    };
    state
        .aliases
        .add_candidate(&template, state.partition, flags | AliasFlags::FS_SPECIFIC);
}

pub(crate) fn add_uuid_alias(state: &mut EntryState, flags: AliasFlags, settings: &Settings) {
    if !settings.uuid_alias {
        return;
    }
    let (Some(fstype), Some(uuid)) = (state.fstype.clone(), state.uuid.clone()) else {
        return;
    };
    if fstype.is_empty() || uuid.is_empty() {
        return;
    }

    let template = format!("{}:{}", fstype, uuid);
    state
        .aliases
        .add_candidate(&template, state.partition, flags | AliasFlags::FS_SPECIFIC);
}

pub(crate) fn add_rule_aliases(
    entry: &MountEntry,
    state: &mut EntryState,
    rules: &RuleSet,
    fs_only: bool,
    extra: AliasFlags,
) {
    let matches: Vec<(String, bool)> = {
        let facts = state.facts(entry.device());
        let mut found = Vec::new();
        rules.aliases.each_matching(&facts, |template, fs_specific| {
            found.push((template.clone(), fs_specific));
        });
        found
    };

    for (template, fs_specific) in matches {
        if fs_only && !fs_specific {
            continue;
        }
        let mut flags = extra;
        if fs_specific {
            flags |= AliasFlags::FS_SPECIFIC;
        }
        state.aliases.add_candidate(&template, state.partition, flags);
    }
}
