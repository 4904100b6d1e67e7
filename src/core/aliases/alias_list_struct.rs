// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::Path;

// From this library
use crate::core::aliases::Alias;
use crate::core::aliases::AliasScope;
use crate::core::flags::AliasFlags;
use crate::core::utils;

/// The alias list of one mount entry.
///
/// Candidates are collected first (newest in front), then materialised as symlinks under the
/// automount root. On a media change the surviving file-system-specific aliases are refreshed
/// with the stale-marker sweep: mark, re-add, materialise, collect.
#[derive(Clone, Debug, Default)]
pub struct AliasList {
    aliases: Vec<Alias>,
}

impl AliasList {
    /// Creates an empty alias list.
    pub const fn new() -> AliasList {
        Self {
            aliases: Vec::new(),
        }
    }

    /// Adds an alias candidate, expanding `%p`/`%P` partition placeholders against
    /// `partition`.
    ///
    /// An empty template is ignored. When `flags` carries
    /// [`STALE`](AliasFlags::STALE) and an alias with the same expanded name
    /// already exists, the existing alias loses its stale marker and no duplicate is
    /// inserted; this makes the media-change refresh idempotent.
    pub fn add_candidate(&mut self, template: &str, partition: u32, flags: AliasFlags) {
        if template.is_empty() {
            return;
        }

        let name = expand_partition(template, partition);

        if flags.contains(AliasFlags::STALE) {
            if let Some(existing) = self.aliases.iter_mut().find(|alias| alias.name() == name) {
                existing.flags_mut().remove(AliasFlags::STALE);
                return;
            }
        }

        // A fresh insertion is its own confirmation; only unconfirmed survivors may keep the
        // stale marker and be collected.
        let mut flags = flags;
        flags.remove(AliasFlags::STALE);

        log::debug!("add_candidate added alias {:?}", name);
        self.aliases.insert(0, Alias::new(name, flags));
    }

    /// Sets `new_flags` on every alias whose flags masked by `mask` equal `flags`.
    pub fn mark(&mut self, mask: AliasFlags, flags: AliasFlags, new_flags: AliasFlags) {
        for alias in &mut self.aliases {
            if alias.flags() & mask == flags {
                alias.flags_mut().insert(new_flags);
            }
        }
    }

    /// Creates the on-disk symlinks for every in-scope alias not yet materialised.
    ///
    /// Each symlink lives directly under `root` and points at `target`, the entry's
    /// mountpoint leaf. A `%u` placeholder expands to nothing first, then to `#1`, `#2`, …
    /// until a free name is found; name collisions without a uniquifier are reported as
    /// warnings and the alias stays unmaterialised.
    pub fn materialise(&mut self, root: &Path, target: &str, scope: AliasScope) {
        for alias in &mut self.aliases {
            if !scope.includes(alias.flags()) || alias.name().is_empty() || alias.created().is_some()
            {
                continue;
            }

            let mut uniquifier = 0;
            loop {
                let (leaf, has_uniquifier) = expand_uniquifier(alias.name(), uniquifier);
                let path = root.join(&leaf);

                match symlink(target, &path) {
                    Ok(()) => {
                        log::debug!("materialise linked alias {:?} to {}", leaf, target);
                        alias.set_created(Some(path));
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists && has_uniquifier => {
                        uniquifier += 1;
                    }
                    Err(e) => {
                        log::warn!("symlink({}, {}): {}", target, path.display(), e);
                        break;
                    }
                }
            }
        }
    }

    /// Unlinks the symlinks of every in-scope materialised alias. The aliases themselves stay
    /// on the list and can be materialised again.
    pub fn remove(&mut self, scope: AliasScope) {
        for alias in &mut self.aliases {
            if scope.includes(alias.flags()) {
                unlink_created(alias);
            }
        }
    }

    /// Drops every alias whose flags masked by `mask` equal `flags`, unlinking its symlink
    /// first.
    pub fn gc(&mut self, mask: AliasFlags, flags: AliasFlags) {
        self.aliases.retain_mut(|alias| {
            if alias.flags() & mask == flags {
                unlink_created(alias);
                false
            } else {
                true
            }
        });
    }

    /// Iterates over the aliases, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Alias> {
        self.aliases.iter()
    }

    /// Returns the number of aliases on the list.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Returns `true` if the list holds no alias.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

fn unlink_created(alias: &mut Alias) {
    let Some(path) = alias.created() else {
        return;
    };

    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("unlink_created removed alias {:?}", path);
            alias.set_created(None);
        }
        Err(e) => {
            if !(utils::shutting_down() && e.kind() == ErrorKind::PermissionDenied) {
                log::warn!("unlink({}): {}", path.display(), e);
            }
        }
    }
}

/// Expands the first `%p` (bare partition number) or `%P` (`-partN` suffix) placeholder.
/// Partition `0` (a whole device) expands to nothing.
fn expand_partition(template: &str, partition: u32) -> String {
    if let Some(at) = template.find("%p") {
        let digits = if partition > 0 {
            partition.to_string()
        } else {
            String::new()
        };
        format!("{}{}{}", &template[..at], digits, &template[at + 2..])
    } else if let Some(at) = template.find("%P") {
        let suffix = if partition > 0 {
            format!("-part{}", partition)
        } else {
            String::new()
        };
        format!("{}{}{}", &template[..at], suffix, &template[at + 2..])
    } else {
        template.to_owned()
    }
}

/// Expands the first `%u` placeholder with uniquifier `n` (`""` for `0`, `#n` otherwise).
/// Returns the expansion and whether a placeholder was present.
fn expand_uniquifier(name: &str, n: u32) -> (String, bool) {
    match name.find("%u") {
        None => (name.to_owned(), false),
        Some(at) => {
            let marker = if n > 0 {
                format!("#{}", n)
            } else {
                String::new()
            };

            (
                format!("{}{}{}", &name[..at], marker, &name[at + 2..]),
                true,
            )
        }
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};
    use std::collections::BTreeSet;

    fn disk_aliases(root: &Path) -> BTreeSet<String> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn expand_partition_bare_number() {
        let actual = expand_partition("disk%p", 3);
        let expected = "disk3";
        assert_eq!(actual, expected);
    }

    #[test]
    fn expand_partition_zero_expands_to_nothing() {
        let actual = expand_partition("disk%p", 0);
        let expected = "disk";
        assert_eq!(actual, expected);

        let actual = expand_partition("disk%P", 0);
        let expected = "disk";
        assert_eq!(actual, expected);
    }

    #[test]
    fn expand_partition_suffix_form() {
        let actual = expand_partition("disk%P", 2);
        let expected = "disk-part2";
        assert_eq!(actual, expected);
    }

    #[test]
    fn expand_partition_without_placeholder_is_identity() {
        let actual = expand_partition("STICK", 5);
        let expected = "STICK";
        assert_eq!(actual, expected);
    }

    #[test]
    fn expand_uniquifier_zero_yields_no_suffix() {
        let actual = expand_uniquifier("STICK%u", 0);
        let expected = ("STICK".to_owned(), true);
        assert_eq!(actual, expected);
    }

    #[test]
    fn expand_uniquifier_positive_yields_a_hash_suffix() {
        let actual = expand_uniquifier("STICK%u", 1);
        let expected = ("STICK#1".to_owned(), true);
        assert_eq!(actual, expected);

        let actual = expand_uniquifier("a%ub", 7);
        let expected = ("a#7b".to_owned(), true);
        assert_eq!(actual, expected);
    }

    #[test]
    fn alias_list_ignores_empty_templates() {
        let mut list = AliasList::new();
        list.add_candidate("", 0, AliasFlags::empty());

        assert!(list.is_empty());
    }

    #[test]
    fn alias_list_stale_readd_clears_the_marker_without_duplicating() {
        let mut list = AliasList::new();
        list.add_candidate("STICK%u", 0, AliasFlags::FS_SPECIFIC);
        list.mark(
            AliasFlags::FS_SPECIFIC,
            AliasFlags::FS_SPECIFIC,
            AliasFlags::STALE,
        );

        list.add_candidate(
            "STICK%u",
            0,
            AliasFlags::FS_SPECIFIC | AliasFlags::STALE,
        );

        assert_eq!(list.len(), 1);
        let survivor = list.iter().next().unwrap();
        assert!(!survivor.flags().contains(AliasFlags::STALE));
    }

    #[test]
    fn alias_list_materialise_links_in_scope_aliases() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("sdb1")).unwrap();

        let mut list = AliasList::new();
        list.add_candidate("STICK", 0, AliasFlags::FS_SPECIFIC);
        list.add_candidate("Cruzer%u%P", 1, AliasFlags::empty());

        list.materialise(root.path(), "sdb1", AliasScope::All);

        let actual = disk_aliases(root.path());
        let expected: BTreeSet<String> = ["sdb1", "STICK", "Cruzer-part1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(actual, expected);

        let link = std::fs::read_link(root.path().join("STICK")).unwrap();
        assert_eq!(link, Path::new("sdb1"));
    }

    #[test]
    fn alias_list_materialise_skips_out_of_scope_aliases() {
        let root = tempfile::tempdir().unwrap();

        let mut list = AliasList::new();
        list.add_candidate("STICK", 0, AliasFlags::FS_SPECIFIC);
        list.add_candidate("Cruzer", 0, AliasFlags::empty());

        list.materialise(root.path(), "sdb1", AliasScope::NonSpecific);

        let actual = disk_aliases(root.path());
        let expected: BTreeSet<String> = ["Cruzer".to_string()].into_iter().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn alias_list_uniquifier_resolves_collisions() {
        let root = tempfile::tempdir().unwrap();
        symlink("sda1", root.path().join("STICK")).unwrap();

        let mut list = AliasList::new();
        list.add_candidate("STICK%u", 0, AliasFlags::FS_SPECIFIC);
        list.materialise(root.path(), "sdb1", AliasScope::All);

        let link = std::fs::read_link(root.path().join("STICK#1")).unwrap();
        assert_eq!(link, Path::new("sdb1"));
    }

    #[test]
    fn alias_list_collision_without_uniquifier_stays_unmaterialised() {
        let root = tempfile::tempdir().unwrap();
        symlink("sda1", root.path().join("STICK")).unwrap();

        let mut list = AliasList::new();
        list.add_candidate("STICK", 0, AliasFlags::FS_SPECIFIC);
        list.materialise(root.path(), "sdb1", AliasScope::All);

        let alias = list.iter().next().unwrap();
        assert_eq!(alias.created(), None);
    }

    #[test]
    fn alias_list_each_created_path_belongs_to_exactly_one_alias() {
        let root = tempfile::tempdir().unwrap();

        let mut list = AliasList::new();
        list.add_candidate("DATA%u", 0, AliasFlags::FS_SPECIFIC);
        list.add_candidate("DATA%u", 0, AliasFlags::empty());
        list.materialise(root.path(), "sdb1", AliasScope::All);

        let created: Vec<_> = list.iter().filter_map(|alias| alias.created()).collect();
        assert_eq!(created.len(), 2);

        let unique: BTreeSet<_> = created.iter().collect();
        assert_eq!(unique.len(), created.len());
    }

    #[test]
    fn alias_list_refresh_sweep_is_idempotent_on_disk() {
        let root = tempfile::tempdir().unwrap();

        let mut list = AliasList::new();
        list.add_candidate("STICK%u", 0, AliasFlags::FS_SPECIFIC);
        list.add_candidate("vfat:1234-5678", 0, AliasFlags::FS_SPECIFIC);
        list.add_candidate("Cruzer%u%P", 0, AliasFlags::empty());
        list.materialise(root.path(), "sdb1", AliasScope::All);

        let before = disk_aliases(root.path());

        // The media-change refresh with an unchanged attribute set.
        list.mark(
            AliasFlags::FS_SPECIFIC,
            AliasFlags::FS_SPECIFIC,
            AliasFlags::STALE,
        );
        list.add_candidate(
            "STICK%u",
            0,
            AliasFlags::FS_SPECIFIC | AliasFlags::STALE,
        );
        list.add_candidate(
            "vfat:1234-5678",
            0,
            AliasFlags::FS_SPECIFIC | AliasFlags::STALE,
        );
        list.materialise(root.path(), "sdb1", AliasScope::FsSpecific);
        list.gc(AliasFlags::STALE, AliasFlags::STALE);

        let after = disk_aliases(root.path());
        assert_eq!(after, before);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn alias_list_refresh_sweep_replaces_a_changed_label() {
        let root = tempfile::tempdir().unwrap();

        let mut list = AliasList::new();
        list.add_candidate("AUDIO", 0, AliasFlags::FS_SPECIFIC);
        list.materialise(root.path(), "sr0", AliasScope::All);
        assert!(root.path().join("AUDIO").exists());

        // Disc swap: the refresh emits the new label only.
        list.mark(
            AliasFlags::FS_SPECIFIC,
            AliasFlags::FS_SPECIFIC,
            AliasFlags::STALE,
        );
        list.add_candidate("BACKUP", 0, AliasFlags::FS_SPECIFIC | AliasFlags::STALE);
        list.materialise(root.path(), "sr0", AliasScope::FsSpecific);
        list.gc(AliasFlags::STALE, AliasFlags::STALE);

        let actual = disk_aliases(root.path());
        let expected: BTreeSet<String> = ["BACKUP".to_string()].into_iter().collect();
        assert_eq!(actual, expected);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().name(), "BACKUP");
    }

    #[test]
    fn alias_list_remove_unlinks_but_keeps_candidates() {
        let root = tempfile::tempdir().unwrap();

        let mut list = AliasList::new();
        list.add_candidate("STICK", 0, AliasFlags::FS_SPECIFIC);
        list.materialise(root.path(), "sdb1", AliasScope::All);
        list.remove(AliasScope::FsSpecific);

        assert!(!root.path().join("STICK").exists());
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().created(), None);
    }
}
