// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library
use crate::core::flags::EntryOptions;
use crate::core::rules::RuleTable;

/// A file system type substitution declared by configuration (`use "<new>" instead "<old>"`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FsTypeReplacement {
    /// Detected type to substitute.
    pub from: String,
    /// Type to mount with instead.
    pub to: String,
}

/// All configured rule tables, owned by one configuration snapshot.
///
/// A reload builds a fresh `RuleSet` and swaps it in wholesale; readers always see one
/// coherent generation.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    /// Alias name templates attached to matching devices.
    pub aliases: RuleTable<String>,
    /// File system option strings used when mounting a matching device.
    pub fs_options: RuleTable<String>,
    /// Per-entry option bits for matching devices.
    pub mount_options: RuleTable<EntryOptions>,
    /// File system type substitutions.
    pub fstype_replacements: Vec<FsTypeReplacement>,
}

impl RuleSet {
    /// Returns the substitute for a detected file system type, if one is configured.
    pub fn replacement_for(&self, fstype: &str) -> Option<&str> {
        self.fstype_replacements
            .iter()
            .find(|replacement| replacement.from == fstype)
            .map(|replacement| replacement.to.as_str())
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn rule_set_replacement_for_substitutes_a_configured_type() {
        let mut rules = RuleSet::default();
        rules.fstype_replacements.push(FsTypeReplacement {
            from: "ntfs".to_owned(),
            to: "ntfs-3g".to_owned(),
        });

        let actual = rules.replacement_for("ntfs");
        let expected = Some("ntfs-3g");
        assert_eq!(actual, expected);

        let actual = rules.replacement_for("vfat");
        let expected = None;
        assert_eq!(actual, expected);
    }
}
