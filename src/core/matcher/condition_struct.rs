// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fmt;

// From this library
use crate::core::matcher::MatchField;
use crate::core::matcher::MatchOp;

/// Attribute snapshot of a registered device, the value side of a match.
///
/// Unset attributes never satisfy an atom: an absent label neither equals nor differs from a
/// literal.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceFacts<'a> {
    /// Canonical block device path.
    pub device: &'a str,
    /// Hardware vendor string.
    pub vendor: Option<&'a str>,
    /// Hardware model string.
    pub model: Option<&'a str>,
    /// Hardware serial number.
    pub serial: Option<&'a str>,
    /// Partition number, `0` for a whole device.
    pub partition: u32,
    /// Detected file system type.
    pub fstype: Option<&'a str>,
    /// File system UUID.
    pub uuid: Option<&'a str>,
    /// File system label.
    pub label: Option<&'a str>,
}

/// One `(field, operator, literal)` comparison.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MatchAtom {
    field: MatchField,
    op: MatchOp,
    value: String,
}

impl MatchAtom {
    /// Creates an atom comparing `field` against the literal `value`.
    pub fn new<T>(field: MatchField, op: MatchOp, value: T) -> MatchAtom
    where
        T: AsRef<str>,
    {
        Self {
            field,
            op,
            value: value.as_ref().to_owned(),
        }
    }

    /// Returns the attribute the atom inspects.
    pub fn field(&self) -> MatchField {
        self.field
    }

    fn evaluate(&self, facts: &DeviceFacts<'_>) -> bool {
        let is_equal = match self.field {
            MatchField::Device | MatchField::MtabDevice => facts.device == self.value,
            MatchField::Vendor => facts.vendor == Some(self.value.as_str()),
            MatchField::Model => facts.model == Some(self.value.as_str()),
            MatchField::Serial => facts.serial == Some(self.value.as_str()),
            MatchField::Partition => self
                .value
                .parse::<u32>()
                .map(|number| facts.partition == number)
                .unwrap_or(false),
            MatchField::FsType => facts.fstype == Some(self.value.as_str()),
            MatchField::Uuid => facts.uuid == Some(self.value.as_str()),
            MatchField::Label => facts.label == Some(self.value.as_str()),
        };

        self.op.apply(is_equal)
    }
}

impl fmt::Display for MatchAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.field, self.op, self.value)
    }
}

/// Outcome of evaluating a [`Condition`] against a device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MatchOutcome {
    /// Every atom evaluated true under its operator.
    pub matched: bool,
    /// At least one evaluated atom inspected a file-system attribute (type, UUID, label).
    pub fs_specific: bool,
}

/// A conjunction of [`MatchAtom`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Condition {
    atoms: Vec<MatchAtom>,
}

impl Condition {
    /// Creates a condition from its atoms. All atoms must hold for the condition to match.
    pub fn new(atoms: Vec<MatchAtom>) -> Condition {
        Self { atoms }
    }

    /// Returns the condition's priority: the minimum priority of its atoms, `999` for an
    /// empty condition.
    pub fn priority(&self) -> u32 {
        self.atoms
            .iter()
            .map(|atom| atom.field().priority())
            .min()
            .unwrap_or(999)
    }

    /// Returns `true` if any atom inspects a file-system attribute.
    pub fn is_fs_specific(&self) -> bool {
        self.atoms.iter().any(|atom| atom.field().is_fs_specific())
    }

    /// Evaluates the condition against a device's attributes.
    pub fn evaluate(&self, facts: &DeviceFacts<'_>) -> MatchOutcome {
        let mut fs_specific = false;

        for atom in &self.atoms {
            if atom.field().is_fs_specific() {
                fs_specific = true;
            }
            if !atom.evaluate(facts) {
                return MatchOutcome {
                    matched: false,
                    fs_specific,
                };
            }
        }

        MatchOutcome {
            matched: true,
            fs_specific,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for atom in &self.atoms {
            if !first {
                write!(f, " && ")?;
            }
            write!(f, "{}", atom)?;
            first = false;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    fn stick_facts() -> DeviceFacts<'static> {
        DeviceFacts {
            device: "/dev/sdb1",
            vendor: Some("Acme"),
            model: Some("DataTraveler"),
            serial: Some("0xCAFE"),
            partition: 1,
            fstype: Some("vfat"),
            uuid: Some("1234-5678"),
            label: Some("STICK"),
        }
    }

    #[test]
    fn condition_matches_when_all_atoms_hold() {
        let condition = Condition::new(vec![
            MatchAtom::new(MatchField::Vendor, MatchOp::Equals, "Acme"),
            MatchAtom::new(MatchField::FsType, MatchOp::Equals, "vfat"),
        ]);

        let actual = condition.evaluate(&stick_facts());
        let expected = MatchOutcome {
            matched: true,
            fs_specific: true,
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn condition_fails_when_one_atom_fails() {
        let condition = Condition::new(vec![
            MatchAtom::new(MatchField::Vendor, MatchOp::Equals, "Acme"),
            MatchAtom::new(MatchField::FsType, MatchOp::Equals, "ext4"),
        ]);

        let outcome = condition.evaluate(&stick_facts());
        assert!(!outcome.matched);
    }

    #[test]
    fn condition_absent_attribute_satisfies_neither_operator() {
        let mut facts = stick_facts();
        facts.label = None;

        let equals = Condition::new(vec![MatchAtom::new(
            MatchField::Label,
            MatchOp::Equals,
            "STICK",
        )]);
        assert!(!equals.evaluate(&facts).matched);

        let differs = Condition::new(vec![MatchAtom::new(
            MatchField::Label,
            MatchOp::Differs,
            "STICK",
        )]);
        assert!(!differs.evaluate(&facts).matched);
    }

    #[test]
    fn condition_negated_atom_matches_a_different_value() {
        let condition = Condition::new(vec![MatchAtom::new(
            MatchField::Vendor,
            MatchOp::Differs,
            "Globex",
        )]);

        let outcome = condition.evaluate(&stick_facts());
        assert!(outcome.matched);
        assert!(!outcome.fs_specific);
    }

    #[test]
    fn condition_partition_compares_as_integer() {
        let condition = Condition::new(vec![MatchAtom::new(
            MatchField::Partition,
            MatchOp::Equals,
            "1",
        )]);
        assert!(condition.evaluate(&stick_facts()).matched);

        let garbled = Condition::new(vec![MatchAtom::new(
            MatchField::Partition,
            MatchOp::Equals,
            "first",
        )]);
        assert!(!garbled.evaluate(&stick_facts()).matched);
    }

    #[test]
    fn condition_priority_is_the_minimum_atom_priority() {
        let condition = Condition::new(vec![
            MatchAtom::new(MatchField::FsType, MatchOp::Equals, "vfat"),
            MatchAtom::new(MatchField::Uuid, MatchOp::Equals, "1234-5678"),
        ]);

        let actual = condition.priority();
        let expected = MatchField::Uuid.priority();
        assert_eq!(actual, expected);
    }

    #[test]
    fn condition_empty_priority_is_the_sentinel() {
        let actual = Condition::default().priority();
        let expected = 999;
        assert_eq!(actual, expected);
    }

    #[test]
    fn condition_fs_specific_outcome_requires_an_fs_atom() {
        let hardware_only = Condition::new(vec![
            MatchAtom::new(MatchField::Vendor, MatchOp::Equals, "Acme"),
            MatchAtom::new(MatchField::Serial, MatchOp::Equals, "0xCAFE"),
        ]);

        let outcome = hardware_only.evaluate(&stick_facts());
        assert!(outcome.matched);
        assert!(!outcome.fs_specific);
    }
}
