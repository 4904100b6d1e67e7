// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::ops::BitOr;

// From this library
use crate::core::matcher::Condition;
use crate::core::matcher::DeviceFacts;

/// A condition with its payload, ranked by the condition's priority.
#[derive(Clone, Debug)]
pub struct Rule<T> {
    condition: Condition,
    priority: u32,
    payload: T,
}

impl<T> Rule<T> {
    /// Returns the rule's condition.
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Returns the rule's rank. Lower values rank higher.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Returns the rule's payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }
}

/// A list of rules kept sorted by ascending condition priority.
///
/// Rules of equal priority keep their insertion order, so a later insertion ranks after an
/// earlier one at the same level.
#[derive(Clone, Debug)]
pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleTable<T> {
    /// Creates an empty table.
    pub const fn new() -> RuleTable<T> {
        Self { rules: Vec::new() }
    }

    /// Inserts a rule at the position its condition priority assigns.
    pub fn insert(&mut self, condition: Condition, payload: T) {
        let priority = condition.priority();
        let at = self
            .rules
            .iter()
            .position(|rule| rule.priority > priority)
            .unwrap_or(self.rules.len());

        self.rules.insert(
            at,
            Rule {
                condition,
                priority,
                payload,
            },
        );
    }

    /// Returns the payload of the highest-ranked rule matching the device, or `None` if no
    /// rule matches.
    pub fn find_first(&self, facts: &DeviceFacts<'_>) -> Option<&T> {
        self.rules
            .iter()
            .find(|rule| rule.condition.evaluate(facts).matched)
            .map(|rule| &rule.payload)
    }

    /// Calls `f` for every matching rule in priority order, passing the payload and whether
    /// the match relied on a file-system attribute.
    pub fn each_matching<F>(&self, facts: &DeviceFacts<'_>, mut f: F)
    where
        F: FnMut(&T, bool),
    {
        for rule in &self.rules {
            let outcome = rule.condition.evaluate(facts);
            if outcome.matched {
                f(&rule.payload, outcome.fs_specific);
            }
        }
    }

    /// Returns the number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the table holds no rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule<T>> {
        self.rules.iter()
    }
}

impl<T> RuleTable<T>
where
    T: BitOr<Output = T> + Copy + Default,
{
    /// Returns the bitwise union of the payloads of all matching rules. An empty table, or a
    /// table without a match, yields the empty payload.
    pub fn find_all_union(&self, facts: &DeviceFacts<'_>) -> T {
        self.rules
            .iter()
            .filter(|rule| rule.condition.evaluate(facts).matched)
            .fold(T::default(), |union, rule| union | rule.payload)
    }
}

impl<T> Default for RuleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
