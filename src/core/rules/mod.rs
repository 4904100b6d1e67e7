// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Priority-ordered rule tables.

// From dependency library

// From standard library

// From this library
pub use rule_set_struct::FsTypeReplacement;
pub use rule_set_struct::RuleSet;
pub use rule_table_struct::Rule;
pub use rule_table_struct::RuleTable;

mod rule_set_struct;
mod rule_table_struct;
