// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Condition evaluation against device attributes.

// From dependency library

// From standard library

// From this library
pub use condition_struct::Condition;
pub use condition_struct::DeviceFacts;
pub use condition_struct::MatchAtom;
pub use condition_struct::MatchOutcome;
pub use match_field_enum::MatchField;
pub use match_op_enum::MatchOp;

mod condition_struct;
mod match_field_enum;
mod match_op_enum;
