// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flag sets and option tokens.

// From dependency library

// From standard library

// From this library
pub use alias_flags_struct::AliasFlags;
pub use entry_options_struct::EntryOptions;
pub use mount_option_enum::MountOption;

mod alias_flags_struct;
mod entry_options_struct;
mod mount_option_enum;
