// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mount entries and their mutable state.

// From dependency library

// From standard library

// From this library
pub use change_strategy_enum::ChangeStrategy;
pub use identity_key_enum::IdentityKey;
pub use mount_entry_struct::dev_to_dir;
pub use mount_entry_struct::split_identity;
pub use mount_entry_struct::EntryState;
pub use mount_entry_struct::MountEntry;

mod change_strategy_enum;
mod identity_key_enum;
mod mount_entry_struct;
