// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mountpoint aliases and their on-disk lifecycle.

// From dependency library

// From standard library

// From this library
pub use alias_list_struct::AliasList;
pub use alias_scope_enum::AliasScope;
pub use alias_struct::Alias;

mod alias_list_struct;
mod alias_scope_enum;
mod alias_struct;
