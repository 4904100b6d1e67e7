// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The mount registry: concurrent device collection, mount/unmount paths, medium state.

// From dependency library

// From standard library

// From this library
pub use registry_struct::LookupTries;
pub use registry_struct::Registry;
pub use registry_struct::DEFAULT_FS_OPTIONS;

mod medium;
mod registry_struct;
