// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel autofs dialogue: protocol ABI, request engine, expire driver.

// From dependency library

// From standard library

// From this library
pub use autofs_error_enum::AutofsError;
pub use engine_struct::AutofsEngine;
pub use mount_counter_struct::MountCounter;

pub mod blinker;
pub mod proto;

mod autofs_error_enum;
mod engine_struct;
mod mount_counter_struct;
