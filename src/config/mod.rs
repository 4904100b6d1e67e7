// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Daemon configuration: settings, rule tables, mtime-gated reload.

// From dependency library

// From standard library

// From this library
pub use led_enum::Led;
pub use settings_struct::Settings;
pub use shared_config_struct::ConfigSnapshot;
pub use shared_config_struct::SharedConfig;

mod led_enum;
mod parser;
mod settings_struct;
mod shared_config_struct;
