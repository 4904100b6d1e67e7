// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime errors.

// From dependency library

// From standard library

// From this library
pub use command_error_enum::CommandError;
pub use parser_error_enum::ParserError;

mod command_error_enum;
mod parser_error_enum;
