// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device attribute probing through udev.

// From dependency library

// From standard library
use std::path::Path;

// From this library
use crate::core::entry::{split_identity, EntryState, IdentityKey};
use crate::core::utils;

/// Resolves the kernel device path (relative to `/sys`) of a block device node.
pub fn resolve_syspath(device: &str) -> Option<String> {
    let sysname = device.strip_prefix("/dev/").unwrap_or(device);

    let found = match udev::Device::from_subsystem_sysname("block".to_owned(), sysname.to_owned())
    {
        Ok(found) => found,
        Err(e) => {
            log::error!("{}: failed to get udev object: {}", device, e);
            return None;
        }
    };

    let syspath = found
        .syspath()
        .to_string_lossy()
        .strip_prefix("/sys")
        .map(String::from);
    log::debug!(
        "resolve_syspath found syspath={} for {}",
        syspath.as_deref().unwrap_or("NONE"),
        device
    );

    syspath
}

/// Reads the udev property bag of `syspath` and stores the recognised identity values on the
/// entry state. Values are scrubbed before parsing.
pub fn load_attributes(device: &str, syspath: &str, state: &mut EntryState) {
    let full = format!("/sys{}", syspath);

    let found = match udev::Device::from_syspath(Path::new(&full)) {
        Ok(found) => found,
        Err(e) => {
            log::error!("{}: failed to get udev object: {}", device, e);
            return;
        }
    };

    for property in found.properties() {
        let name = property.name().to_string_lossy();
        if name == "DEVPATH" {
            continue;
        }

        let line = utils::scrub_untrusted_chars(&format!(
            "{}={}",
            name,
            property.value().to_string_lossy()
        ));
        if let Some((key, value)) = split_identity(&line) {
            debug_assert!(key != IdentityKey::DevPath);
            state.set_attribute(key, value);
        }
    }
}
