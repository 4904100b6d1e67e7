// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Start-time replay of add events for devices that were present before the daemon.

// From dependency library

// From standard library
use std::sync::Arc;

// From this library
use crate::registry::Registry;

/// Enumerates removable block devices and their partitions, and registers each as if a
/// hotplug add had just arrived.
pub fn coldplug(registry: &Arc<Registry>) {
    if let Err(e) = scan(registry) {
        log::error!("coldplug enumeration failed: {}", e);
    }
}

fn scan(registry: &Arc<Registry>) -> std::io::Result<()> {
    let mut removables = udev::Enumerator::new()?;
    removables.match_subsystem("block")?;
    removables.match_attribute("removable", "1")?;
    let devices: Vec<udev::Device> = removables.scan_devices()?.collect();

    for device in devices {
        // The device and its partitions, via the parent match.
        let mut related = udev::Enumerator::new()?;
        related.match_parent(&device)?;
        let parts: Vec<udev::Device> = related.scan_devices()?.collect();

        for part in parts {
            let devname = format!("/dev/{}", part.sysname().to_string_lossy());
            let Some(syspath) = part
                .syspath()
                .to_string_lossy()
                .strip_prefix("/sys")
                .map(String::from)
            else {
                continue;
            };

            registry.add_device(&devname, None, &[format!("DEVPATH={}", syspath)]);
        }
    }

    Ok(())
}
