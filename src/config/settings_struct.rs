// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library
use crate::config::Led;

/// Scalar daemon settings from the configuration file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Seconds between expire ioctl rounds while mounts are active.
    pub expire_freq: u32,
    /// Idle expiration handed to the kernel, in seconds.
    pub expire_timeout: u64,
    /// Keyboard LED blinking while mounts are active, off when `None`.
    pub blink_led: Option<Led>,
    /// Log at debug level.
    pub debug: bool,
    /// Run the coldplug replay thread at start-up.
    pub scan_fstab: bool,
    /// Emit a `<model>%u%P` alias for every device.
    pub model_alias: bool,
    /// Emit a label alias for media with a labelled file system.
    pub label_alias: bool,
    /// Append a `%u` uniquifier to label aliases.
    pub label_unique: bool,
    /// Emit a `<fstype>:<uuid>` alias for media with a detectable file system.
    pub uuid_alias: bool,
    /// Prefix mountpoint directories with a dot.
    pub hide_device_name: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            expire_freq: 2,
            expire_timeout: 4,
            blink_led: None,
            debug: false,
            scan_fstab: true,
            model_alias: true,
            label_alias: true,
            label_unique: true,
            uuid_alias: false,
            hide_device_name: false,
        }
    }
}
