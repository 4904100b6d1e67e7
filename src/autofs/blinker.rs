// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyboard-LED activity indicator.
//!
//! While at least one automount is active the configured LED blinks slowly; when the count
//! returns to zero the thread signs off with a burst of fast blinks, then parks until mounts
//! come back.

// From dependency library
use libc::c_char;
use parking_lot::Mutex;

// From standard library
use std::fs::File;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// From this library
use crate::autofs::MountCounter;

const BLINK_ON: Duration = Duration::from_millis(10);
const BLINK_OFF_LONG: Duration = Duration::from_millis(1440);
const BLINK_OFF_SHORT: Duration = Duration::from_millis(140);
const BLINKS_AT_END: u32 = 6;

nix::ioctl_read_bad!(kd_get_led, 0x4B31, c_char);

const KD_SET_LED: libc::c_ulong = 0x4B32;

static BLINKER_RUNNING: Mutex<bool> = Mutex::new(false);

/// Starts the blinker thread for `led` unless one is already running.
pub fn ensure_running(counter: Arc<MountCounter>, led: u8) {
    let mut running = BLINKER_RUNNING.lock();
    if *running {
        return;
    }
    *running = true;

    thread::spawn(move || blink_loop(&counter, led));
}

fn toggle_led(fd: RawFd, led: u8) -> nix::Result<()> {
    let mut status: c_char = 0;
    unsafe { kd_get_led(fd, &mut status) }?;
    status ^= led as c_char;
    nix::errno::Errno::result(unsafe {
        libc::ioctl(fd, KD_SET_LED, status as libc::c_ulong)
    })?;

    Ok(())
}

fn blink_loop(counter: &Arc<MountCounter>, led: u8) {
    let console = match File::open("/dev/tty0") {
        Ok(file) => file,
        Err(e) => {
            log::error!("/dev/tty0: {}", e);
            *BLINKER_RUNNING.lock() = false;
            return;
        }
    };
    let fd = console.as_raw_fd();
    log::debug!("blinker thread started");

    loop {
        while counter.current() > 0 {
            if toggle_led(fd, led).is_err() {
                break;
            }
            thread::sleep(BLINK_ON);
            if toggle_led(fd, led).is_err() {
                break;
            }
            thread::sleep(BLINK_OFF_LONG);
        }
        log::debug!("blinker thread signalling all unmounted");

        for _ in 0..BLINKS_AT_END {
            if toggle_led(fd, led).is_err() {
                break;
            }
            thread::sleep(BLINK_ON);
            if toggle_led(fd, led).is_err() {
                break;
            }
            thread::sleep(BLINK_OFF_SHORT);
        }

        let mut running = BLINKER_RUNNING.lock();
        if counter.current() > 0 {
            log::debug!("blinker thread resuming");
            continue;
        }
        log::debug!("blinker thread exiting");
        *running = false;
        return;
    }
}
