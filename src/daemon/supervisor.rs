// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-shot daemon start-up: lock file, fork, readiness handshake.
//!
//! Several hotplug front-ends may race to start the daemon. The first to create the lock
//! file forks it; the forked child signals `SIGUSR1` once its socket is listening, and the
//! winner removes the lock. Losers just wait a moment for the socket to appear.

// From dependency library
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use nix::unistd::ForkResult;

// From standard library
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

// From this library
use crate::daemon::DaemonError;

/// Takes the start-up lock and forks the daemon, waiting for its readiness signal.
///
/// `run_daemon` is executed in the forked child and must not return; its error, if any, is
/// logged before the child exits non-zero.
pub fn start_daemon<F>(lock_path: &Path, run_daemon: F) -> Result<(), DaemonError>
where
    F: FnOnce() -> Result<(), DaemonError>,
{
    let mut startsigs = SigSet::empty();
    startsigs.add(Signal::SIGUSR1);
    startsigs.add(Signal::SIGCHLD);
    let mut old_mask = SigSet::empty();
    nix::sys::signal::pthread_sigmask(
        SigmaskHow::SIG_BLOCK,
        Some(&startsigs),
        Some(&mut old_mask),
    )
    .map_err(DaemonError::Signal)?;

    let lock = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path);
    match lock {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // Another front-end won the race; give its daemon a moment to open the socket.
            restore_mask(&old_mask);
            std::thread::sleep(Duration::from_secs(2));
            return Ok(());
        }
        Err(e) => {
            restore_mask(&old_mask);
            return Err(DaemonError::IoError(e));
        }
    }

    match unsafe { nix::unistd::fork() } {
        Err(e) => {
            let _ = std::fs::remove_file(lock_path);
            restore_mask(&old_mask);
            Err(DaemonError::Fork(e))
        }
        Ok(ForkResult::Child) => {
            restore_mask(&old_mask);
            match run_daemon() {
                Ok(()) => std::process::exit(0),
                Err(e) => {
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Ok(ForkResult::Parent { .. }) => {
            let outcome = match startsigs.wait() {
                Ok(Signal::SIGUSR1) => Ok(()),
                Ok(_) => Err(DaemonError::StartFailed),
                Err(e) => Err(DaemonError::Signal(e)),
            };

            let _ = std::fs::remove_file(lock_path);
            restore_mask(&old_mask);
            outcome
        }
    }
}

fn restore_mask(mask: &SigSet) {
    let _ = nix::sys::signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(mask), None);
}
