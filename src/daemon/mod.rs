// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The daemon: wiring, accept loop, signal-driven shutdown.

// From dependency library
use nix::sys::signal::{SigHandler, SigSet, SigmaskHow, Signal};
use typed_builder::TypedBuilder;

// From standard library
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

// From this library
use crate::autofs::{AutofsEngine, MountCounter};
use crate::config::SharedConfig;
use crate::core::utils;
use crate::registry::Registry;

pub use daemon_error_enum::DaemonError;

pub mod command;
pub mod supervisor;

mod coldplug;
mod daemon_error_enum;

/// Paths and locations the daemon operates on.
#[derive(Debug, TypedBuilder)]
pub struct DaemonOptions {
    /// The automount root published through autofs.
    #[builder(default = PathBuf::from("/media"), setter(into))]
    pub automount_root: PathBuf,

    /// The configuration file, re-read on every add when its mtime changes.
    #[builder(default = PathBuf::from("/etc/rsmediad.conf"), setter(into))]
    pub config_path: PathBuf,

    /// The command socket the hotplug front-end connects to.
    #[builder(default = PathBuf::from(command::SOCKET_PATH), setter(into))]
    pub socket_path: PathBuf,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Runs the daemon: mounts autofs, opens the command socket, and serves requests until a
/// termination signal arrives.
///
/// Expects to run in a freshly forked child (see
/// [`supervisor::start_daemon`]); signals readiness to the parent process with `SIGUSR1`.
pub fn daemon_main(options: DaemonOptions) -> Result<(), DaemonError> {
    let _ = nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0));
    let _ = nix::unistd::chdir("/");

    // Termination signals are blocked in every thread; one dedicated thread waits for them
    // and runs the teardown.
    let mut termsigs = SigSet::empty();
    termsigs.add(Signal::SIGINT);
    termsigs.add(Signal::SIGQUIT);
    termsigs.add(Signal::SIGTERM);
    nix::sys::signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&termsigs), None)
        .map_err(DaemonError::Signal)?;
    unsafe {
        let _ = nix::sys::signal::signal(Signal::SIGHUP, SigHandler::SigIgn);
        let _ = nix::sys::signal::signal(Signal::SIGCHLD, SigHandler::SigIgn);
    }

    let config = Arc::new(SharedConfig::new(&options.config_path));
    config.reload_if_changed();
    let settings = config.current().settings.clone();
    log::set_max_level(if settings.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let listener = open_socket(&options.socket_path)?;
    let counter = Arc::new(MountCounter::new());
    let registry = Arc::new(Registry::new(
        &options.automount_root,
        Arc::clone(&config),
        Arc::clone(&counter),
    ));
    let engine = AutofsEngine::start(
        &options.automount_root,
        settings.expire_timeout,
        settings.expire_freq,
        counter,
        Arc::clone(&registry),
    )?;

    {
        let registry = Arc::clone(&registry);
        let engine = Arc::clone(&engine);
        let socket_path = options.socket_path.clone();
        thread::spawn(move || shutdown_on_signal(termsigs, registry, engine, socket_path));
    }

    log::debug!("daemon running");
    let _ = nix::sys::signal::kill(nix::unistd::getppid(), Signal::SIGUSR1);

    if settings.scan_fstab {
        let registry = Arc::clone(&registry);
        thread::spawn(move || coldplug::coldplug(&registry));
    }

    for stream in listener.incoming() {
        if utils::shutting_down() {
            break;
        }

        match stream {
            Ok(stream) => {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    if let Err(e) = command::handle_connection(stream, &registry) {
                        log::warn!("command connection: {}", e);
                    }
                });
            }
            Err(e) => log::warn!("accept: {}", e),
        }
    }

    Ok(())
}

fn open_socket(path: &Path) -> Result<UnixListener, DaemonError> {
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path).map_err(|e| DaemonError::Socket {
        path: path.display().to_string(),
        source: e,
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
        DaemonError::Socket {
            path: path.display().to_string(),
            source: e,
        }
    })?;

    Ok(listener)
}

fn shutdown_on_signal(
    termsigs: SigSet,
    registry: Arc<Registry>,
    engine: Arc<AutofsEngine>,
    socket_path: PathBuf,
) {
    let signal = match termsigs.wait() {
        Ok(signal) => signal,
        Err(e) => {
            log::error!("sigwait: {}", e);
            return;
        }
    };

    log::info!("received signal {}, shutting down", signal);
    utils::begin_shutdown();
    engine.set_catatonic();
    registry.drain();
    engine.stop();
    let _ = std::fs::remove_file(&socket_path);
    log::debug!("daemon exiting");
    std::process::exit(0);
}
