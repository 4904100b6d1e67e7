// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hotplug front-end and daemon bootstrapper.
//!
//! Invoked by the device manager with `ACTION`/`DEVNAME`/`ID_*` in the environment, it
//! forwards the event to the daemon over the command socket, starting the daemon first if
//! none is running. `rsmediad start` only ensures the daemon runs.

// From dependency library
use clap::Parser;
use syslog::{BasicLogger, Facility, Formatter3164};

// From standard library
use std::io::ErrorKind;
use std::os::unix::net::UnixStream;
use std::path::Path;

// From this library
use rsmediad::daemon::{command, daemon_main, supervisor, DaemonOptions};

const MAX_IDS: usize = command::MAX_IDS;

#[derive(Debug, Parser)]
#[command(
    name = "rsmediad",
    about = "Automounter daemon for removable block devices"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Make sure the daemon is running, starting it if necessary.
    Start,
}

fn init_logging() {
    let formatter = Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "rsmediad".to_owned(),
        pid: std::process::id(),
    };

    match syslog::unix(formatter) {
        Ok(logger) => {
            if log::set_boxed_logger(Box::new(BasicLogger::new(logger))).is_ok() {
                log::set_max_level(log::LevelFilter::Info);
            }
        }
        Err(e) => eprintln!("rsmediad: cannot connect to syslog: {}", e),
    }
}

fn fatal(message: &str) -> ! {
    log::error!("{}", message);
    eprintln!("rsmediad: {}", message);
    std::process::exit(1);
}

/// Connects to the daemon socket, starting a daemon when none answers.
fn connect_daemon(socket_path: &Path) -> Option<UnixStream> {
    match UnixStream::connect(socket_path) {
        Ok(stream) => Some(stream),
        Err(e)
            if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::ConnectionRefused =>
        {
            None
        }
        Err(e) => fatal(&format!("connect: {}", e)),
    }
}

fn start_daemon_process() {
    let outcome = supervisor::start_daemon(Path::new(command::LOCK_PATH), || {
        daemon_main(DaemonOptions::default())
    });

    if let Err(e) = outcome {
        fatal(&e.to_string());
    }
}

fn ensure_daemon_running(socket_path: &Path) {
    match connect_daemon(socket_path) {
        Some(_) => println!("Daemon already running."),
        None => {
            println!("Starting daemon...");
            start_daemon_process();
        }
    }
}

fn send_event(socket_path: &Path, cmd: char, device: &str, ids: &[String]) {
    let mut stream = match connect_daemon(socket_path) {
        Some(stream) => stream,
        None => {
            start_daemon_process();
            match connect_daemon(socket_path) {
                Some(stream) => stream,
                None => fatal("daemon socket did not appear"),
            }
        }
    };

    if let Err(e) = command::send_command(&mut stream, cmd, device, ids) {
        fatal(&format!("sending command: {}", e));
    }
}

fn hotplug_event(socket_path: &Path) {
    let Ok(action) = std::env::var("ACTION") else {
        fatal("environment variable 'ACTION' not set");
    };
    if action != "add" && action != "remove" {
        fatal("ACTION must be 'add' or 'remove'");
    }
    let Ok(devname) = std::env::var("DEVNAME") else {
        fatal("environment variable 'DEVNAME' not set");
    };

    if action == "add" {
        let ids: Vec<String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("ID_") || key == "DEVPATH")
            .map(|(key, value)| format!("{}={}", key, value))
            .take(MAX_IDS)
            .collect();

        send_event(socket_path, '+', &devname, &ids);
    } else {
        send_event(socket_path, '-', &devname, &[]);
    }
}

fn main() {
    init_logging();

    if !nix::unistd::geteuid().is_root() {
        fatal("You must be root");
    }

    let cli = Cli::parse();
    let socket_path = Path::new(command::SOCKET_PATH);

    match cli.command {
        Some(Command::Start) => ensure_daemon_running(socket_path),
        None => hotplug_event(socket_path),
    }
}
