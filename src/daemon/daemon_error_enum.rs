// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library
use crate::autofs::AutofsError;

/// Daemon start-up and supervision runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DaemonError {
    #[error(transparent)]
    Autofs(#[from] AutofsError),

    /// Error while creating the command socket.
    #[error("socket {path}: {source}")]
    Socket {
        /// Socket path.
        path: String,
        /// Underlying failure.
        source: std::io::Error,
    },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Error while configuring signal handling.
    #[error("signal setup: {0}")]
    Signal(nix::Error),

    /// Error while forking the daemon process.
    #[error("fork: {0}")]
    Fork(nix::Error),

    /// The forked daemon died before signalling readiness.
    #[error("daemon failed to start")]
    StartFailed,

    /// The caller lacks the privileges to run the daemon.
    #[error("{0}")]
    Privilege(String),
}
