// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// Mount path runtime errors. Each one is answered to the kernel with a `FAIL`
/// acknowledgement.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MountError {
    /// The requested leaf has no registered entry.
    #[error("no entry registered for mountpoint {0:?}")]
    UnknownMountpoint(String),

    /// The medium carries no detectable file system.
    #[error("no filesystem found on {0}")]
    NoFilesystem(String),

    /// A `mount.<fstype>` helper ran and reported failure.
    #[error("mount helper {helper} exited with status {status}")]
    Helper {
        /// Helper binary path.
        helper: String,
        /// Raw exit status.
        status: i32,
    },

    /// Error while spawning a `mount.<fstype>` helper.
    #[error("failed to run mount helper {helper}: {source}")]
    HelperSpawn {
        /// Helper binary path.
        helper: String,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// The mount(2) syscall failed.
    #[error("mount({device}): {source}")]
    Syscall {
        /// Device the mount was attempted for.
        device: String,
        /// Underlying failure.
        source: nix::Error,
    },
}
