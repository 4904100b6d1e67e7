// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// Unmount path runtime errors. Each one is answered to the kernel with a `FAIL`
/// acknowledgement; the entry stays `mounted` so the kernel retries later.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnmountError {
    /// The requested leaf has no registered entry.
    #[error("no entry registered for mountpoint {0:?}")]
    UnknownMountpoint(String),

    /// The entry is pinned by `no_automount` and refuses kernel-driven expiry.
    #[error("{0} is pinned and not expirable")]
    Pinned(String),

    /// The umount(2) syscall failed.
    #[error("umount({path}): {source}")]
    Syscall {
        /// Mountpoint the unmount was attempted on.
        path: String,
        /// Underlying failure.
        source: nix::Error,
    },
}
