// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// Kernel autofs dialogue runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AutofsError {
    /// Error while creating the kernel communication pipe.
    #[error("pipe: {0}")]
    Pipe(nix::Error),

    /// Error while mounting the autofs file system on the automount root.
    #[error("mount(autofs, {path}): {source}")]
    Mount {
        /// Automount root the mount was attempted on.
        path: String,
        /// Underlying mount(2) failure.
        source: nix::Error,
    },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// An autofs ioctl failed.
    #[error("autofs ioctl {name}: {source}")]
    Ioctl {
        /// Ioctl mnemonic.
        name: &'static str,
        /// Underlying failure.
        source: nix::Error,
    },

    /// The running kernel speaks an autofs protocol older than version 4.
    #[error("kernel autofs protocol too old ({0} < 4)")]
    ProtocolTooOld(i32),

    /// The running kernel speaks an autofs protocol newer than this daemon.
    #[error("kernel autofs protocol too new ({found} > {supported})")]
    ProtocolTooNew {
        /// Version the kernel reported.
        found: i32,
        /// Newest version this daemon understands.
        supported: i32,
    },

    /// The kernel sent a packet type this daemon cannot size.
    #[error("unknown autofs packet type {0} received from kernel")]
    UnknownPacket(i32),

    /// Error while reading the kernel request pipe.
    #[error("pipe read error: {0}")]
    PipeRead(nix::Error),

    /// The kernel request pipe delivered less than a packet header.
    #[error("pipe short read")]
    ShortRead,
}
