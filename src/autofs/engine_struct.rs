// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use nix::errno::Errno;
use nix::mount::MsFlags;
use parking_lot::Mutex;

// From standard library
use std::fs::File;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// From this library
use crate::autofs::proto;
use crate::autofs::proto::{KernelRequest, PacketKind};
use crate::autofs::AutofsError;
use crate::autofs::MountCounter;
use crate::core::utils;
use crate::mtab;
use crate::registry::Registry;

/// The kernel-dialogue side of the daemon.
///
/// Mounts the autofs file system on the automount root, reads kernel request packets from
/// the pipe, dispatches each to a detached worker, and drives the periodic expire ioctl
/// while mounts are active. Every `missing`/`expire-multi` packet is answered with exactly
/// one `READY` or `FAIL` carrying the packet's wait-queue token.
pub struct AutofsEngine {
    root: PathBuf,
    source: String,
    pipe_rd: Mutex<Option<OwnedFd>>,
    ioctl_fd: Mutex<Option<OwnedFd>>,
    expire_freq: u32,
    v5_framing: bool,
    counter: Arc<MountCounter>,
}

impl AutofsEngine {
    /// Mounts autofs on `root` and starts the packet reader and expire driver threads.
    ///
    /// `expire_timeout` is handed to the kernel as the idle expiration in seconds;
    /// `expire_freq` paces the expire ioctl loop.
    pub fn start(
        root: &Path,
        expire_timeout: u64,
        expire_freq: u32,
        counter: Arc<MountCounter>,
        registry: Arc<Registry>,
    ) -> Result<Arc<AutofsEngine>, AutofsError> {
        log::debug!("start mounting autofs for {}", root.display());

        let (pipe_rd, pipe_wr) = nix::unistd::pipe().map_err(AutofsError::Pipe)?;

        let options = format!(
            "fd={},pgrp={},minproto=4,maxproto=4",
            pipe_wr.as_raw_fd(),
            nix::unistd::getpgrp()
        );
        let source = format!("rsmediad(pid{})", std::process::id());

        mtab::add(&source, root, "autofs", &options);
        nix::mount::mount(
            Some(source.as_str()),
            root,
            Some("autofs"),
            MsFlags::empty(),
            Some(options.as_str()),
        )
        .map_err(|e| AutofsError::Mount {
            path: root.display().to_string(),
            source: e,
        })?;
        drop(pipe_wr);

        let ioctl_fd = match File::open(root) {
            Ok(file) => OwnedFd::from(file),
            Err(e) => {
                let _ = nix::mount::umount(root);
                return Err(AutofsError::IoError(e));
            }
        };

        if let Err(e) = check_protocol(ioctl_fd.as_raw_fd(), expire_timeout) {
            let _ = nix::mount::umount(root);
            return Err(e);
        }

        let engine = Arc::new(Self {
            root: root.to_path_buf(),
            source,
            pipe_rd: Mutex::new(Some(pipe_rd)),
            ioctl_fd: Mutex::new(Some(ioctl_fd)),
            expire_freq,
            v5_framing: utils::linux_version_code() >= utils::kernel_version(3, 3, 0),
            counter,
        });

        {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.expire_loop());
        }
        {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.reader_loop(registry));
        }

        Ok(engine)
    }

    /// Returns the shared mounted-count.
    pub fn counter(&self) -> &Arc<MountCounter> {
        &self.counter
    }

    fn pipe_raw(&self) -> Option<RawFd> {
        self.pipe_rd.lock().as_ref().map(|fd| fd.as_raw_fd())
    }

    fn ioctl_raw(&self) -> Option<RawFd> {
        self.ioctl_fd.lock().as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Answers a kernel request. A zero token needs no acknowledgement.
    fn acknowledge(&self, token: u64, failed: bool) {
        if token == 0 {
            return;
        }
        let Some(fd) = self.ioctl_raw() else {
            return;
        };

        let result = if failed {
            proto::send_fail(fd, token)
        } else {
            proto::send_ready(fd, token)
        };
        if let Err(e) = result {
            log::warn!("autofs acknowledge ioctl: {}", e);
        }
    }

    fn dispatch(self: &Arc<Self>, registry: &Arc<Registry>, request: KernelRequest) {
        let engine = Arc::clone(self);
        let registry = Arc::clone(registry);

        match request.kind {
            PacketKind::Missing => {
                thread::spawn(move || {
                    log::debug!("request for {:?}", request.name);
                    let failed = registry.mount_leaf(&request.name).is_err();
                    engine.acknowledge(request.token, failed);
                });
            }
            PacketKind::ExpireMulti => {
                thread::spawn(move || {
                    let failed = registry.unmount_leaf(&request.name).is_err();
                    engine.acknowledge(request.token, failed);
                });
            }
            PacketKind::Expire => {
                log::warn!("ignoring autofs expire packet for {:?}", request.name);
            }
        }
    }

    fn reader_loop(self: Arc<Self>, registry: Arc<Registry>) {
        loop {
            match self.read_kernel_request() {
                Ok(Some(request)) => self.dispatch(&registry, request),
                Ok(None) => {
                    log::debug!("reader_loop kernel pipe closed");
                    return;
                }
                Err(e) => {
                    if utils::shutting_down() {
                        return;
                    }
                    // An unreadable or unparseable kernel pipe is not survivable; the
                    // filesystem would hang every process that walks into it.
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    fn read_kernel_request(&self) -> Result<Option<KernelRequest>, AutofsError> {
        let Some(fd) = self.pipe_raw() else {
            return Ok(None);
        };

        if self.v5_framing {
            let mut buf = [0u8; proto::V5_PACKET_SIZE];
            let n = match read_once(fd, &mut buf)? {
                0 => return Ok(None),
                n => n,
            };
            if n < proto::HEADER_SIZE {
                return Err(AutofsError::ShortRead);
            }

            proto::decode_v5(&buf).map(Some)
        } else {
            // Pre-3.3 kernels write per-type packet sizes: read the header first, size the
            // rest from the packet type.
            let mut buf = vec![0u8; proto::V5_PACKET_SIZE];
            if !read_exact(fd, &mut buf[..proto::HEADER_SIZE])? {
                return Ok(None);
            }

            let header = proto::decode_header(&buf)?;
            let kind = PacketKind::try_from(header.kind)
                .map_err(|_| AutofsError::UnknownPacket(header.kind))?;

            let total = proto::v4_packet_size(kind);
            if !read_exact(fd, &mut buf[proto::HEADER_SIZE..total])? {
                return Ok(None);
            }

            proto::decode_v4(kind, &buf[..total]).map(Some)
        }
    }

    fn expire_loop(&self) {
        while !utils::shutting_down() {
            self.counter.wait_until_active();

            while self.counter.current() > 0 && !utils::shutting_down() {
                if let Some(fd) = self.ioctl_raw() {
                    while proto::expire_leaves(fd).is_ok() {}
                } else {
                    return;
                }
                thread::sleep(Duration::from_secs(self.expire_freq as u64));
            }
        }
    }

    /// Marks the autofs mount catatonic: no new kernel requests, existing mounts stay up
    /// until torn down.
    pub fn set_catatonic(&self) {
        if let Some(fd) = self.ioctl_raw() {
            if let Err(e) = proto::set_catatonic(fd) {
                log::warn!("autofs catatonic ioctl: {}", e);
            }
        }
    }

    /// Closes the kernel descriptors and unmounts the automount root.
    pub fn stop(&self) {
        drop(self.ioctl_fd.lock().take());
        drop(self.pipe_rd.lock().take());

        if let Err(e) = nix::mount::umount(&self.root) {
            log::error!("umount({}): {}", self.root.display(), e);
        }
        mtab::rm(&self.root);
        log::debug!("stop unmounted {} ({})", self.root.display(), self.source);
    }
}

/// One pipe read, retrying `EINTR`. Returns the byte count, `0` at end of file.
fn read_once(fd: RawFd, buf: &mut [u8]) -> Result<usize, AutofsError> {
    loop {
        match nix::unistd::read(fd, buf) {
            Ok(n) => return Ok(n),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(AutofsError::PipeRead(e)),
        }
    }
}

/// Fills `buf` completely, retrying `EINTR` and accumulating short reads. Returns `false` on
/// end of file.
fn read_exact(fd: RawFd, buf: &mut [u8]) -> Result<bool, AutofsError> {
    let mut filled = 0;

    while filled < buf.len() {
        match nix::unistd::read(fd, &mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(AutofsError::PipeRead(e)),
        }
    }

    Ok(true)
}

fn check_protocol(fd: RawFd, expire_timeout: u64) -> Result<(), AutofsError> {
    let version = proto::protocol_version(fd).map_err(|e| AutofsError::Ioctl {
        name: "PROTOVER",
        source: e,
    })?;

    if version < proto::MIN_PROTO_VERSION {
        return Err(AutofsError::ProtocolTooOld(version));
    }
    if version > proto::MAX_PROTO_VERSION {
        return Err(AutofsError::ProtocolTooNew {
            found: version,
            supported: proto::MAX_PROTO_VERSION,
        });
    }

    proto::set_timeout(fd, expire_timeout).map_err(|e| AutofsError::Ioctl {
        name: "SETTIMEOUT",
        source: e,
    })
}
