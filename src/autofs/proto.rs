// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel autofs wire ABI: packet layouts, packet types, ioctls.
//!
//! Mirrors `<linux/auto_fs4.h>`. Packet structs are read verbatim off the kernel pipe, so
//! their layout must match the kernel's exactly.

// From dependency library
use libc::{c_int, c_ulong};
use num_enum::TryFromPrimitive;

// From standard library
use std::mem;
use std::os::unix::io::RawFd;

// From this library
use crate::autofs::AutofsError;

/// Longest mountpoint leaf name in a kernel packet.
pub const NAME_MAX: usize = 255;

/// Oldest protocol version this daemon accepts.
pub const MIN_PROTO_VERSION: c_int = 4;

/// Newest protocol version this daemon accepts.
pub const MAX_PROTO_VERSION: c_int = 5;

/// `AUTOFS_EXP_LEAVES`: only expire leaf mounts.
pub const EXPIRE_LEAVES: c_int = 2;

const AUTOFS_IOC_MAGIC: u8 = 0x93;

nix::ioctl_read!(autofs_ioc_protover, AUTOFS_IOC_MAGIC, 0x63, c_int);
nix::ioctl_readwrite!(autofs_ioc_settimeout, AUTOFS_IOC_MAGIC, 0x64, c_ulong);
nix::ioctl_write_ptr!(autofs_ioc_expire_multi, AUTOFS_IOC_MAGIC, 0x66, c_int);

/// An ioctl whose argument is a plain value, not a pointer (the acknowledgement calls carry
/// the wait-queue token this way).
fn ioctl_with_value(fd: RawFd, request: c_ulong, value: c_ulong) -> nix::Result<c_int> {
    nix::errno::Errno::result(unsafe { libc::ioctl(fd, request, value) })
}

fn ready_request() -> c_ulong {
    nix::request_code_none!(AUTOFS_IOC_MAGIC, 0x60) as c_ulong
}

fn fail_request() -> c_ulong {
    nix::request_code_none!(AUTOFS_IOC_MAGIC, 0x61) as c_ulong
}

fn catatonic_request() -> c_ulong {
    nix::request_code_none!(AUTOFS_IOC_MAGIC, 0x62) as c_ulong
}

/// Common header of every kernel packet.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PacketHeader {
    /// Protocol version the kernel speaks.
    pub proto_version: c_int,
    /// Packet type, see [`PacketKind`].
    pub kind: c_int,
}

/// Protocol 4 `missing` packet: a lookup hit an unmounted entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MissingPacket {
    pub header: PacketHeader,
    pub wait_queue_token: c_ulong,
    pub len: c_int,
    pub name: [u8; NAME_MAX + 1],
}

/// Protocol 4 `expire` packet. Not used by current kernels, parsed only so the typed-length
/// framing can skip it.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExpirePacket {
    pub header: PacketHeader,
    pub len: c_int,
    pub name: [u8; NAME_MAX + 1],
}

/// Protocol 4 `expire-multi` packet: the kernel wants an idle entry unmounted.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExpireMultiPacket {
    pub header: PacketHeader,
    pub wait_queue_token: c_ulong,
    pub len: c_int,
    pub name: [u8; NAME_MAX + 1],
}

/// Protocol 5 packet layout. Kernels since 3.3 write this fixed size for every packet type,
/// regardless of the negotiated protocol version.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct V5Packet {
    pub header: PacketHeader,
    pub wait_queue_token: c_ulong,
    pub dev: u32,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub tgid: u32,
    pub len: u32,
    pub name: [u8; NAME_MAX + 1],
}

/// Size of the common packet header.
pub const HEADER_SIZE: usize = mem::size_of::<PacketHeader>();

/// Size of a protocol 5 packet.
pub const V5_PACKET_SIZE: usize = mem::size_of::<V5Packet>();

/// Packet types consumed from the kernel pipe.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum PacketKind {
    /// A lookup needs the entry mounted.
    Missing = 0,
    /// Single-mount expiry, unused by current kernels.
    Expire = 1,
    /// The kernel proposes an idle entry for unmounting.
    ExpireMulti = 2,
}

/// A decoded kernel request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KernelRequest {
    /// What the kernel asks for.
    pub kind: PacketKind,
    /// Wait-queue token to return in the acknowledgement, `0` if the packet carries none.
    pub token: u64,
    /// Mountpoint leaf name. May be empty when the packet carried a zero length.
    pub name: String,
}

fn read_struct<T: Copy>(buf: &[u8]) -> T {
    debug_assert!(buf.len() >= mem::size_of::<T>());

    unsafe { std::ptr::read_unaligned(buf.as_ptr().cast::<T>()) }
}

fn name_from_bytes(name: &[u8], len: usize) -> String {
    let len = len.min(name.len());

    String::from_utf8_lossy(&name[..len]).into_owned()
}

/// Decodes the common header from the front of a packet buffer.
pub fn decode_header(buf: &[u8]) -> Result<PacketHeader, AutofsError> {
    if buf.len() < HEADER_SIZE {
        return Err(AutofsError::ShortRead);
    }

    Ok(read_struct::<PacketHeader>(buf))
}

/// Returns the full on-wire size of a protocol 4 packet of the given type.
pub fn v4_packet_size(kind: PacketKind) -> usize {
    match kind {
        PacketKind::Missing => mem::size_of::<MissingPacket>(),
        PacketKind::Expire => mem::size_of::<ExpirePacket>(),
        PacketKind::ExpireMulti => mem::size_of::<ExpireMultiPacket>(),
    }
}

/// Decodes a packet read with protocol 5 framing.
pub fn decode_v5(buf: &[u8; V5_PACKET_SIZE]) -> Result<KernelRequest, AutofsError> {
    let packet = read_struct::<V5Packet>(buf);
    let kind = PacketKind::try_from(packet.header.kind)
        .map_err(|_| AutofsError::UnknownPacket(packet.header.kind))?;

    Ok(KernelRequest {
        kind,
        token: packet.wait_queue_token as u64,
        name: name_from_bytes(&packet.name, packet.len as usize),
    })
}

/// Decodes a packet read with protocol 4 typed-length framing. `buf` holds the whole packet,
/// header included.
pub fn decode_v4(kind: PacketKind, buf: &[u8]) -> Result<KernelRequest, AutofsError> {
    if buf.len() < v4_packet_size(kind) {
        return Err(AutofsError::ShortRead);
    }

    let request = match kind {
        PacketKind::Missing => {
            let packet = read_struct::<MissingPacket>(buf);
            KernelRequest {
                kind,
                token: packet.wait_queue_token as u64,
                name: name_from_bytes(&packet.name, packet.len.max(0) as usize),
            }
        }
        PacketKind::Expire => {
            let packet = read_struct::<ExpirePacket>(buf);
            KernelRequest {
                kind,
                token: 0,
                name: name_from_bytes(&packet.name, packet.len.max(0) as usize),
            }
        }
        PacketKind::ExpireMulti => {
            let packet = read_struct::<ExpireMultiPacket>(buf);
            KernelRequest {
                kind,
                token: packet.wait_queue_token as u64,
                name: name_from_bytes(&packet.name, packet.len.max(0) as usize),
            }
        }
    };

    Ok(request)
}

/// Reads the kernel's autofs protocol version from the root ioctl descriptor.
pub fn protocol_version(fd: RawFd) -> nix::Result<c_int> {
    let mut version: c_int = 0;
    unsafe { autofs_ioc_protover(fd, &mut version) }?;

    Ok(version)
}

/// Sets the kernel's idle expiration timeout, in seconds.
pub fn set_timeout(fd: RawFd, seconds: u64) -> nix::Result<()> {
    let mut timeout = seconds as c_ulong;
    unsafe { autofs_ioc_settimeout(fd, &mut timeout) }?;

    Ok(())
}

/// Asks the kernel to expire one idle leaf mount. Returns an error when there is no further
/// candidate.
pub fn expire_leaves(fd: RawFd) -> nix::Result<()> {
    let how: c_int = EXPIRE_LEAVES;
    unsafe { autofs_ioc_expire_multi(fd, &how) }?;

    Ok(())
}

/// Acknowledges a kernel request as satisfied.
pub fn send_ready(fd: RawFd, token: u64) -> nix::Result<()> {
    ioctl_with_value(fd, ready_request(), token as c_ulong)?;

    Ok(())
}

/// Acknowledges a kernel request as failed.
pub fn send_fail(fd: RawFd, token: u64) -> nix::Result<()> {
    ioctl_with_value(fd, fail_request(), token as c_ulong)?;

    Ok(())
}

/// Puts the autofs mount in the catatonic state: the kernel stops issuing new requests,
/// existing mounts stay traversable until torn down.
pub fn set_catatonic(fd: RawFd) -> nix::Result<()> {
    ioctl_with_value(fd, catatonic_request(), 0)?;

    Ok(())
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    fn v5_bytes(kind: PacketKind, token: u64, name: &str) -> [u8; V5_PACKET_SIZE] {
        let mut packet = V5Packet {
            header: PacketHeader {
                proto_version: 5,
                kind: kind as c_int,
            },
            wait_queue_token: token as c_ulong,
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            pid: 0,
            tgid: 0,
            len: name.len() as u32,
            name: [0; NAME_MAX + 1],
        };
        packet.name[..name.len()].copy_from_slice(name.as_bytes());

        let mut buf = [0u8; V5_PACKET_SIZE];
        unsafe {
            std::ptr::write_unaligned(buf.as_mut_ptr().cast::<V5Packet>(), packet);
        }
        buf
    }

    #[test]
    fn proto_decode_v5_extracts_token_and_name() {
        let buf = v5_bytes(PacketKind::Missing, 42, "sdb1");

        let actual = decode_v5(&buf).unwrap();
        let expected = KernelRequest {
            kind: PacketKind::Missing,
            token: 42,
            name: "sdb1".to_owned(),
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn proto_decode_v5_zero_length_yields_an_empty_name() {
        let buf = v5_bytes(PacketKind::ExpireMulti, 7, "");

        let actual = decode_v5(&buf).unwrap();
        assert_eq!(actual.name, "");
        assert_eq!(actual.token, 7);
    }

    #[test]
    fn proto_decode_v5_rejects_unknown_packet_types() {
        let mut buf = v5_bytes(PacketKind::Missing, 1, "x");
        let header = PacketHeader {
            proto_version: 5,
            kind: 99,
        };
        unsafe {
            std::ptr::write_unaligned(buf.as_mut_ptr().cast::<PacketHeader>(), header);
        }

        assert!(matches!(
            decode_v5(&buf),
            Err(AutofsError::UnknownPacket(99))
        ));
    }

    #[test]
    fn proto_decode_v4_missing_packet() {
        let mut packet = MissingPacket {
            header: PacketHeader {
                proto_version: 4,
                kind: PacketKind::Missing as c_int,
            },
            wait_queue_token: 99,
            len: 4,
            name: [0; NAME_MAX + 1],
        };
        packet.name[..4].copy_from_slice(b"sdc2");

        let mut buf = vec![0u8; mem::size_of::<MissingPacket>()];
        unsafe {
            std::ptr::write_unaligned(buf.as_mut_ptr().cast::<MissingPacket>(), packet);
        }

        let actual = decode_v4(PacketKind::Missing, &buf).unwrap();
        let expected = KernelRequest {
            kind: PacketKind::Missing,
            token: 99,
            name: "sdc2".to_owned(),
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn proto_decode_header_requires_a_full_header() {
        let buf = [0u8; HEADER_SIZE - 1];

        assert!(matches!(
            decode_header(&buf),
            Err(AutofsError::ShortRead)
        ));
    }

    #[test]
    fn proto_v4_packet_sizes_differ_by_type() {
        assert_eq!(
            v4_packet_size(PacketKind::Missing),
            v4_packet_size(PacketKind::ExpireMulti)
        );
        assert!(v4_packet_size(PacketKind::Expire) < v4_packet_size(PacketKind::Missing));
    }
}
