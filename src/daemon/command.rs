// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The command channel: hotplug add/remove requests over a local stream socket.
//!
//! Framing: one command byte (`+` or `-`), then a length-prefixed device name, then a
//! 16-bit count, then that many length-prefixed identity strings. Length prefixes are
//! 16-bit big-endian byte counts that include a trailing NUL.

// From dependency library

// From standard library
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

// From this library
use crate::core::errors::CommandError;
use crate::core::utils;
use crate::registry::Registry;

/// Well-known socket path of the daemon.
pub const SOCKET_PATH: &str = "/dev/.rsmediad";

/// Lock file coordinating one-shot daemon start-up.
pub const LOCK_PATH: &str = "/dev/.rsmediad.lock";

/// Cap on identity strings per request, matching the hotplug front-end.
pub const MAX_IDS: usize = 32;

fn read_num<R: Read>(reader: &mut R) -> Result<u16, CommandError> {
    let mut buf = [0u8; 2];
    reader
        .read_exact(&mut buf)
        .map_err(|_| CommandError::Truncated)?;

    Ok(u16::from_be_bytes(buf))
}

fn read_str<R: Read>(reader: &mut R) -> Result<String, CommandError> {
    let len = read_num(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|_| CommandError::Truncated)?;

    // The length includes the trailing NUL.
    if buf.last() == Some(&0) {
        buf.pop();
    }

    String::from_utf8(buf).map_err(|e| CommandError::Encoding(e.to_string()))
}

fn write_num<W: Write>(writer: &mut W, num: u16) -> Result<(), CommandError> {
    writer.write_all(&num.to_be_bytes())?;

    Ok(())
}

fn write_str<W: Write>(writer: &mut W, value: &str) -> Result<(), CommandError> {
    let len = value.len() + 1;
    if len > u16::MAX as usize {
        return Err(CommandError::Oversized(value.len()));
    }

    write_num(writer, len as u16)?;
    writer.write_all(value.as_bytes())?;
    writer.write_all(&[0])?;

    Ok(())
}

/// Sends one add/remove command over `stream`.
pub fn send_command(
    stream: &mut UnixStream,
    command: char,
    device: &str,
    ids: &[String],
) -> Result<(), CommandError> {
    stream.write_all(&[command as u8])?;
    write_str(stream, device)?;
    write_num(stream, ids.len() as u16)?;
    for id in ids {
        write_str(stream, id)?;
    }

    Ok(())
}

/// Handles one accepted connection: decodes the frame, scrubs the identity strings, and
/// forwards the request to the registry.
pub fn handle_connection(
    mut stream: UnixStream,
    registry: &Arc<Registry>,
) -> Result<(), CommandError> {
    let mut command = [0u8; 1];
    let n = stream.read(&mut command)?;
    if n == 0 {
        // Peer connected and went away; used to probe for a running daemon.
        return Ok(());
    }

    let command = command[0] as char;
    if command != '+' && command != '-' {
        return Err(CommandError::BadCommand(command));
    }

    let device = read_str(&mut stream)?;
    let count = read_num(&mut stream)? as usize;
    let mut ids = Vec::with_capacity(count.min(MAX_IDS));
    for _ in 0..count {
        let id = read_str(&mut stream)?;
        ids.push(utils::scrub_untrusted_chars(&id));
    }
    drop(stream);

    if command == '+' {
        registry.add_device(&device, None, &ids);
    } else {
        registry.remove_device(&device);
    }

    Ok(())
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use crate::autofs::MountCounter;
    use crate::config::SharedConfig;
    use pretty_assertions::{assert_eq, assert_ne};
    use std::io::Cursor;

    #[test]
    fn command_codec_round_trips_strings() {
        let mut buf = Vec::new();
        write_str(&mut buf, "/dev/sdb1").unwrap();

        let mut cursor = Cursor::new(buf);
        let actual = read_str(&mut cursor).unwrap();
        let expected = "/dev/sdb1";
        assert_eq!(actual, expected);
    }

    #[test]
    fn command_codec_length_prefix_counts_the_trailing_nul() {
        let mut buf = Vec::new();
        write_str(&mut buf, "abc").unwrap();

        assert_eq!(buf, vec![0, 4, b'a', b'b', b'c', 0]);
    }

    #[test]
    fn command_codec_reports_truncated_frames() {
        let mut cursor = Cursor::new(vec![0u8, 10, b'a']);

        assert!(matches!(
            read_str(&mut cursor),
            Err(CommandError::Truncated)
        ));
    }

    #[test]
    fn command_handle_connection_registers_a_device() {
        let media = tempfile::tempdir().unwrap();
        let config = Arc::new(SharedConfig::new("/nonexistent/rsmediad.conf"));
        let counter = Arc::new(MountCounter::new());
        let registry = Arc::new(crate::registry::Registry::new(
            media.path(),
            config,
            counter,
        ));

        let (mut client, server) = UnixStream::pair().unwrap();
        let ids = vec![
            "DEVPATH=/devices/test/sdb/sdb1".to_owned(),
            "ID_FS_TYPE=vfat".to_owned(),
            "ID_FS_LABEL=STICK".to_owned(),
        ];
        send_command(&mut client, '+', "/dev/sdb1", &ids).unwrap();
        drop(client);

        handle_connection(server, &registry).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(media.path().join("sdb1").is_dir());
    }

    #[test]
    fn command_handle_connection_scrubs_identity_strings() {
        let media = tempfile::tempdir().unwrap();
        let config = Arc::new(SharedConfig::new("/nonexistent/rsmediad.conf"));
        let counter = Arc::new(MountCounter::new());
        let registry = Arc::new(crate::registry::Registry::new(
            media.path(),
            config,
            counter,
        ));

        let (mut client, server) = UnixStream::pair().unwrap();
        let ids = vec![
            "DEVPATH=/devices/test/sdb/sdb1".to_owned(),
            "ID_FS_TYPE=vfat".to_owned(),
            "ID_FS_LABEL=EVIL`reboot`".to_owned(),
        ];
        send_command(&mut client, '+', "/dev/sdb1", &ids).unwrap();
        drop(client);

        handle_connection(server, &registry).unwrap();

        assert!(media.path().join("EVIL_reboot_").exists());
    }

    #[test]
    fn command_handle_connection_rejects_unknown_commands() {
        let media = tempfile::tempdir().unwrap();
        let config = Arc::new(SharedConfig::new("/nonexistent/rsmediad.conf"));
        let counter = Arc::new(MountCounter::new());
        let registry = Arc::new(crate::registry::Registry::new(
            media.path(),
            config,
            counter,
        ));

        let (mut client, server) = UnixStream::pair().unwrap();
        client.write_all(b"?").unwrap();
        drop(client);

        assert!(matches!(
            handle_connection(server, &registry),
            Err(CommandError::BadCommand('?'))
        ));
    }

    #[test]
    fn command_handle_connection_accepts_a_probe_connection() {
        let media = tempfile::tempdir().unwrap();
        let config = Arc::new(SharedConfig::new("/nonexistent/rsmediad.conf"));
        let counter = Arc::new(MountCounter::new());
        let registry = Arc::new(crate::registry::Registry::new(
            media.path(),
            config,
            counter,
        ));

        let (client, server) = UnixStream::pair().unwrap();
        drop(client);

        assert!(handle_connection(server, &registry).is_ok());
    }
}
