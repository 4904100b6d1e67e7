// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Advisory `/etc/mtab` maintenance.
//!
//! Writers take the classic `mtab~` hard-link lock. On systems where `/etc/mtab` is a
//! symlink into `/proc` nothing is ever written. A read-only `/etc` (early boot) queues the
//! update; a background thread replays the queue once the file system becomes writable.

// From dependency library
use once_cell::sync::Lazy;
use parking_lot::Mutex;

// From standard library
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::Duration;

// From this library

const ETC_MTAB: &str = "/etc/mtab";
const LOCK_TRIES: u32 = 5;
const REPLAY_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct PendingOp {
    add: bool,
    device: String,
    dir: String,
    fstype: String,
    options: String,
}

#[derive(Debug, Default)]
struct MtabWriter {
    /// Serialises mtab access within the process; the link file serialises across processes.
    gate: Mutex<()>,
    /// Memoised usability check: `None` until first use, `Some(false)` when mtab is not a
    /// regular file.
    usable: Mutex<Option<bool>>,
    queue: Mutex<Vec<PendingOp>>,
}

static MTAB: Lazy<MtabWriter> = Lazy::new(MtabWriter::default);

enum LockOutcome {
    Locked,
    Unusable,
    ReadOnly,
    Busy,
}

fn is_usable() -> bool {
    let mut usable = MTAB.usable.lock();
    *usable.get_or_insert_with(|| {
        std::fs::symlink_metadata(ETC_MTAB)
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    })
}

fn take_lock() -> LockOutcome {
    if !is_usable() {
        return LockOutcome::Unusable;
    }

    let staging = format!("{}~{}", ETC_MTAB, std::process::id());
    let lock = format!("{}~", ETC_MTAB);

    for attempt in 0..LOCK_TRIES {
        match OpenOptions::new().write(true).create(true).open(&staging) {
            Ok(_) => {}
            Err(e) if e.raw_os_error() == Some(libc::EROFS) => return LockOutcome::ReadOnly,
            Err(e) => {
                log::error!("{}: {}", staging, e);
                return LockOutcome::Busy;
            }
        }

        match std::fs::hard_link(&staging, &lock) {
            Ok(()) => {
                let _ = std::fs::remove_file(&staging);
                return LockOutcome::Locked;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Somebody else holds the lock.
                let _ = std::fs::remove_file(&staging);
                if attempt >= 3 {
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
            Err(e) => {
                log::error!("link({}): {}", lock, e);
                let _ = std::fs::remove_file(&staging);
                return LockOutcome::Busy;
            }
        }
    }

    LockOutcome::Busy
}

fn release_lock() {
    let _ = std::fs::remove_file(format!("{}~", ETC_MTAB));
}

/// Escapes a field for an `fstab`-format line.
fn encode_field(field: &str) -> String {
    let mut encoded = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            ' ' => encoded.push_str("\\040"),
            '\t' => encoded.push_str("\\011"),
            '\n' => encoded.push_str("\\012"),
            '\\' => encoded.push_str("\\134"),
            _ => encoded.push(c),
        }
    }

    encoded
}

fn decode_field(field: &str) -> String {
    let mut decoded = String::with_capacity(field.len());
    let mut chars = field.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }

        let octal: String = chars.by_ref().take(3).collect();
        match u32::from_str_radix(&octal, 8).ok().and_then(char::from_u32) {
            Some(decoded_char) => decoded.push(decoded_char),
            None => {
                decoded.push('\\');
                decoded.push_str(&octal);
            }
        }
    }

    decoded
}

fn write_entry(device: &str, dir: &str, fstype: &str, options: &str) {
    let mut file = match OpenOptions::new().append(true).open(ETC_MTAB) {
        Ok(file) => file,
        Err(e) => {
            log::warn!("can't open {}: {}", ETC_MTAB, e);
            return;
        }
    };

    let line = format!(
        "{} {} {} {} 0 0\n",
        encode_field(device),
        encode_field(dir),
        encode_field(fstype),
        encode_field(options)
    );
    if let Err(e) = file.write_all(line.as_bytes()) {
        log::warn!("can't write {}: {}", ETC_MTAB, e);
    }
}

fn erase_entry(dir: &str) {
    let contents = match std::fs::read_to_string(ETC_MTAB) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("can't open {}: {}", ETC_MTAB, e);
            return;
        }
    };

    let kept: String = contents
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .nth(1)
                .map(decode_field)
                .as_deref()
                != Some(dir)
        })
        .fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        });

    if let Err(e) = std::fs::write(ETC_MTAB, kept) {
        log::warn!("can't write {}: {}", ETC_MTAB, e);
    }
}

fn enqueue(op: PendingOp) {
    let mut queue = MTAB.queue.lock();
    let was_empty = queue.is_empty();
    queue.push(op);

    if was_empty {
        std::thread::spawn(replay_queue);
    }
}

fn replay_queue() {
    loop {
        std::thread::sleep(REPLAY_PAUSE);

        let _gate = MTAB.gate.lock();
        match take_lock() {
            LockOutcome::ReadOnly => continue,
            LockOutcome::Busy => continue,
            LockOutcome::Unusable => {
                MTAB.queue.lock().clear();
                return;
            }
            LockOutcome::Locked => {
                let pending: Vec<PendingOp> = MTAB.queue.lock().drain(..).collect();
                for op in pending {
                    if op.add {
                        write_entry(&op.device, &op.dir, &op.fstype, &op.options);
                    } else {
                        erase_entry(&op.dir);
                    }
                }
                release_lock();
                return;
            }
        }
    }
}

/// Records a mount in `/etc/mtab`. Best effort: a read-only `/etc` queues the record, an
/// mtab symlinked into `/proc` ignores it.
pub fn add(device: &str, dir: &Path, fstype: &str, options: &str) {
    let _gate = MTAB.gate.lock();

    match take_lock() {
        LockOutcome::Locked => {
            write_entry(device, &dir.display().to_string(), fstype, options);
            release_lock();
        }
        LockOutcome::ReadOnly => enqueue(PendingOp {
            add: true,
            device: device.to_owned(),
            dir: dir.display().to_string(),
            fstype: fstype.to_owned(),
            options: options.to_owned(),
        }),
        LockOutcome::Unusable | LockOutcome::Busy => {}
    }
}

/// Removes the record of `dir` from `/etc/mtab`. Best effort, same caveats as [`add`].
pub fn rm(dir: &Path) {
    let _gate = MTAB.gate.lock();

    match take_lock() {
        LockOutcome::Locked => {
            erase_entry(&dir.display().to_string());
            release_lock();
        }
        LockOutcome::ReadOnly => enqueue(PendingOp {
            add: false,
            device: String::new(),
            dir: dir.display().to_string(),
            fstype: String::new(),
            options: String::new(),
        }),
        LockOutcome::Unusable | LockOutcome::Busy => {}
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn mtab_encode_field_escapes_whitespace_and_backslash() {
        let actual = encode_field("My USB\tstick\\here");
        let expected = "My\\040USB\\011stick\\134here";
        assert_eq!(actual, expected);
    }

    #[test]
    fn mtab_decode_field_inverts_encode_field() {
        let original = "My USB\tstick\\here";
        let actual = decode_field(&encode_field(original));
        let expected = original;
        assert_eq!(actual, expected);
    }

    #[test]
    fn mtab_decode_field_keeps_malformed_escapes() {
        let actual = decode_field("a\\xyz");
        let expected = "a\\xyz";
        assert_eq!(actual, expected);
    }
}
