// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use parking_lot::Mutex;

// From standard library
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

// From this library
use crate::config::parser;
use crate::config::Settings;
use crate::core::rules::RuleSet;

/// One coherent generation of configuration: scalar settings plus rule tables.
#[derive(Clone, Debug, Default)]
pub struct ConfigSnapshot {
    /// Scalar daemon settings.
    pub settings: Settings,
    /// Rule tables.
    pub rules: RuleSet,
}

#[derive(Debug)]
struct Inner {
    snapshot: Arc<ConfigSnapshot>,
    mtime: Option<SystemTime>,
}

/// The daemon's configuration, re-read when the file's mtime changes.
///
/// Readers take a cheap snapshot pointer; a reload builds a whole new snapshot and swaps the
/// pointer under the mutex, so rule evaluation never observes a half-loaded file.
#[derive(Debug)]
pub struct SharedConfig {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl SharedConfig {
    /// Creates a configuration bound to `path`, starting from built-in defaults. Nothing is
    /// read until [`reload_if_changed`](Self::reload_if_changed) runs.
    pub fn new<T>(path: T) -> SharedConfig
    where
        T: AsRef<Path>,
    {
        Self {
            path: path.as_ref().to_path_buf(),
            inner: Mutex::new(Inner {
                snapshot: Arc::new(ConfigSnapshot::default()),
                mtime: None,
            }),
        }
    }

    /// Returns the current configuration generation.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.inner.lock().snapshot)
    }

    /// Installs a configuration generation directly, bypassing the file.
    pub fn install(&self, snapshot: ConfigSnapshot) {
        self.inner.lock().snapshot = Arc::new(snapshot);
    }

    /// Re-reads the configuration file if its modification time changed since the last
    /// load. A missing file keeps the current generation.
    pub fn reload_if_changed(&self) {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return;
        };
        let Ok(mtime) = metadata.modified() else {
            return;
        };

        let mut inner = self.inner.lock();
        if inner.mtime == Some(mtime) {
            return;
        }

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                log::error!("{}: {}", self.path.display(), e);
                return;
            }
        };

        log::debug!("reload_if_changed re-reading {}", self.path.display());
        inner.snapshot = Arc::new(parser::parse(&contents, &self.path.display().to_string()));
        inner.mtime = Some(mtime);
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn shared_config_starts_with_defaults() {
        let config = SharedConfig::new("/nonexistent/rsmediad.conf");

        let snapshot = config.current();
        assert_eq!(snapshot.settings, Settings::default());
        assert!(snapshot.rules.aliases.is_empty());
    }

    #[test]
    fn shared_config_missing_file_keeps_the_current_generation() {
        let config = SharedConfig::new("/nonexistent/rsmediad.conf");
        let before = config.current();
        config.reload_if_changed();

        let after = config.current();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn shared_config_reloads_when_the_file_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsmediad.conf");
        std::fs::write(&path, "debug = yes\n").unwrap();

        let config = SharedConfig::new(&path);
        config.reload_if_changed();

        assert!(config.current().settings.debug);
    }

    #[test]
    fn shared_config_skips_reload_when_mtime_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsmediad.conf");
        std::fs::write(&path, "debug = yes\n").unwrap();

        let config = SharedConfig::new(&path);
        config.reload_if_changed();
        let first = config.current();
        config.reload_if_changed();

        let second = config.current();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn shared_config_install_swaps_the_generation() {
        let config = SharedConfig::new("/nonexistent/rsmediad.conf");

        let mut snapshot = ConfigSnapshot::default();
        snapshot.settings.uuid_alias = true;
        config.install(snapshot);

        assert!(config.current().settings.uuid_alias);
    }
}
