//! Advisory record of workspace links into the cache
//!
//! Remembers which workspace paths were linked to which cache entry, and the
//! signature the link had when it was made. A record is only trusted while
//! the signature still matches; anything else falls back to re-hashing.

use crate::cache::link::LinkType;
use crate::checksum::state::{utf8_keyed, write_json_atomic, Signature};
use crate::error::HoardResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// One workspace link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Cache entry the path was linked from
    pub checksum: String,
    /// Strategy that succeeded
    pub kind: LinkType,
    /// Signature of the workspace path right after linking
    pub signature: Signature,
    pub linked_at: DateTime<Utc>,
}

/// Table of workspace links, optionally persisted as JSON
#[derive(Debug)]
pub struct LinkState {
    file: Option<PathBuf>,
    links: Mutex<HashMap<PathBuf, LinkRecord>>,
    dirty: AtomicBool,
}

impl LinkState {
    pub fn in_memory() -> Self {
        Self {
            file: None,
            links: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load a persisted table; an unreadable file starts empty
    pub fn load(file: PathBuf) -> Self {
        let links = match fs::read(&file) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring unreadable link state {}: {}", file.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            file: Some(file),
            links: Mutex::new(links),
            dirty: AtomicBool::new(false),
        }
    }

    /// Remember that `path` was just linked from `checksum`
    pub fn record(&self, path: &Path, checksum: &str, kind: LinkType) -> HoardResult<()> {
        let signature = Signature::of_link(path)?;
        self.lock().insert(
            path.to_path_buf(),
            LinkRecord {
                checksum: checksum.to_string(),
                kind,
                signature,
                linked_at: Utc::now(),
            },
        );
        self.dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<LinkRecord> {
        self.lock().get(path).cloned()
    }

    /// Whether `path` is still the untouched link to `checksum` we made
    pub fn is_current(&self, path: &Path, checksum: &str) -> bool {
        let Some(record) = self.get(path) else {
            return false;
        };
        record.checksum == checksum
            && Signature::of_link(path).is_ok_and(|sig| sig == record.signature)
    }

    pub fn forget(&self, path: &Path) {
        if self.lock().remove(path).is_some() {
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Forget `path` and everything beneath it
    pub fn forget_under(&self, path: &Path) {
        let mut links = self.lock();
        let before = links.len();
        links.retain(|p, _| !p.starts_with(path));
        if links.len() != before {
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) -> HoardResult<()> {
        let Some(ref file) = self.file else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let snapshot = utf8_keyed(&self.lock(), "link state");
        write_json_atomic(file, &snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, LinkRecord>> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_then_current() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo");
        fs::write(&path, "foo").unwrap();

        let state = LinkState::in_memory();
        state.record(&path, "abc", LinkType::Copy).unwrap();

        assert!(state.is_current(&path, "abc"));
        assert!(!state.is_current(&path, "def"));
    }

    #[test]
    fn replaced_file_is_not_current() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo");
        fs::write(&path, "foo").unwrap();

        let state = LinkState::in_memory();
        state.record(&path, "abc", LinkType::Copy).unwrap();

        fs::remove_file(&path).unwrap();
        fs::write(&path, "something else entirely").unwrap();

        assert!(!state.is_current(&path, "abc"));
    }

    #[test]
    fn forget_under_prunes_subtree() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        let a = dir.path().join("data/a");
        let b = dir.path().join("b");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let state = LinkState::in_memory();
        state.record(&a, "1", LinkType::Hardlink).unwrap();
        state.record(&b, "2", LinkType::Hardlink).unwrap();

        state.forget_under(&dir.path().join("data"));

        assert_eq!(state.len(), 1);
        assert!(state.get(&b).is_some());
    }

    #[test]
    fn persists_across_loads() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("links.json");
        let path = dir.path().join("foo");
        fs::write(&path, "foo").unwrap();

        let state = LinkState::load(file.clone());
        state.record(&path, "abc", LinkType::Symlink).unwrap();
        state.flush().unwrap();

        let reloaded = LinkState::load(file);
        assert_eq!(reloaded.get(&path).unwrap().kind, LinkType::Symlink);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn flush_survives_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("links.json");
        let odd = dir.path().join(OsStr::from_bytes(b"odd\xfe"));
        let plain = dir.path().join("plain");
        fs::write(&odd, "odd").unwrap();
        fs::write(&plain, "plain").unwrap();

        let state = LinkState::load(file.clone());
        state.record(&odd, "abc", LinkType::Copy).unwrap();
        state.record(&plain, "def", LinkType::Copy).unwrap();
        state.flush().unwrap();

        let reloaded = LinkState::load(file);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get(&plain).is_some());
        assert!(state.get(&odd).is_some());
    }
}
