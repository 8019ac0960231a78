//! Memoized checksums keyed by file signature
//!
//! Re-hashing large files is the dominant cost of `save` and `changed`, so
//! checksums are remembered per path together with the `(mtime, size,
//! inode)` signature they were computed for. A signature mismatch is a cache
//! miss. Only paths under the configured roots are ever memoized.

use crate::checksum::{self, ChecksumInfo, DirManifest};
use crate::error::{HoardError, HoardResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Identity of a file's content as far as the filesystem can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub size: u64,
    pub inode: u64,
}

impl Signature {
    /// Read the signature of `path`, following symlinks
    pub fn of(path: &Path) -> HoardResult<Self> {
        let meta = fs::metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;
        Ok(Self::from_metadata(&meta))
    }

    /// Read the signature of `path` itself, not of a symlink target
    pub fn of_link(path: &Path) -> HoardResult<Self> {
        let meta =
            fs::symlink_metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;
        Ok(Self::from_metadata(&meta))
    }

    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();

        Self {
            mtime_secs: mtime.as_secs(),
            mtime_nanos: mtime.subsec_nanos(),
            size: meta.len(),
            inode: inode(meta),
        }
    }
}

#[cfg(unix)]
fn inode(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &fs::Metadata) -> u64 {
    0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateEntry {
    signature: Signature,
    checksum: String,
}

/// Memo of file checksums, optionally persisted as JSON
#[derive(Debug)]
pub struct ChecksumState {
    file: Option<PathBuf>,
    roots: Vec<PathBuf>,
    entries: Mutex<HashMap<PathBuf, StateEntry>>,
    dirty: AtomicBool,
}

impl ChecksumState {
    /// Memo that lives only as long as this value
    pub fn in_memory(roots: Vec<PathBuf>) -> Self {
        Self {
            file: None,
            roots: roots.into_iter().map(absolute).collect(),
            entries: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load a persisted memo; an unreadable file starts empty
    pub fn load(file: PathBuf, roots: Vec<PathBuf>) -> Self {
        let entries = match fs::read(&file) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<PathBuf, StateEntry>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Ignoring unreadable checksum state {}: {}", file.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        debug!("Loaded {} memoized checksums", entries.len());
        Self {
            file: Some(file),
            roots: roots.into_iter().map(absolute).collect(),
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
        }
    }

    fn tracked(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    /// Checksum of a regular file, reusing the memo when the signature matches
    pub fn file_checksum(&self, path: &Path) -> HoardResult<String> {
        let path = absolute(path.to_path_buf());
        if !self.tracked(&path) {
            return checksum::file_checksum(&path);
        }

        let signature = Signature::of(&path)?;
        if let Some(entry) = self.lock().get(&path) {
            if entry.signature == signature {
                return Ok(entry.checksum.clone());
            }
        }

        let checksum = checksum::file_checksum(&path)?;
        // The file may have changed while it was read; only remember stable results.
        if Signature::of(&path)? == signature {
            self.lock().insert(
                path,
                StateEntry {
                    signature,
                    checksum: checksum.clone(),
                },
            );
            self.dirty.store(true, Ordering::Relaxed);
        }
        Ok(checksum)
    }

    /// Checksum a file or directory using the memo for every file
    pub fn checksum(&self, path: &Path) -> HoardResult<ChecksumInfo> {
        let meta = fs::metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;
        if meta.is_dir() {
            Ok(self.checksum_dir(path)?.0)
        } else if meta.is_file() {
            Ok(ChecksumInfo::new(self.file_checksum(path)?))
        } else {
            Err(HoardError::NotFileOrDir(path.to_path_buf()))
        }
    }

    /// Checksum a directory tree and return its manifest
    pub fn checksum_dir(&self, path: &Path) -> HoardResult<(ChecksumInfo, DirManifest)> {
        checksum::collect_dir(path, |file| self.file_checksum(file))
    }

    /// Drop any memo for `path`
    pub fn forget(&self, path: &Path) {
        if self.lock().remove(&absolute(path.to_path_buf())).is_some() {
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Number of memoized paths
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the memo if it changed since the last flush
    pub fn flush(&self) -> HoardResult<()> {
        let Some(ref file) = self.file else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        // Drop entries whose files are gone before writing.
        let snapshot = {
            let mut entries = self.lock();
            entries.retain(|path, _| path.exists());
            utf8_keyed(&entries, "checksum state")
        };
        write_json_atomic(file, &snapshot)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, StateEntry>> {
        // A poisoned memo is still a valid memo: entries are inserted whole.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Write `value` as JSON next to `path` and rename it into place
/// Copy of a path-keyed table with every key as a string
///
/// JSON object keys must be strings, so paths that are not valid UTF-8 are
/// left out of the persisted copy and stay in memory only.
pub(crate) fn utf8_keyed<V: Clone>(table: &HashMap<PathBuf, V>, what: &str) -> BTreeMap<String, V> {
    let mut keyed = BTreeMap::new();
    for (path, value) in table {
        match path.to_str() {
            Some(key) => {
                keyed.insert(key.to_string(), value.clone());
            }
            None => warn!("Not persisting {} for non-UTF-8 path {}", what, path.display()),
        }
    }
    keyed
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> HoardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| HoardError::io_at(parent, "creating", e))?;
    }
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    let content = serde_json::to_vec(value)?;
    fs::write(&tmp, content).map_err(|e| HoardError::io_at(&tmp, "writing", e))?;
    fs::rename(&tmp, path).map_err(|e| HoardError::io_at(path, "replacing", e))?;
    Ok(())
}
