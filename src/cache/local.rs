//! Filesystem-backed cache store
//!
//! `LocalCache` owns every byte under the cache directory. Workspace copies
//! are links derived from it. Callers are expected to hold a coarse lock
//! around `save`/`checkout`/`gc` on the same cache; single-entry safety comes
//! from rename-based writes.

use crate::cache::link::LinkType;
use crate::cache::link_state::LinkState;
use crate::cache::{move_file, remove_path, set_readonly, tmp_path, TMP_SUFFIX};
use crate::checksum::{
    self, is_valid_checksum, ChecksumInfo, ChecksumState, DirManifest, DIR_SUFFIX,
};
use crate::error::{ErrorKind, HoardError, HoardResult};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STATE_FILE: &str = ".state.json";
const LINKS_FILE: &str = ".links.json";

/// Construction parameters for [`LocalCache`]
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Root of the cache directory
    pub dir: PathBuf,
    /// Link strategies in priority order
    pub link_types: Vec<LinkType>,
    /// Make cache entries read-only once stored
    pub protected: bool,
    /// Workspace root whose files may be memoized
    pub work_root: Option<PathBuf>,
    /// Keep checksum and link state on disk between runs
    pub persist_state: bool,
}

impl CacheSettings {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            link_types: LinkType::DEFAULT_ORDER.to_vec(),
            protected: true,
            work_root: None,
            persist_state: true,
        }
    }

    pub fn with_link_types(mut self, types: Vec<LinkType>) -> Self {
        self.link_types = types;
        self
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }
}

/// What `checkout` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkout {
    /// The workspace already matched the cache
    Unchanged,
    /// Content was (re)linked from the cache
    Restored,
}

/// Result of a garbage collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Entries removed because nothing references them
    pub removed: usize,
    /// Orphaned temporary files removed
    pub orphans: usize,
}

/// Checksum-addressed store on the local filesystem
#[derive(Debug)]
pub struct LocalCache {
    dir: PathBuf,
    link_types: Vec<LinkType>,
    protected: bool,
    state: ChecksumState,
    links: LinkState,
}

impl LocalCache {
    /// Open (and create if needed) a cache directory
    pub fn open(settings: CacheSettings) -> HoardResult<Self> {
        fs::create_dir_all(&settings.dir)
            .map_err(|e| HoardError::io_at(&settings.dir, "creating cache directory", e))?;

        if settings.link_types.is_empty() {
            return Err(HoardError::UnknownLinkType("<empty list>".to_string()));
        }

        let mut roots = vec![settings.dir.clone()];
        roots.extend(settings.work_root.clone());

        let (state, links) = if settings.persist_state {
            (
                ChecksumState::load(settings.dir.join(STATE_FILE), roots),
                LinkState::load(settings.dir.join(LINKS_FILE)),
            )
        } else {
            (ChecksumState::in_memory(roots), LinkState::in_memory())
        };

        debug!(
            "Opened cache {} (types: {:?})",
            settings.dir.display(),
            settings.link_types
        );

        Ok(Self {
            dir: settings.dir,
            link_types: settings.link_types,
            protected: settings.protected,
            state,
            links,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }

    pub fn link_state(&self) -> &LinkState {
        &self.links
    }

    /// Path of the entry addressed by `checksum`
    pub fn get(&self, checksum: &str) -> Option<PathBuf> {
        if !is_valid_checksum(checksum) {
            return None;
        }
        Some(self.dir.join(&checksum[..2]).join(&checksum[2..]))
    }

    /// Checksum addressed by a path inside the cache
    pub fn path_to_checksum(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.dir).ok()?;
        let mut parts = rel.components();
        let shard = parts.next()?.as_os_str().to_str()?;
        let rest = parts.next()?.as_os_str().to_str()?;
        if parts.next().is_some() {
            return None;
        }
        let checksum = format!("{}{}", shard, rest);
        is_valid_checksum(&checksum).then_some(checksum)
    }

    /// Whether an entry file exists, without verifying it
    pub fn exists(&self, checksum: &str) -> bool {
        self.get(checksum).is_some_and(|p| p.is_file())
    }

    /// Every checksum present in the cache
    pub fn all(&self) -> HoardResult<BTreeSet<String>> {
        let mut found = BTreeSet::new();

        for (checksum, _) in self.scan()? {
            if !checksum.ends_with(TMP_SUFFIX) {
                found.insert(checksum);
            }
        }
        Ok(found)
    }

    /// Walk the shard directories, returning entries and orphaned temp files
    fn scan(&self) -> HoardResult<Vec<(String, PathBuf)>> {
        let mut entries = Vec::new();
        let shards = fs::read_dir(&self.dir)
            .map_err(|e| HoardError::io_at(&self.dir, "listing cache", e))?;

        for shard in shards {
            let shard = shard.map_err(|e| HoardError::io("reading cache entry", e))?;
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            if shard_name.len() != 2 || !shard.path().is_dir() {
                continue;
            }

            let files = fs::read_dir(shard.path())
                .map_err(|e| HoardError::io_at(&shard.path(), "listing", e))?;
            for file in files {
                let file = file.map_err(|e| HoardError::io("reading cache entry", e))?;
                let name = file.file_name().to_string_lossy().into_owned();
                let checksum = format!("{}{}", shard_name, name);
                if name.ends_with(TMP_SUFFIX) || is_valid_checksum(&checksum) {
                    entries.push((checksum, file.path()));
                }
            }
        }

        Ok(entries)
    }

    /// Whether the entry for `checksum` is absent or corrupted
    ///
    /// A corrupted entry is deleted on detection so the next save or fetch
    /// recreates it.
    pub fn changed(&self, checksum: &str) -> HoardResult<bool> {
        let Some(cache) = self.get(checksum) else {
            return Ok(true);
        };

        let actual = match self.state.file_checksum(&cache) {
            Ok(actual) => actual,
            Err(HoardError::PathNotFound(_)) => return Ok(true),
            Err(e) => return Err(e),
        };

        let expected = checksum.strip_suffix(DIR_SUFFIX).unwrap_or(checksum);
        if actual == expected {
            return Ok(false);
        }

        warn!("Corrupted cache file {}", cache.display());
        remove_path(&cache).map_err(|e| HoardError::io_at(&cache, "removing", e))?;
        self.state.forget(&cache);
        Ok(true)
    }

    /// Read a directory manifest from the cache
    ///
    /// A manifest that cannot be parsed is removed from the cache.
    pub fn load_dir_cache(&self, checksum: &str) -> HoardResult<DirManifest> {
        let path = self
            .get(checksum)
            .ok_or_else(|| HoardError::CacheMissing(checksum.to_string()))?;
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HoardError::CacheMissing(checksum.to_string()),
            _ => HoardError::io_at(&path, "reading manifest", e),
        })?;

        DirManifest::from_bytes(&bytes).map_err(|e| {
            warn!("Dir cache file format error {}: removing it", path.display());
            let _ = remove_path(&path);
            self.state.forget(&path);
            HoardError::ManifestInvalid {
                path: path.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Compute the checksum of a workspace path without storing it
    pub fn save_info(&self, path: &Path) -> HoardResult<ChecksumInfo> {
        self.state.checksum(path)
    }

    /// Store a workspace file or directory and relink it from the cache
    pub fn save(&self, path: &Path) -> HoardResult<ChecksumInfo> {
        let (info, written) = self.store(path)?;
        if written == 0 {
            info!("'{}' didn't change, skipping", path.display());
        } else {
            info!("Saved '{}' ({} new cache entries)", path.display(), written);
        }
        self.flush()?;
        Ok(info)
    }

    /// Store `path`, returning its checksum and the number of entries written
    fn store(&self, path: &Path) -> HoardResult<(ChecksumInfo, usize)> {
        let meta = fs::metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;

        if meta.is_dir() {
            let (info, manifest) = self.state.checksum_dir(path)?;
            let mut written = 0;

            for entry in manifest.entries() {
                let file = path.join(&entry.relpath);
                if self.store_file(&file, &entry.checksum)? {
                    written += 1;
                }
            }

            if self.changed(info.as_str())? {
                debug!("Saving directory '{}' as {}", path.display(), info);
                self.write_entry(info.as_str(), &manifest.to_bytes()?)?;
                written += 1;
            }

            self.materialize_dir(path, &manifest)?;
            Ok((info, written))
        } else if meta.is_file() {
            let checksum = self.state.file_checksum(path)?;
            let written = usize::from(self.store_file(path, &checksum)?);
            self.materialize_file(path, &checksum)?;
            Ok((ChecksumInfo::new(checksum), written))
        } else {
            Err(HoardError::NotFileOrDir(path.to_path_buf()))
        }
    }

    /// Move one workspace file into the cache unless a verified entry exists
    fn store_file(&self, path: &Path, checksum: &str) -> HoardResult<bool> {
        if !self.changed(checksum)? {
            debug!("'{}' didn't change, skipping", path.display());
            return Ok(false);
        }

        let cache = self.entry_path(checksum)?;
        debug!("Saving '{}' to '{}'", path.display(), cache.display());

        // Two renames so the final step is atomic even across filesystems.
        let tmp = tmp_path(&cache);
        move_file(path, &tmp).map_err(|e| HoardError::io_at(path, "moving into cache", e))?;
        move_file(&tmp, &cache).map_err(|e| HoardError::io_at(&cache, "moving into place", e))?;

        self.state.forget(path);
        self.links.forget(path);
        self.protect(&cache)?;
        Ok(true)
    }

    /// Write an in-memory entry (a manifest) under `checksum`
    fn write_entry(&self, checksum: &str, bytes: &[u8]) -> HoardResult<()> {
        let cache = self.entry_path(checksum)?;
        let tmp = tmp_path(&cache);
        fs::write(&tmp, bytes).map_err(|e| HoardError::io_at(&tmp, "writing", e))?;
        move_file(&tmp, &cache).map_err(|e| HoardError::io_at(&cache, "moving into place", e))?;
        self.protect(&cache)
    }

    /// Entry path with its shard directory created
    pub(crate) fn entry_path(&self, checksum: &str) -> HoardResult<PathBuf> {
        let cache = self
            .get(checksum)
            .ok_or_else(|| HoardError::Internal(format!("invalid checksum '{}'", checksum)))?;
        if let Some(parent) = cache.parent() {
            fs::create_dir_all(parent).map_err(|e| HoardError::io_at(parent, "creating", e))?;
        }
        Ok(cache)
    }

    /// Finish an entry written by a download: verify it, then protect it
    ///
    /// Returns `false` (and removes the entry) when its content does not
    /// match `checksum`.
    pub fn accept_download(&self, checksum: &str) -> HoardResult<bool> {
        if self.changed(checksum)? {
            return Ok(false);
        }
        if let Some(cache) = self.get(checksum) {
            self.protect(&cache)?;
        }
        Ok(true)
    }

    fn protect(&self, cache: &Path) -> HoardResult<()> {
        if self.protected {
            set_readonly(cache, true).map_err(|e| HoardError::io_at(cache, "protecting", e))?;
        }
        Ok(())
    }

    /// Materialize `info` at `path` from the cache
    ///
    /// Missing or corrupted cache content removes whatever is at `path` and
    /// returns [`HoardError::CacheMissing`]. Existing content that differs
    /// from `info` is only replaced when `force` is set.
    pub fn checkout(&self, path: &Path, info: &ChecksumInfo, force: bool) -> HoardResult<Checkout> {
        if self.changed(info.as_str())? {
            warn!(
                "Cache '{}' not found. File '{}' won't be created.",
                info,
                path.display()
            );
            self.remove(path)?;
            return Err(HoardError::CacheMissing(info.to_string()));
        }

        let manifest = if info.is_dir() {
            Some(self.load_dir_cache(info.as_str())?)
        } else {
            None
        };

        if fs::symlink_metadata(path).is_ok() {
            if self.is_unchanged(path, info)? {
                debug!("Data '{}' didn't change", path.display());
                return Ok(Checkout::Unchanged);
            }
            if !force {
                return Err(HoardError::WouldOverwrite(path.to_path_buf()));
            }
            debug!("Data '{}' exists. Replacing it", path.display());
        }

        debug!("Checking out '{}' with cache '{}'", path.display(), info);
        match manifest {
            Some(manifest) => self.materialize_dir(path, &manifest)?,
            None => self.materialize_file(path, info.as_str())?,
        }

        self.flush()?;
        Ok(Checkout::Restored)
    }

    fn is_unchanged(&self, path: &Path, info: &ChecksumInfo) -> HoardResult<bool> {
        if !info.is_dir() && self.links.is_current(path, info.as_str()) {
            return Ok(true);
        }
        match self.state.checksum(path) {
            Ok(actual) => Ok(&actual == info),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(HoardError::NotFileOrDir(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn materialize_file(&self, path: &Path, checksum: &str) -> HoardResult<()> {
        if self.links.is_current(path, checksum) {
            return Ok(());
        }
        let cache = self
            .get(checksum)
            .ok_or_else(|| HoardError::CacheMissing(checksum.to_string()))?;
        self.link(&cache, path)?;
        Ok(())
    }

    /// Link every manifest entry under `path` and drop files it doesn't list
    fn materialize_dir(&self, path: &Path, manifest: &DirManifest) -> HoardResult<()> {
        if fs::symlink_metadata(path).is_ok_and(|m| !m.is_dir()) {
            self.remove(path)?;
        }
        // Created up front so an empty manifest still yields a directory.
        fs::create_dir_all(path).map_err(|e| HoardError::io_at(path, "creating", e))?;

        let mut missing = Vec::new();
        for entry in manifest.entries() {
            let file = path.join(&entry.relpath);
            if !self.exists(&entry.checksum) {
                missing.push(entry.checksum.clone());
                continue;
            }
            self.materialize_file(&file, &entry.checksum)?;
        }

        let listed: HashSet<&str> = manifest.entries().iter().map(|e| e.relpath.as_str()).collect();
        for (relpath, file) in checksum::walk_files(path)? {
            if !listed.contains(relpath.as_str()) {
                debug!("Removing '{}' not present in cache", file.display());
                self.remove(&file)?;
            }
        }

        if let Some(first) = missing.first() {
            warn!(
                "{} file(s) of '{}' are missing from the cache",
                missing.len(),
                path.display()
            );
            return Err(HoardError::CacheMissing(first.clone()));
        }
        Ok(())
    }

    /// Link a cache entry to `dest`, trying each configured strategy in order
    pub fn link(&self, src: &Path, dest: &Path) -> HoardResult<LinkType> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| HoardError::io_at(parent, "creating", e))?;
        }
        remove_path(dest).map_err(|e| HoardError::io_at(dest, "removing", e))?;

        let mut tried = Vec::new();
        for kind in &self.link_types {
            match kind.link(src, dest) {
                Ok(()) => {
                    if !kind.shares_storage() {
                        set_readonly(dest, false)
                            .map_err(|e| HoardError::io_at(dest, "unprotecting", e))?;
                    }
                    if let Some(checksum) = self.path_to_checksum(src) {
                        self.links.record(dest, &checksum, *kind)?;
                    }
                    debug!("Linked '{}' with {}", dest.display(), kind);
                    return Ok(*kind);
                }
                Err(e) => {
                    debug!("Cache type '{}' is not supported: {}", kind, e);
                    let _ = remove_path(dest);
                    tried.push(format!("{}: {}", kind, e));
                }
            }
        }

        Err(HoardError::LinkFailed {
            path: dest.to_path_buf(),
            tried: tried.join("; "),
        })
    }

    /// Replace links under `path` with private writable copies
    pub fn unprotect(&self, path: &Path) -> HoardResult<usize> {
        let meta = fs::metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;
        let files = if meta.is_dir() {
            checksum::walk_files(path)?
                .into_iter()
                .map(|(_, file)| file)
                .collect()
        } else {
            vec![path.to_path_buf()]
        };

        let mut count = 0;
        for file in files {
            if self.unprotect_file(&file)? {
                count += 1;
            }
        }
        self.flush()?;
        Ok(count)
    }

    fn unprotect_file(&self, path: &Path) -> HoardResult<bool> {
        let link_meta =
            fs::symlink_metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;
        let linked = link_meta.file_type().is_symlink() || is_shared(&link_meta);
        if !linked && !link_meta.permissions().readonly() {
            return Ok(false);
        }

        debug!("Unprotecting '{}'", path.display());
        let tmp = tmp_path(path);
        fs::copy(path, &tmp).map_err(|e| HoardError::io_at(path, "copying", e))?;
        set_readonly(&tmp, false).map_err(|e| HoardError::io_at(&tmp, "unprotecting", e))?;
        remove_path(path).map_err(|e| HoardError::io_at(path, "removing", e))?;
        fs::rename(&tmp, path).map_err(|e| HoardError::io_at(path, "replacing", e))?;

        self.links.forget(path);
        Ok(true)
    }

    /// Remove a workspace path and forget any state about it
    pub fn remove(&self, path: &Path) -> HoardResult<()> {
        remove_path(path).map_err(|e| HoardError::io_at(path, "removing", e))?;
        self.links.forget_under(path);
        self.state.forget(path);
        Ok(())
    }

    /// Every checksum referenced by `infos`, including directory contents
    pub fn expand(&self, infos: &[ChecksumInfo]) -> HoardResult<BTreeSet<String>> {
        let mut used = BTreeSet::new();
        for info in infos {
            used.insert(info.checksum.clone());
            if !info.is_dir() {
                continue;
            }
            match self.load_dir_cache(info.as_str()) {
                Ok(manifest) => {
                    used.extend(manifest.entries().iter().map(|e| e.checksum.clone()));
                }
                Err(e) if e.is_skippable() => warn!("Skipping contents of {}: {}", info, e),
                Err(e) => return Err(e),
            }
        }
        Ok(used)
    }

    /// Delete every entry not referenced by `live`, plus orphaned temp files
    pub fn gc(&self, live: &[ChecksumInfo]) -> HoardResult<GcReport> {
        let used = self.expand(live)?;
        let mut report = GcReport::default();

        for (checksum, path) in self.scan()? {
            if checksum.ends_with(TMP_SUFFIX) {
                debug!("Removing orphaned temporary file '{}'", path.display());
                remove_path(&path).map_err(|e| HoardError::io_at(&path, "removing", e))?;
                report.orphans += 1;
                continue;
            }
            if used.contains(&checksum) {
                continue;
            }
            debug!("Removing unused cache entry {}", checksum);
            remove_path(&path).map_err(|e| HoardError::io_at(&path, "removing", e))?;
            self.state.forget(&path);
            report.removed += 1;
        }

        info!(
            "Garbage collected {} entries and {} temporary files",
            report.removed, report.orphans
        );
        self.flush()?;
        Ok(report)
    }

    /// Persist checksum and link state
    pub fn flush(&self) -> HoardResult<()> {
        self.state.flush()?;
        self.links.flush()
    }
}


#[cfg(unix)]
fn is_shared(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.nlink() > 1
}

#[cfg(not(unix))]
fn is_shared(_meta: &fs::Metadata) -> bool {
    false
}
