//! Content checksums for files and directory trees
//!
//! A file checksum is the SHA256 of its raw bytes, read in 64 KiB chunks.
//! A directory checksum is the SHA256 of its serialized manifest with
//! [`DIR_SUFFIX`] appended, so the two kinds can never collide.
//!
//! # Manifest format
//!
//! A JSON list of `{"relpath": ..., "sha256": ...}` objects sorted by
//! `relpath`, with keys in sorted order and no whitespace. Re-serializing an
//! unchanged tree yields byte-identical output.

pub mod state;

pub use state::ChecksumState;

use crate::error::{HoardError, HoardResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Key under which the digest is stored in checksum records
pub const CHECKSUM_KEY: &str = "sha256";

/// Key under which a manifest entry stores its path
pub const RELPATH_KEY: &str = "relpath";

/// Marker appended to the checksum of a directory manifest
pub const DIR_SUFFIX: &str = ".dir";

/// Read size used when streaming file content
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Checksum record of a tracked file or directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChecksumInfo {
    #[serde(rename = "sha256")]
    pub checksum: String,
}

impl ChecksumInfo {
    pub fn new(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
        }
    }

    /// Whether this checksum addresses a directory manifest
    pub fn is_dir(&self) -> bool {
        is_dir_checksum(&self.checksum)
    }

    pub fn as_str(&self) -> &str {
        &self.checksum
    }
}

impl fmt::Display for ChecksumInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.checksum)
    }
}

/// One regular file inside a directory manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirEntry {
    /// Path relative to the manifest root, `/`-separated
    pub relpath: String,
    #[serde(rename = "sha256")]
    pub checksum: String,
}

/// Sorted list of every regular file under a directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirManifest {
    entries: Vec<DirEntry>,
}

impl DirManifest {
    /// Build a manifest, sorting entries by path
    pub fn new(mut entries: Vec<DirEntry>) -> Self {
        entries.sort_by(|a, b| a.relpath.cmp(&b.relpath));
        entries.dedup_by(|a, b| a.relpath == b.relpath);
        Self { entries }
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical serialized form
    pub fn to_bytes(&self) -> HoardResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.entries)?)
    }

    /// Parse a serialized manifest and sort its entries
    ///
    /// Every entry must name a checksum and a relative path that stays
    /// inside the manifest root.
    pub fn from_bytes(bytes: &[u8]) -> HoardResult<Self> {
        let entries: Vec<DirEntry> = serde_json::from_slice(bytes)?;
        for entry in &entries {
            validate_relpath(&entry.relpath)?;
            validate(&entry.checksum)?;
        }
        Ok(Self::new(entries))
    }

    /// Checksum of the canonical serialization, tagged as a directory
    pub fn checksum(&self) -> HoardResult<ChecksumInfo> {
        let bytes = self.to_bytes()?;
        Ok(ChecksumInfo::new(format!(
            "{}{}",
            bytes_checksum(&bytes),
            DIR_SUFFIX
        )))
    }
}

/// Whether a string is a well-formed cache address
pub fn is_valid_checksum(checksum: &str) -> bool {
    let hex = checksum.strip_suffix(DIR_SUFFIX).unwrap_or(checksum);
    hex.len() > 2 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Reject anything that is not a well-formed cache address
pub fn validate(checksum: &str) -> HoardResult<()> {
    if is_valid_checksum(checksum) {
        Ok(())
    } else {
        Err(HoardError::InvalidChecksum(checksum.to_string()))
    }
}

/// Reject manifest paths that are empty, absolute, or climb out of the root
fn validate_relpath(relpath: &str) -> HoardResult<()> {
    let unsafe_segment = relpath
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    let all_normal = Path::new(relpath)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));

    if unsafe_segment || !all_normal {
        return Err(HoardError::UnsafeRelpath(relpath.to_string()));
    }
    Ok(())
}

/// Whether a raw checksum string addresses a directory manifest
pub fn is_dir_checksum(checksum: &str) -> bool {
    checksum.ends_with(DIR_SUFFIX)
}

/// SHA256 of an in-memory buffer
pub fn bytes_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a file through SHA256
pub fn file_checksum(path: &Path) -> HoardResult<String> {
    let mut file = File::open(path).map_err(|e| HoardError::io_at(path, "opening", e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| HoardError::io_at(path, "reading", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Checksum a file or directory without memoization
pub fn checksum(path: &Path) -> HoardResult<ChecksumInfo> {
    let meta = std::fs::metadata(path).map_err(|e| HoardError::io_at(path, "inspecting", e))?;
    if meta.is_dir() {
        Ok(checksum_dir(path)?.0)
    } else if meta.is_file() {
        Ok(ChecksumInfo::new(file_checksum(path)?))
    } else {
        Err(HoardError::NotFileOrDir(path.to_path_buf()))
    }
}

/// Checksum a directory tree, returning its manifest too
pub fn checksum_dir(path: &Path) -> HoardResult<(ChecksumInfo, DirManifest)> {
    collect_dir(path, file_checksum)
}

/// Walk `root` and build its manifest, hashing files with `hash`
pub(crate) fn collect_dir<F>(root: &Path, mut hash: F) -> HoardResult<(ChecksumInfo, DirManifest)>
where
    F: FnMut(&Path) -> HoardResult<String>,
{
    let mut entries = Vec::new();
    for (relpath, path) in walk_files(root)? {
        entries.push(DirEntry {
            relpath,
            checksum: hash(&path)?,
        });
    }

    let manifest = DirManifest::new(entries);
    let info = manifest.checksum()?;
    Ok((info, manifest))
}

/// Every regular file under `root` as `(relpath, absolute path)`, sorted
pub fn walk_files(root: &Path) -> HoardResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| HoardError::Internal(format!("walk escaped its root: {}", e)))?;
        files.push((relpath_string(rel), entry.path().to_path_buf()));
    }

    Ok(files)
}

/// `/`-separated form of a relative path, identical on every platform
pub fn relpath_string(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn walk_error(root: &Path, err: walkdir::Error) -> HoardError {
    let path = err.path().unwrap_or(root).to_path_buf();
    if err.loop_ancestor().is_some() {
        return HoardError::SymlinkLoop(path);
    }
    match err.into_io_error() {
        Some(io) => HoardError::io_at(&path, "walking", io),
        None => HoardError::Internal(format!("walking {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TEXT_SHA256: &str = "982d9e3eb996f559e633f4d194def3761d909f5a3b647d1a851fead67c32c9d1";

    fn tree(dir: &TempDir) -> PathBuf {
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("b.txt"), "bravo").unwrap();
        fs::write(root.join("a.txt"), "alpha").unwrap();
        fs::write(root.join("sub/deeper/c.bin"), [0u8, 1, 2, 3]).unwrap();
        root
    }

    #[test]
    fn file_checksum_known_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo");
        fs::write(&path, "text").unwrap();

        assert_eq!(file_checksum(&path).unwrap(), TEXT_SHA256);
        assert_eq!(bytes_checksum(b"text"), TEXT_SHA256);
    }

    #[test]
    fn file_checksum_spans_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big");
        let content = vec![7u8; CHUNK_SIZE * 3 + 17];
        fs::write(&path, &content).unwrap();

        assert_eq!(file_checksum(&path).unwrap(), bytes_checksum(&content));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = file_checksum(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, HoardError::PathNotFound(_)));
    }

    #[test]
    fn directory_checksum_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let root = tree(&dir);

        let (first, m1) = checksum_dir(&root).unwrap();
        let (second, m2) = checksum_dir(&root).unwrap();

        assert_eq!(first, second);
        assert_eq!(m1.to_bytes().unwrap(), m2.to_bytes().unwrap());
        assert!(first.is_dir());
    }

    #[test]
    fn manifest_is_sorted_and_files_only() {
        let dir = TempDir::new().unwrap();
        let root = tree(&dir);

        let (_, manifest) = checksum_dir(&root).unwrap();
        let paths: Vec<_> = manifest.entries().iter().map(|e| e.relpath.as_str()).collect();

        assert_eq!(paths, vec!["a.txt", "b.txt", "sub/deeper/c.bin"]);
    }

    #[test]
    fn manifest_serialization_has_sorted_keys() {
        let manifest = DirManifest::new(vec![DirEntry {
            relpath: "x".to_string(),
            checksum: "ab".to_string(),
        }]);
        let text = String::from_utf8(manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(text, r#"[{"relpath":"x","sha256":"ab"}]"#);
    }

    #[test]
    fn directory_checksum_ignores_mtime() {
        let dir = TempDir::new().unwrap();
        let root = tree(&dir);
        let (before, _) = checksum_dir(&root).unwrap();

        let content = fs::read(root.join("a.txt")).unwrap();
        fs::remove_file(root.join("a.txt")).unwrap();
        fs::write(root.join("a.txt"), content).unwrap();

        let (after, _) = checksum_dir(&root).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn directory_checksum_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let root = tree(&dir);
        let (before, _) = checksum_dir(&root).unwrap();

        fs::write(root.join("sub/new"), "new").unwrap();

        let (after, _) = checksum_dir(&root).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn checksum_dispatches_on_kind() {
        let dir = TempDir::new().unwrap();
        let root = tree(&dir);

        assert!(checksum(&root).unwrap().is_dir());
        assert!(!checksum(&root.join("a.txt")).unwrap().is_dir());
        assert!(matches!(
            checksum(&root.join("missing")),
            Err(HoardError::PathNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_reported() {
        let dir = TempDir::new().unwrap();
        let root = tree(&dir);
        std::os::unix::fs::symlink(&root, root.join("sub/loop")).unwrap();

        let err = checksum_dir(&root).unwrap_err();
        assert!(matches!(err, HoardError::SymlinkLoop(_)));
    }

    #[test]
    fn checksum_info_json_shape() {
        let info = ChecksumInfo::new("abc");
        assert_eq!(serde_json::to_string(&info).unwrap(), r#"{"sha256":"abc"}"#);
        assert!(ChecksumInfo::new("abc.dir").is_dir());
    }

    #[test]
    fn valid_checksums() {
        assert!(is_valid_checksum(TEXT_SHA256));
        assert!(is_valid_checksum(&format!("{}.dir", TEXT_SHA256)));
        assert!(!is_valid_checksum("ab"));
        assert!(!is_valid_checksum("zz-not-hex"));
        assert!(!is_valid_checksum("abc.tmp"));
        assert!(!is_valid_checksum("a\u{e9}"));
    }

    #[test]
    fn manifest_rejects_escaping_paths() {
        for relpath in ["../../escaped", "a/../../b", "/etc/passwd", "./a", "a//b", ""] {
            let bytes = format!(r#"[{{"relpath":"{}","sha256":"{}"}}]"#, relpath, TEXT_SHA256);
            let err = DirManifest::from_bytes(bytes.as_bytes()).unwrap_err();
            assert!(
                matches!(err, HoardError::UnsafeRelpath(_)),
                "{:?} accepted",
                relpath
            );
        }
    }

    #[test]
    fn manifest_rejects_malformed_checksum() {
        let bytes = r#"[{"relpath":"a","sha256":"a\u00e9"}]"#;
        let err = DirManifest::from_bytes(bytes.as_bytes()).unwrap_err();
        assert!(matches!(err, HoardError::InvalidChecksum(_)));
    }

    #[test]
    fn manifest_accepts_nested_paths() {
        let bytes = format!(r#"[{{"relpath":"sub/dir/a.txt","sha256":"{}"}}]"#, TEXT_SHA256);
        let manifest = DirManifest::from_bytes(bytes.as_bytes()).unwrap();
        assert_eq!(manifest.entries()[0].relpath, "sub/dir/a.txt");
    }
}
