//! Pointer files tracking workspace paths
//!
//! Saving `data/` writes `data.hoard` next to it, a small JSON record of the
//! path and its checksum. Pointer files are what gets committed to source
//! control; the binary resolves them into the targets of push, pull, status
//! and gc.

use crate::checksum::state::write_json_atomic;
use crate::checksum::{is_valid_checksum, ChecksumInfo};
use crate::config::PROJECT_DIR;
use crate::error::{HoardError, HoardResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extension of pointer files
pub const POINTER_EXTENSION: &str = "hoard";

#[derive(Debug, Serialize, Deserialize)]
struct PointerFile {
    /// File name of the tracked path, relative to the pointer's directory
    path: String,
    #[serde(flatten)]
    info: ChecksumInfo,
}

/// A tracked workspace path and the checksum it was saved as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub info: ChecksumInfo,
}

impl Target {
    pub fn new(path: impl Into<PathBuf>, info: ChecksumInfo) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }

    /// Pointer file for a tracked path: `<path>.hoard`
    pub fn pointer_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(POINTER_EXTENSION);
        PathBuf::from(name)
    }

    /// Whether `path` looks like a pointer file
    pub fn is_pointer(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == POINTER_EXTENSION)
    }

    /// Write this target's pointer file
    pub fn save(&self) -> HoardResult<PathBuf> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| HoardError::User(format!("cannot track '{}'", self.path.display())))?
            .to_string_lossy()
            .into_owned();

        let pointer = Self::pointer_path(&self.path);
        write_json_atomic(
            &pointer,
            &PointerFile {
                path: name,
                info: self.info.clone(),
            },
        )?;
        debug!("Wrote pointer {}", pointer.display());
        Ok(pointer)
    }

    /// Load a target from its data path or its pointer file
    pub fn load(path: &Path) -> HoardResult<Self> {
        let pointer = if Self::is_pointer(path) {
            path.to_path_buf()
        } else {
            Self::pointer_path(path)
        };

        let bytes = fs::read(&pointer).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                HoardError::User(format!("'{}' is not tracked", path.display()))
            }
            _ => HoardError::io_at(&pointer, "reading", e),
        })?;
        let record: PointerFile =
            serde_json::from_slice(&bytes).map_err(|e| HoardError::ConfigInvalid {
                path: pointer.clone(),
                reason: e.to_string(),
            })?;

        let invalid = |reason: String| HoardError::ConfigInvalid {
            path: pointer.clone(),
            reason,
        };
        if !is_valid_checksum(record.info.as_str()) {
            return Err(invalid(format!("malformed checksum '{}'", record.info)));
        }
        let mut components = Path::new(&record.path).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(invalid(format!("'{}' is not a file name", record.path)));
        }

        let dir = pointer.parent().unwrap_or_else(|| Path::new(""));
        Ok(Self {
            path: dir.join(record.path),
            info: record.info,
        })
    }

    /// Every pointer file under `root`, skipping the project directory
    pub fn discover(root: &Path) -> HoardResult<Vec<Self>> {
        let mut targets = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != PROJECT_DIR);

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                match e.into_io_error() {
                    Some(io) => HoardError::io_at(&path, "walking", io),
                    None => HoardError::SymlinkLoop(path),
                }
            })?;
            if entry.file_type().is_file() && Self::is_pointer(entry.path()) {
                targets.push(Self::load(entry.path())?);
            }
        }

        Ok(targets)
    }

    /// Remove the pointer file
    pub fn forget(&self) -> HoardResult<()> {
        let pointer = Self::pointer_path(&self.path);
        fs::remove_file(&pointer).map_err(|e| HoardError::io_at(&pointer, "removing", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEXT_SHA256: &str = "982d9e3eb996f559e633f4d194def3761d909f5a3b647d1a851fead67c32c9d1";

    #[test]
    fn pointer_path_appends_extension() {
        assert_eq!(
            Target::pointer_path(Path::new("dir/data")),
            PathBuf::from("dir/data.hoard")
        );
        assert_eq!(
            Target::pointer_path(Path::new("model.bin")),
            PathBuf::from("model.bin.hoard")
        );
    }

    #[test]
    fn save_and_load_from_either_path() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("foo");
        let target = Target::new(&data, ChecksumInfo::new(TEXT_SHA256));

        let pointer = target.save().unwrap();

        assert_eq!(Target::load(&data).unwrap(), target);
        assert_eq!(Target::load(&pointer).unwrap(), target);
    }

    #[test]
    fn pointer_content_is_json_record() {
        let dir = TempDir::new().unwrap();
        let pointer = Target::new(dir.path().join("foo"), ChecksumInfo::new(TEXT_SHA256))
            .save()
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(pointer).unwrap()).unwrap();
        assert_eq!(value["path"], "foo");
        assert_eq!(value["sha256"], TEXT_SHA256);
    }

    #[test]
    fn load_untracked_is_user_error() {
        let dir = TempDir::new().unwrap();
        let err = Target::load(&dir.path().join("nothing")).unwrap_err();
        assert!(matches!(err, HoardError::User(_)));
    }

    #[test]
    fn load_rejects_malformed_pointer() {
        let dir = TempDir::new().unwrap();
        let pointer = dir.path().join("foo.hoard");

        fs::write(&pointer, r#"{"path":"foo","sha256":"a\u00e9"}"#).unwrap();
        let err = Target::load(&pointer).unwrap_err();
        assert!(matches!(err, HoardError::ConfigInvalid { .. }));

        let escaping = format!(r#"{{"path":"../foo","sha256":"{}"}}"#, TEXT_SHA256);
        fs::write(&pointer, escaping).unwrap();
        let err = Target::load(&pointer).unwrap_err();
        assert!(matches!(err, HoardError::ConfigInvalid { .. }));
    }

    #[test]
    fn discover_skips_project_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join(PROJECT_DIR).join("stray.hoard"), "{}").unwrap();

        Target::new(dir.path().join("a"), ChecksumInfo::new("aa11"))
            .save()
            .unwrap();
        Target::new(dir.path().join("nested/b"), ChecksumInfo::new("bb22.dir"))
            .save()
            .unwrap();

        let found = Target::discover(dir.path()).unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|t| t.info.is_dir()));
    }
}
