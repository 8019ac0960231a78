//! Local content-addressed cache
//!
//! Entries live at `<cache>/<first two hex chars>/<remaining hex chars>`;
//! directory manifests use the same addressing with `.dir` appended.
//!
//! # Entry lifecycle
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | absent | present | `save`, or a verified download |
//! | present | absent | `gc`, explicit removal |
//! | present | corrupted → absent | failed re-hash in `changed` |
//!
//! Writes land under a temporary name and are renamed into place, so a
//! reader never sees a partial entry. Interrupted writes leave
//! `<entry>.<uuid>.tmp` orphans that `all()` ignores and `gc()` removes.

pub mod link;
pub mod link_state;
pub mod local;

pub use link::LinkType;
pub use link_state::{LinkRecord, LinkState};
pub use local::{CacheSettings, Checkout, GcReport, LocalCache};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix of temporary files inside the cache and download targets
pub const TMP_SUFFIX: &str = ".tmp";

/// Unique temporary sibling of `dest`
pub(crate) fn tmp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{}.{}{}", name, uuid::Uuid::new_v4(), TMP_SUFFIX))
}

/// Rename, falling back to copy + delete across filesystems
pub(crate) fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if fs::symlink_metadata(src).is_err() {
                return Err(rename_err);
            }
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
    }
}

/// Remove a file, symlink, or directory tree; absence is not an error
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && !meta.is_dir() => {
            // Read-only files cannot be unlinked on Windows.
            set_readonly(path, false)?;
            fs::remove_file(path)
        }
        other => other,
    }
}

/// Toggle the read-only bit of a regular file
pub(crate) fn set_readonly(path: &Path, readonly: bool) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() == readonly {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        perms.set_mode(if readonly { mode & !0o222 } else { mode | 0o200 });
    }
    #[cfg(not(unix))]
    perms.set_readonly(readonly);
    fs::set_permissions(path, perms)
}
