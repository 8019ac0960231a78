//! Local filesystem transfer tree
//!
//! Used for remotes that are plain directories (a mounted share, another
//! disk). Directories are real, so no prefix emulation is needed.

use crate::cache::{tmp_path, TMP_SUFFIX};
use crate::checksum;
use crate::error::{HoardError, HoardResult};
use crate::location::{Location, Scheme};
use crate::remote::tree::{FileStream, TransferTree};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tracing::debug;
use walkdir::WalkDir;

/// Walk entries buffered ahead of the consumer
const WALK_BUFFER: usize = 256;

/// Transfer tree rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: Location,
}

impl LocalTree {
    pub fn new(root: Location) -> HoardResult<Self> {
        if root.as_local().is_none() {
            return Err(HoardError::Internal(format!(
                "local tree given remote location {}",
                root
            )));
        }
        Ok(Self { root })
    }

    fn path<'a>(&self, location: &'a Location) -> HoardResult<&'a Path> {
        location.as_local().ok_or_else(|| {
            HoardError::Internal(format!("{} is not a local location", location))
        })
    }
}

async fn ensure_parent(path: &Path) -> HoardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| HoardError::io_at(parent, "creating", e))?;
    }
    Ok(())
}

/// Copy `from` to a temp sibling of `to`, then rename into place
async fn copy_via_tmp(from: &Path, to: &Path) -> HoardResult<()> {
    ensure_parent(to).await?;
    let tmp = tmp_path(to);

    if let Err(e) = fs::copy(from, &tmp).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(HoardError::io_at(from, "copying", e));
    }
    fs::rename(&tmp, to)
        .await
        .map_err(|e| HoardError::io_at(to, "moving into place", e))
}

#[async_trait]
impl TransferTree for LocalTree {
    fn scheme(&self) -> Scheme {
        Scheme::Local
    }

    fn root(&self) -> &Location {
        &self.root
    }

    async fn sanity_check(&self) -> HoardResult<()> {
        let root = self.path(&self.root)?;
        match fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(HoardError::RemoteUnreachable {
                location: self.root.to_string(),
                reason: "not a directory".to_string(),
            }),
            // A missing root is created on first upload.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HoardError::RemoteUnreachable {
                location: self.root.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn exists(&self, location: &Location) -> HoardResult<bool> {
        Ok(fs::symlink_metadata(self.path(location)?).await.is_ok())
    }

    async fn isdir(&self, location: &Location) -> HoardResult<bool> {
        Ok(fs::metadata(self.path(location)?)
            .await
            .is_ok_and(|m| m.is_dir()))
    }

    async fn isfile(&self, location: &Location) -> HoardResult<bool> {
        Ok(fs::metadata(self.path(location)?)
            .await
            .is_ok_and(|m| m.is_file()))
    }

    async fn walk_files(&self, location: &Location) -> HoardResult<FileStream> {
        let root: PathBuf = self.path(location)?.to_path_buf();
        if fs::metadata(&root).await.is_err() {
            return Ok(stream::empty().boxed());
        }

        // Entries are produced by a blocking walker and consumed as they arrive.
        let (tx, rx) = mpsc::channel(WALK_BUFFER);
        tokio::task::spawn_blocking(move || {
            let walker = WalkDir::new(&root).follow_links(true).sort_by_file_name();
            for entry in walker {
                let item = match entry {
                    Ok(entry) if !entry.file_type().is_file() => continue,
                    Ok(entry) if entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX) => {
                        continue
                    }
                    Ok(entry) => Ok(Location::local(entry.path())),
                    Err(e) => Err(checksum::walk_error(&root, e)),
                };
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        let files = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(files.boxed())
    }

    async fn upload(&self, from: &Path, to: &Location) -> HoardResult<()> {
        let to = self.path(to)?;
        debug!("Uploading '{}' to '{}'", from.display(), to.display());
        copy_via_tmp(from, to).await
    }

    async fn download(&self, from: &Location, to: &Path) -> HoardResult<()> {
        let from = self.path(from)?;
        debug!("Downloading '{}' to '{}'", from.display(), to.display());
        copy_via_tmp(from, to).await
    }

    async fn makedirs(&self, location: &Location) -> HoardResult<()> {
        let path = self.path(location)?;
        fs::create_dir_all(path)
            .await
            .map_err(|e| HoardError::io_at(path, "creating", e))
    }

    async fn copy(&self, from: &Location, to: &Location) -> HoardResult<()> {
        copy_via_tmp(self.path(from)?, self.path(to)?).await
    }

    async fn remove(&self, location: &Location) -> HoardResult<()> {
        let path = self.path(location)?.to_path_buf();
        tokio::task::spawn_blocking(move || {
            crate::cache::remove_path(&path).map_err(|e| HoardError::io_at(&path, "removing", e))
        })
        .await
        .map_err(|e| HoardError::Internal(format!("remove task failed: {}", e)))?
    }
}
