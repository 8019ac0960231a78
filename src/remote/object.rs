//! Object-store transfer tree built on an OpenDAL operator
//!
//! Serves every non-local scheme (S3, GCS, Azure Blob, WebHDFS, SFTP and the
//! in-memory store). Directories are key prefixes: a location is a
//! directory when anything is listed under `<key>/`, with or without a
//! marker object.

use crate::cache::{tmp_path, TMP_SUFFIX};
use crate::checksum::CHUNK_SIZE;
use crate::error::{HoardError, HoardResult};
use crate::location::{Location, Scheme};
use crate::remote::tree::{FileStream, TransferTree};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use opendal::{ErrorKind as StorageErrorKind, Operator};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Transfer tree over an OpenDAL operator rooted at a bucket or host
#[derive(Debug, Clone)]
pub struct ObjectTree {
    root: Location,
    /// `root` with its key stripped; listed paths are joined onto it
    base: Location,
    op: Operator,
    /// Upload under a temporary key and rename into place
    staged: bool,
}

impl ObjectTree {
    pub fn new(root: Location, op: Operator) -> HoardResult<Self> {
        if root.as_remote().is_none() {
            return Err(HoardError::Internal(format!(
                "object tree given local location {}",
                root
            )));
        }

        let mut base = root.clone();
        while let Some(parent) = base.parent() {
            base = parent;
        }

        // SFTP and WebHDFS expose a file at its final path while it is
        // still being written; object stores only publish on close.
        let staged = matches!(root.scheme(), Scheme::Ssh | Scheme::Hdfs)
            && op.info().full_capability().rename;

        Ok(Self {
            root,
            base,
            op,
            staged,
        })
    }

    /// Force uploads through a temporary key, or straight to the final one
    pub fn with_staged_writes(mut self, staged: bool) -> Self {
        self.staged = staged;
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Object key for `location`, checking it belongs to this tree's bucket
    fn key(&self, location: &Location) -> HoardResult<String> {
        if location.scheme() != self.root.scheme() || location.bucket() != self.root.bucket() {
            return Err(HoardError::Internal(format!(
                "{} does not belong to {}",
                location, self.root
            )));
        }
        Ok(location.key())
    }

    fn error(&self, context: &str, location: &Location, err: opendal::Error) -> HoardError {
        if err.kind() == StorageErrorKind::NotFound {
            return HoardError::RemoteMissing(location.to_string());
        }
        HoardError::storage(format!("{} {}", context, location), err)
    }

    async fn is_object(&self, key: &str) -> HoardResult<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        match self.op.stat(key).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(HoardError::storage(format!("inspecting {}", key), e)),
        }
    }

    async fn has_children(&self, key: &str) -> HoardResult<bool> {
        if key.is_empty() {
            return Ok(true);
        }
        let prefix = format!("{}/", key);
        let mut lister = match self.op.lister(&prefix).await {
            Ok(lister) => lister,
            Err(e) if is_absent(&e) => return Ok(false),
            Err(e) => return Err(HoardError::storage(format!("listing {}", prefix), e)),
        };
        match lister.try_next().await {
            Ok(entry) => Ok(entry.is_some()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(HoardError::storage(format!("listing {}", prefix), e)),
        }
    }

    /// Write `from` to `key` so a reader never sees a partial object there
    async fn write_file(&self, from: &Path, key: &str) -> HoardResult<()> {
        if !self.staged {
            return self.write_key(from, key).await;
        }

        let staging = format!("{}.{}{}", key, uuid::Uuid::new_v4(), TMP_SUFFIX);
        let result = match self.write_key(from, &staging).await {
            Ok(()) => self
                .op
                .rename(&staging, key)
                .await
                .map_err(|e| HoardError::storage(format!("moving {} into place", key), e)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = self.op.delete(&staging).await;
        }
        result
    }

    async fn write_key(&self, from: &Path, key: &str) -> HoardResult<()> {
        if !self.op.info().full_capability().write_can_multi {
            let bytes = fs::read(from)
                .await
                .map_err(|e| HoardError::io_at(from, "reading", e))?;
            self.op
                .write(key, bytes)
                .await
                .map_err(|e| HoardError::storage(format!("writing {}", key), e))?;
            return Ok(());
        }

        let mut file = fs::File::open(from)
            .await
            .map_err(|e| HoardError::io_at(from, "opening", e))?;
        let mut writer = self
            .op
            .writer(key)
            .await
            .map_err(|e| HoardError::storage(format!("writing {}", key), e))?;
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(HoardError::io_at(from, "reading", e));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(HoardError::storage(format!("writing {}", key), e));
            }
        }

        writer
            .close()
            .await
            .map_err(|e| HoardError::storage(format!("writing {}", key), e))?;
        Ok(())
    }

    async fn read_to(&self, key: &str, len: u64, to: &Path) -> HoardResult<()> {
        let reader = self
            .op
            .reader(key)
            .await
            .map_err(|e| HoardError::storage(format!("reading {}", key), e))?;
        let mut file = fs::File::create(to)
            .await
            .map_err(|e| HoardError::io_at(to, "creating", e))?;

        let mut offset = 0u64;
        while offset < len {
            let end = (offset + CHUNK_SIZE as u64).min(len);
            let chunk = reader
                .read(offset..end)
                .await
                .map_err(|e| HoardError::storage(format!("reading {}", key), e))?;
            if chunk.is_empty() {
                return Err(HoardError::Internal(format!(
                    "{} ended at {} of {} bytes",
                    key, offset, len
                )));
            }
            offset += chunk.len() as u64;
            file.write_all(&chunk.to_vec())
                .await
                .map_err(|e| HoardError::io_at(to, "writing", e))?;
        }

        file.flush()
            .await
            .map_err(|e| HoardError::io_at(to, "writing", e))
    }

    /// Copy through this process when the service has no server-side copy
    async fn buffered_copy(&self, from: &str, to: &str) -> HoardResult<()> {
        let bytes = self
            .op
            .read(from)
            .await
            .map_err(|e| HoardError::storage(format!("reading {}", from), e))?;
        self.op
            .write(to, bytes)
            .await
            .map_err(|e| HoardError::storage(format!("writing {}", to), e))?;
        Ok(())
    }
}

fn is_absent(err: &opendal::Error) -> bool {
    matches!(
        err.kind(),
        StorageErrorKind::NotFound | StorageErrorKind::NotADirectory
    )
}

#[async_trait]
impl TransferTree for ObjectTree {
    fn scheme(&self) -> Scheme {
        self.root.scheme()
    }

    fn root(&self) -> &Location {
        &self.root
    }

    async fn sanity_check(&self) -> HoardResult<()> {
        self.op
            .check()
            .await
            .map_err(|e| HoardError::RemoteUnreachable {
                location: self.root.to_string(),
                reason: e.to_string(),
            })
    }

    async fn exists(&self, location: &Location) -> HoardResult<bool> {
        let key = self.key(location)?;
        Ok(self.is_object(&key).await? || self.has_children(&key).await?)
    }

    async fn isdir(&self, location: &Location) -> HoardResult<bool> {
        let key = self.key(location)?;
        self.has_children(&key).await
    }

    async fn isfile(&self, location: &Location) -> HoardResult<bool> {
        let key = self.key(location)?;
        self.is_object(&key).await
    }

    async fn walk_files(&self, location: &Location) -> HoardResult<FileStream> {
        let key = self.key(location)?;
        let prefix = if key.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", key)
        };

        let lister = match self.op.lister_with(&prefix).recursive(true).await {
            Ok(lister) => lister,
            Err(e) if is_absent(&e) => return Ok(futures_util::stream::empty().boxed()),
            Err(e) => return Err(HoardError::storage(format!("listing {}", location), e)),
        };

        let base = self.base.clone();
        let context = format!("listing {}", location);
        let files = lister
            .try_filter_map(move |entry| {
                let path = entry.path();
                let file = (entry.metadata().is_file()
                    && !path.ends_with('/')
                    && !path.ends_with(TMP_SUFFIX))
                .then(|| base.join(path));
                futures_util::future::ready(Ok(file))
            })
            .map_err(move |e| HoardError::storage(context.clone(), e));

        Ok(files.boxed())
    }

    async fn upload(&self, from: &Path, to: &Location) -> HoardResult<()> {
        let key = self.key(to)?;
        debug!("Uploading '{}' to '{}'", from.display(), to);
        self.write_file(from, &key).await
    }

    async fn download(&self, from: &Location, to: &Path) -> HoardResult<()> {
        let key = self.key(from)?;
        debug!("Downloading '{}' to '{}'", from, to.display());

        let meta = self
            .op
            .stat(&key)
            .await
            .map_err(|e| self.error("inspecting", from, e))?;

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HoardError::io_at(parent, "creating", e))?;
        }

        let tmp = tmp_path(to);
        if let Err(e) = self.read_to(&key, meta.content_length(), &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        fs::rename(&tmp, to)
            .await
            .map_err(|e| HoardError::io_at(to, "moving into place", e))
    }

    async fn makedirs(&self, location: &Location) -> HoardResult<()> {
        let key = self.key(location)?;
        if key.is_empty() {
            // Never try to create the bucket itself.
            return Ok(());
        }
        match self.op.create_dir(&format!("{}/", key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == StorageErrorKind::Unsupported => {
                debug!("{} has no directory markers", self.root.scheme());
                Ok(())
            }
            Err(e) => Err(HoardError::storage(format!("creating {}", location), e)),
        }
    }

    async fn copy(&self, from: &Location, to: &Location) -> HoardResult<()> {
        let src = self.key(from)?;
        let dst = self.key(to)?;

        if !self.op.info().full_capability().copy {
            return self.buffered_copy(&src, &dst).await;
        }

        let source = self
            .op
            .stat(&src)
            .await
            .map_err(|e| self.error("inspecting", from, e))?;
        self.op
            .copy(&src, &dst)
            .await
            .map_err(|e| self.error("copying", from, e))?;
        let copied = self
            .op
            .stat(&dst)
            .await
            .map_err(|e| self.error("inspecting", to, e))?;

        if let (Some(expected), Some(actual)) = (source.etag(), copied.etag()) {
            if expected != actual {
                let _ = self.op.delete(&dst).await;
                return Err(HoardError::EtagMismatch {
                    location: to.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn remove(&self, location: &Location) -> HoardResult<()> {
        let key = self.key(location)?;
        if self.is_object(&key).await? {
            self.op
                .delete(&key)
                .await
                .map_err(|e| HoardError::storage(format!("removing {}", location), e))?;
        }
        if !key.is_empty() && self.has_children(&key).await? {
            self.op
                .remove_all(&format!("{}/", key))
                .await
                .map_err(|e| HoardError::storage(format!("removing {}", location), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::services::{Fs, Memory};
    use tempfile::TempDir;

    fn memory_tree(url: &str) -> ObjectTree {
        let op = Operator::new(Memory::default()).unwrap().finish();
        ObjectTree::new(Location::parse(url).unwrap(), op).unwrap()
    }

    /// Tree over a local directory, writing through temporary keys
    fn staged_tree(dir: &Path) -> ObjectTree {
        let op = Operator::new(Fs::default().root(dir.to_str().unwrap()))
            .unwrap()
            .finish();
        ObjectTree::new(Location::parse("memory://bucket").unwrap(), op)
            .unwrap()
            .with_staged_writes(true)
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn populated() -> ObjectTree {
        let tree = memory_tree("memory://bucket");
        for key in ["data/alice", "data/alpha", "data/subdir/bob", "foo"] {
            tree.op.write(key, key.as_bytes().to_vec()).await.unwrap();
        }
        tree.makedirs(&tree.root().join("empty_dir")).await.unwrap();
        tree
    }

    #[tokio::test]
    async fn isdir_treats_prefixes_as_directories() {
        let tree = populated().await;
        let root = tree.root().clone();

        assert!(tree.isdir(&root).await.unwrap());
        assert!(tree.isdir(&root.join("data")).await.unwrap());
        assert!(tree.isdir(&root.join("data/")).await.unwrap());
        assert!(tree.isdir(&root.join("data/subdir")).await.unwrap());
        assert!(tree.isdir(&root.join("empty_dir")).await.unwrap());
        assert!(!tree.isdir(&root.join("data/al")).await.unwrap());
        assert!(!tree.isdir(&root.join("data/alice")).await.unwrap());
        assert!(!tree.isdir(&root.join("foo")).await.unwrap());
        assert!(!tree.isdir(&root.join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn exists_matches_files_and_prefixes() {
        let tree = populated().await;
        let root = tree.root().clone();

        assert!(tree.exists(&root.join("data")).await.unwrap());
        assert!(tree.exists(&root.join("data/alice")).await.unwrap());
        assert!(tree.exists(&root.join("foo")).await.unwrap());
        assert!(!tree.exists(&root.join("data/al")).await.unwrap());
        assert!(!tree.exists(&root.join("fo")).await.unwrap());
    }

    #[tokio::test]
    async fn isfile_only_for_objects() {
        let tree = populated().await;
        let root = tree.root().clone();

        assert!(tree.isfile(&root.join("data/alice")).await.unwrap());
        assert!(!tree.isfile(&root.join("data")).await.unwrap());
        assert!(!tree.isfile(&root.join("empty_dir")).await.unwrap());
    }

    #[tokio::test]
    async fn walk_files_skips_markers() {
        let tree = populated().await;
        let root = tree.root().clone();

        let mut found: Vec<String> = tree
            .walk_files(&root)
            .await
            .unwrap()
            .map_ok(|loc| loc.key())
            .try_collect()
            .await
            .unwrap();
        found.sort();

        assert_eq!(
            found,
            vec!["data/alice", "data/alpha", "data/subdir/bob", "foo"]
        );
    }

    #[tokio::test]
    async fn walk_files_of_missing_prefix_is_empty() {
        let tree = populated().await;
        let found: Vec<Location> = tree
            .walk_files(&tree.root().join("nothing"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn upload_download_roundtrip() {
        let dir = TempDir::new().unwrap();
        let tree = memory_tree("memory://bucket/prefix");
        let src = dir.path().join("src");
        let body: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &body).unwrap();

        let remote = tree.checksum_location("abcdef");
        assert_eq!(remote.key(), "prefix/ab/cdef");

        tree.upload(&src, &remote).await.unwrap();
        let dest = dir.path().join("out/dest");
        tree.download(&remote, &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[test]
    fn only_streaming_backends_stage_by_default() {
        assert!(!memory_tree("memory://bucket").staged);
    }

    #[tokio::test]
    async fn staged_upload_leaves_only_final_object() {
        let store = TempDir::new().unwrap();
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("src");
        std::fs::write(&src, "payload").unwrap();
        let tree = staged_tree(store.path());

        tree.upload(&src, &tree.checksum_location("abcdef"))
            .await
            .unwrap();

        assert_eq!(names(&store.path().join("ab")), vec!["cdef"]);
        assert_eq!(
            std::fs::read(store.path().join("ab/cdef")).unwrap(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn failed_staged_upload_cleans_up() {
        let store = TempDir::new().unwrap();
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("src");
        std::fs::write(&src, "payload").unwrap();
        // A directory in the way makes the final rename fail.
        std::fs::create_dir_all(store.path().join("ab/cdef/inner")).unwrap();
        let tree = staged_tree(store.path());

        let result = tree.upload(&src, &tree.checksum_location("abcdef")).await;

        assert!(result.is_err());
        assert_eq!(names(&store.path().join("ab")), vec!["cdef"]);
        assert!(store.path().join("ab/cdef").is_dir());
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let tree = memory_tree("memory://bucket");
        let dest = dir.path().join("dest");

        let err = tree
            .download(&tree.root().join("ab/cdef"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, HoardError::RemoteMissing(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn copy_within_tree() {
        let tree = populated().await;
        let root = tree.root().clone();

        tree.copy(&root.join("foo"), &root.join("copied/foo"))
            .await
            .unwrap();

        let bytes = tree.op.read("copied/foo").await.unwrap().to_vec();
        assert_eq!(bytes, b"foo");
    }

    #[tokio::test]
    async fn remove_file_and_prefix() {
        let tree = populated().await;
        let root = tree.root().clone();

        tree.remove(&root.join("foo")).await.unwrap();
        tree.remove(&root.join("data")).await.unwrap();
        tree.remove(&root.join("never")).await.unwrap();

        assert!(!tree.exists(&root.join("foo")).await.unwrap());
        assert!(!tree.exists(&root.join("data")).await.unwrap());
        assert!(tree.exists(&root.join("empty_dir")).await.unwrap());
    }

    #[tokio::test]
    async fn makedirs_at_root_is_noop() {
        let tree = memory_tree("memory://bucket");
        tree.makedirs(&tree.root().clone()).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_location_is_rejected() {
        let tree = memory_tree("memory://bucket");
        let other = Location::parse("memory://elsewhere/key").unwrap();
        assert!(tree.isfile(&other).await.is_err());
    }

    #[tokio::test]
    async fn sanity_check_on_memory() {
        memory_tree("memory://bucket").sanity_check().await.unwrap();
    }
}
