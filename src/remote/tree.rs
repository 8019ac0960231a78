//! Transfer tree abstraction
//!
//! Provides a trait for remote storage operations that can be implemented
//! by different backends (local filesystem, object stores, SFTP, WebHDFS).

use crate::error::HoardResult;
use crate::location::{Location, Scheme};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::path::Path;

/// Lazily produced sequence of file locations
pub type FileStream = BoxStream<'static, HoardResult<Location>>;

/// Abstract remote storage interface
///
/// Every location passed to a tree must share its scheme and bucket/host;
/// mixing backends is a caller error.
#[async_trait]
pub trait TransferTree: Send + Sync {
    /// Backend scheme
    fn scheme(&self) -> Scheme;

    /// Location all checksums are stored under
    fn root(&self) -> &Location;

    /// Verify the backend is reachable and configured
    async fn sanity_check(&self) -> HoardResult<()>;

    /// Whether a file or directory exists at `location`
    async fn exists(&self, location: &Location) -> HoardResult<bool>;

    /// Whether `location` is a directory (or a non-empty key prefix)
    async fn isdir(&self, location: &Location) -> HoardResult<bool>;

    /// Whether `location` is a regular file or object
    async fn isfile(&self, location: &Location) -> HoardResult<bool>;

    /// Every file beneath `location`, excluding directory markers
    ///
    /// A fresh call re-lists from the start.
    async fn walk_files(&self, location: &Location) -> HoardResult<FileStream>;

    /// Stream a local file to `to`
    async fn upload(&self, from: &Path, to: &Location) -> HoardResult<()>;

    /// Stream `from` to a local file, appearing only once complete
    async fn download(&self, from: &Location, to: &Path) -> HoardResult<()>;

    /// Create a directory; a no-op at the root of a bucket or host
    async fn makedirs(&self, location: &Location) -> HoardResult<()>;

    /// Copy within this backend
    async fn copy(&self, from: &Location, to: &Location) -> HoardResult<()>;

    /// Remove a file or directory tree; absence is not an error
    async fn remove(&self, location: &Location) -> HoardResult<()>;

    /// Location of the object addressed by `checksum`
    fn checksum_location(&self, checksum: &str) -> Location {
        let split = checksum
            .char_indices()
            .nth(2)
            .map_or(checksum.len(), |(i, _)| i);
        self.root()
            .join(&checksum[..split])
            .join(&checksum[split..])
    }
}
