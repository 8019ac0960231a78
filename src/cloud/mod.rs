//! Synchronization between the local cache and a remote
//!
//! [`DataCloud`] resolves which remote to talk to, expands targets into the
//! full set of checksums they reference, and fans the per-checksum work out
//! over a bounded pool. Each checksum is handled end to end by one worker
//! (existence check, transfer, verify), so one bad object never stops the
//! rest of the batch.

pub mod progress;

use crate::cache::LocalCache;
use crate::checksum::{self, ChecksumInfo};
use crate::config::{legacy, Config};
use crate::error::{HoardError, HoardResult};
use crate::remote::{self, TransferTree};
use futures_util::stream::{self, StreamExt};
use progress::TransferProgress;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where a checksum exists, as reported by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    /// Present locally and remotely
    Ok,
    /// Present locally only
    New,
    /// Present remotely only
    Deleted,
    /// Present nowhere
    Missing,
}

impl ObjectStatus {
    fn from_presence(local: bool, remote: bool) -> Self {
        match (local, remote) {
            (true, true) => Self::Ok,
            (true, false) => Self::New,
            (false, true) => Self::Deleted,
            (false, false) => Self::Missing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::New => "new",
            Self::Deleted => "deleted",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-checksum outcome of a push or pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Transferred,
    Skipped,
}

/// Aggregate result of a push or pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Checksums copied in this run
    pub transferred: BTreeSet<String>,
    /// Checksums already present at the destination
    pub skipped: BTreeSet<String>,
    /// Checksums that failed; each was logged as a warning
    pub failed: BTreeSet<String>,
}

impl TransferSummary {
    pub fn total(&self) -> usize {
        self.transferred.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// A connected remote and its default worker count
#[derive(Clone)]
struct Remote {
    name: String,
    tree: Arc<dyn TransferTree>,
    jobs: usize,
}

/// Coordinator between a local cache and its configured remotes
pub struct DataCloud {
    cache: Arc<LocalCache>,
    config: Config,
    trees: Mutex<HashMap<String, Remote>>,
    show_progress: bool,
}

impl DataCloud {
    /// Create a coordinator; obsolete config formats are normalized first
    pub fn new(cache: Arc<LocalCache>, mut config: Config) -> HoardResult<Self> {
        legacy::normalize(&mut config)?;
        Ok(Self {
            cache,
            config,
            trees: Mutex::new(HashMap::new()),
            show_progress: false,
        })
    }

    /// Show a progress bar during batch operations
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connected tree for `remote`, or the default remote
    ///
    /// Trees are created on first use and kept for the coordinator's
    /// lifetime. `Ok(None)` means no remote is configured at all.
    async fn remote(&self, remote: Option<&str>) -> HoardResult<Option<Remote>> {
        let Some(name) = remote.or_else(|| self.config.default_remote()) else {
            debug!("No remote configured");
            return Ok(None);
        };

        let mut trees = self.trees.lock().await;
        if let Some(existing) = trees.get(name) {
            return Ok(Some(existing.clone()));
        }

        let settings = self.config.remote_settings(name)?;
        let tree = remote::connect(&settings).await?;
        let connected = Remote {
            name: settings.name.clone(),
            tree,
            jobs: settings.jobs,
        };
        trees.insert(name.to_string(), connected.clone());
        Ok(Some(connected))
    }

    /// Upload every checksum `targets` reference that the remote lacks
    pub async fn push(
        &self,
        targets: &[ChecksumInfo],
        jobs: Option<usize>,
        remote: Option<&str>,
    ) -> HoardResult<TransferSummary> {
        let Some(remote) = self.remote(remote).await? else {
            return Ok(TransferSummary::default());
        };

        let checksums = self.collect_local(targets).await?;
        info!("Pushing {} objects to '{}'", checksums.len(), remote.name);

        let tree = remote.tree.as_ref();
        let results = self
            .fan_out("push", checksums, jobs.unwrap_or(remote.jobs), |checksum| {
                self.push_one(tree, checksum)
            })
            .await;
        summarize("push", results)
    }

    /// Download every checksum `targets` reference that the cache lacks
    pub async fn pull(
        &self,
        targets: &[ChecksumInfo],
        jobs: Option<usize>,
        remote: Option<&str>,
    ) -> HoardResult<TransferSummary> {
        let Some(remote) = self.remote(remote).await? else {
            return Ok(TransferSummary::default());
        };
        let jobs = jobs.unwrap_or(remote.jobs);

        let checksums = self.collect_cloud(&remote, targets, jobs).await;
        info!("Pulling {} objects from '{}'", checksums.len(), remote.name);

        let tree = remote.tree.as_ref();
        let results = self
            .fan_out("pull", checksums, jobs, |checksum| self.pull_one(tree, checksum))
            .await;
        summarize("pull", results)
    }

    /// Compare local and remote presence of every referenced checksum
    pub async fn status(
        &self,
        targets: &[ChecksumInfo],
        jobs: Option<usize>,
        remote: Option<&str>,
    ) -> HoardResult<BTreeMap<String, ObjectStatus>> {
        let Some(remote) = self.remote(remote).await? else {
            return Ok(BTreeMap::new());
        };
        let jobs = jobs.unwrap_or(remote.jobs);

        let mut checksums = self.collect_local(targets).await?;
        checksums.extend(self.collect_cloud(&remote, targets, jobs).await);

        let tree = remote.tree.as_ref();
        let results = self
            .fan_out("status", checksums, jobs, |checksum| {
                self.status_one(tree, checksum)
            })
            .await;

        let total = results.len();
        let mut statuses = BTreeMap::new();
        for (checksum, result) in results {
            match result {
                Ok(status) => {
                    statuses.insert(checksum, status);
                }
                Err(e) => warn!("Failed to check status of {}: {}", checksum, e),
            }
        }

        if total > 0 && statuses.is_empty() {
            return Err(HoardError::BatchFailed {
                operation: "check status",
                failed: total,
                total,
            });
        }
        Ok(statuses)
    }

    /// Run `work` over `checksums` with at most `jobs` in flight
    async fn fan_out<T, F, Fut>(
        &self,
        label: &str,
        checksums: BTreeSet<String>,
        jobs: usize,
        work: F,
    ) -> Vec<(String, HoardResult<T>)>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = HoardResult<T>>,
    {
        let progress = TransferProgress::new(label, checksums.len(), self.show_progress);

        let results: Vec<_> = stream::iter(checksums)
            .map(|checksum| {
                let fut = work(checksum.clone());
                async move { (checksum, fut.await) }
            })
            .buffer_unordered(jobs.max(1))
            .inspect(|(checksum, _)| progress.inc(checksum))
            .collect()
            .await;

        progress.finish();
        results
    }

    /// Checksums referenced by `targets` according to the local cache
    async fn collect_local(&self, targets: &[ChecksumInfo]) -> HoardResult<BTreeSet<String>> {
        let targets = targets.to_vec();
        self.blocking(move |cache| cache.expand(&targets)).await
    }

    /// Checksums referenced by `targets`, fetching missing manifests first
    async fn collect_cloud(
        &self,
        remote: &Remote,
        targets: &[ChecksumInfo],
        jobs: usize,
    ) -> BTreeSet<String> {
        let tree = remote.tree.as_ref();
        let mut collected: BTreeSet<String> =
            targets.iter().map(|t| t.checksum.clone()).collect();

        let dirs: BTreeSet<String> = targets
            .iter()
            .filter(|t| t.is_dir())
            .map(|t| t.checksum.clone())
            .collect();

        let manifests = self
            .fan_out("collect", dirs, jobs, |checksum| async move {
                self.pull_one(tree, checksum.clone()).await?;
                self.blocking(move |cache| cache.load_dir_cache(&checksum))
                    .await
            })
            .await;

        for (checksum, manifest) in manifests {
            match manifest {
                Ok(manifest) => {
                    collected.extend(manifest.entries().iter().map(|e| e.checksum.clone()))
                }
                Err(e) => warn!("Unable to collect contents of {}: {}", checksum, e),
            }
        }
        collected
    }

    async fn push_one(&self, tree: &dyn TransferTree, checksum: String) -> HoardResult<Outcome> {
        checksum::validate(&checksum)?;
        let location = tree.checksum_location(&checksum);
        if tree.isfile(&location).await? {
            debug!("'{}' already exists on the remote, skipping", checksum);
            return Ok(Outcome::Skipped);
        }

        let key = checksum.clone();
        let path = self
            .blocking(move |cache| {
                if cache.changed(&key)? {
                    return Err(HoardError::CacheMissing(key));
                }
                cache
                    .get(&key)
                    .ok_or_else(|| HoardError::CacheMissing(key.clone()))
            })
            .await?;

        tree.upload(&path, &location).await?;
        Ok(Outcome::Transferred)
    }

    async fn pull_one(&self, tree: &dyn TransferTree, checksum: String) -> HoardResult<Outcome> {
        checksum::validate(&checksum)?;
        let key = checksum.clone();
        let present = self.blocking(move |cache| Ok(!cache.changed(&key)?)).await?;
        if present {
            debug!("'{}' already exists in the cache, skipping", checksum);
            return Ok(Outcome::Skipped);
        }

        let location = tree.checksum_location(&checksum);
        let dest = self.cache.entry_path(&checksum)?;
        tree.download(&location, &dest).await?;

        let key = checksum.clone();
        let verified = self.blocking(move |cache| cache.accept_download(&key)).await?;
        if !verified {
            return Err(HoardError::CorruptedCache(checksum));
        }
        Ok(Outcome::Transferred)
    }

    async fn status_one(
        &self,
        tree: &dyn TransferTree,
        checksum: String,
    ) -> HoardResult<ObjectStatus> {
        checksum::validate(&checksum)?;
        let remote = tree.isfile(&tree.checksum_location(&checksum)).await?;
        let local = self.blocking(move |cache| Ok(!cache.changed(&checksum)?)).await?;
        Ok(ObjectStatus::from_presence(local, remote))
    }

    /// Run a cache operation on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> HoardResult<T>
    where
        F: FnOnce(&LocalCache) -> HoardResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || f(&cache))
            .await
            .map_err(|e| HoardError::Internal(format!("cache task failed: {}", e)))?
    }
}

/// Fold per-item results, failing only when every item failed
fn summarize(
    operation: &'static str,
    results: Vec<(String, HoardResult<Outcome>)>,
) -> HoardResult<TransferSummary> {
    let mut summary = TransferSummary::default();

    for (checksum, result) in results {
        match result {
            Ok(Outcome::Transferred) => {
                summary.transferred.insert(checksum);
            }
            Ok(Outcome::Skipped) => {
                summary.skipped.insert(checksum);
            }
            Err(e) => {
                warn!("Failed to {} '{}': {}", operation, checksum, e);
                summary.failed.insert(checksum);
            }
        }
    }

    let total = summary.total();
    if total > 0 && summary.failed.len() == total {
        return Err(HoardError::BatchFailed {
            operation,
            failed: total,
            total,
        });
    }
    Ok(summary)
}
