//! CLI command implementations

pub mod checkout;
pub mod config;
pub mod gc;
pub mod init;
pub mod save;
pub mod sync;
pub mod unprotect;

pub use checkout::execute as checkout;
pub use config::execute as config;
pub use gc::execute as gc;
pub use init::execute as init;
pub use save::execute as save;
pub use sync::{pull, push, status};
pub use unprotect::execute as unprotect;

use crate::cache::LocalCache;
use crate::config::{Config, ConfigManager};
use crate::error::{HoardError, HoardResult};
use crate::target::Target;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loaded configuration and the project cache it describes
pub struct Workspace {
    pub manager: ConfigManager,
    pub config: Config,
    pub cache: Arc<LocalCache>,
}

impl Workspace {
    /// Load config and open the cache for the project containing the cwd
    pub async fn open(manager: ConfigManager) -> HoardResult<Self> {
        let config = manager.load().await?;
        let settings = config.cache_settings(manager.project_root());
        let cache = blocking_io(move || LocalCache::open(settings)).await?;
        Ok(Self {
            manager,
            config,
            cache: Arc::new(cache),
        })
    }

    pub fn root(&self) -> &Path {
        self.manager.project_root()
    }

    /// Targets named on the command line, or every pointer in the project
    pub fn targets(&self, paths: &[PathBuf]) -> HoardResult<Vec<Target>> {
        if paths.is_empty() {
            return Target::discover(self.root());
        }
        paths.iter().map(|p| Target::load(p)).collect()
    }

    /// Run a cache operation off the async runtime
    pub async fn blocking<T, F>(&self, f: F) -> HoardResult<T>
    where
        F: FnOnce(&LocalCache) -> HoardResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        blocking_io(move || f(&cache)).await
    }
}

async fn blocking_io<T, F>(f: F) -> HoardResult<T>
where
    F: FnOnce() -> HoardResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HoardError::Internal(format!("cache task failed: {}", e)))?
}
