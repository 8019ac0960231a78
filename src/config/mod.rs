//! Configuration management for Hoard

pub mod legacy;
pub mod schema;

pub use schema::{Config, Credentials, RemoteConfig, RemoteSettings};

use crate::cache::CacheSettings;
use crate::error::{HoardError, HoardResult};
use crate::location::Location;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Project metadata directory
pub const PROJECT_DIR: &str = ".hoard";

/// Config file name inside the project or user config directory
pub const CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Parse TOML and rewrite any obsolete single-cloud format
    pub fn from_toml(content: &str) -> HoardResult<Self> {
        let mut config: Config = toml::from_str(content)?;
        legacy::normalize(&mut config)?;
        Ok(config)
    }

    /// Name of the default remote, if one is configured
    pub fn default_remote(&self) -> Option<&str> {
        self.core.remote.as_deref().filter(|r| !r.is_empty())
    }

    /// Resolve a named remote into transfer settings
    pub fn remote_settings(&self, name: &str) -> HoardResult<RemoteSettings> {
        let remote = self
            .remote
            .get(name)
            .ok_or_else(|| HoardError::RemoteNotFound(format!("remote \"{}\"", name)))?;

        if remote.url.trim().is_empty() {
            return Err(HoardError::InvalidUrl {
                url: String::new(),
                reason: format!("remote \"{}\" has no url", name),
            });
        }

        Ok(RemoteSettings {
            name: name.to_string(),
            location: Location::parse(remote.url.trim())?,
            credentials: remote.credentials.clone(),
            jobs: remote.jobs.unwrap_or(self.core.jobs).max(1),
        })
    }

    /// Local cache settings with the cache directory resolved against `root`
    pub fn cache_settings(&self, root: &Path) -> CacheSettings {
        let dir = if self.cache.dir.is_absolute() {
            self.cache.dir.clone()
        } else {
            root.join(&self.cache.dir)
        };

        CacheSettings::new(dir)
            .with_link_types(self.cache.types.clone())
            .with_protected(self.cache.protected)
            .with_work_root(root)
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
    project_root: PathBuf,
}

impl ConfigManager {
    /// Discover the project config from the current directory
    pub fn new() -> HoardResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| HoardError::io("reading current directory", e))?;
        Ok(Self::discover(&cwd))
    }

    /// Walk up from `start` looking for a `.hoard` directory
    ///
    /// Without one, `start` is the project root and the per-user config file
    /// is used.
    pub fn discover(start: &Path) -> Self {
        for dir in start.ancestors() {
            let project = dir.join(PROJECT_DIR);
            if project.is_dir() {
                debug!("Found project at {}", dir.display());
                return Self {
                    config_path: project.join(CONFIG_FILE),
                    project_root: dir.to_path_buf(),
                };
            }
        }

        Self {
            config_path: Self::user_config_path(),
            project_root: start.to_path_buf(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf, project_root: PathBuf) -> Self {
        Self {
            config_path: path,
            project_root,
        }
    }

    /// Per-user config file path
    pub fn user_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hoard")
            .join(CONFIG_FILE)
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> HoardResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> HoardResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| HoardError::io(format!("reading config from {}", path.display()), e))?;

        Config::from_toml(&content).map_err(|e| match e {
            HoardError::TomlParse(e) => HoardError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            other => other,
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> HoardResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            HoardError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> HoardResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HoardError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Create `.hoard/` under the project root and point the manager at it
    pub async fn init_project(&mut self) -> HoardResult<PathBuf> {
        let dir = self.project_root.join(PROJECT_DIR);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| HoardError::ConfigDirCreate {
                path: dir.clone(),
                source: e,
            })?;
        self.config_path = dir.join(CONFIG_FILE);
        Ok(dir)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Directory relative paths and the cache location resolve against
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Scheme;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path, temp.path().to_path_buf());

        let config = manager.load().await.unwrap();
        assert_eq!(config.core.jobs, schema::DEFAULT_JOBS);
        assert!(config.default_remote().is_none());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".hoard").join(CONFIG_FILE);
        let manager = ConfigManager::with_path(path, temp.path().to_path_buf());

        let mut config = Config::default();
        config.core.remote = Some("backup".to_string());
        config.remote.insert(
            "backup".to_string(),
            RemoteConfig {
                url: "/mnt/backup".to_string(),
                ..Default::default()
            },
        );

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.default_remote(), Some("backup"));
        assert_eq!(loaded.remote["backup"].url, "/mnt/backup");
    }

    #[tokio::test]
    async fn invalid_toml_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "[core\njobs =").unwrap();
        let manager = ConfigManager::with_path(path.clone(), temp.path().to_path_buf());

        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, HoardError::ConfigInvalid { path: ref p, .. } if *p == path));
    }

    #[tokio::test]
    async fn legacy_format_is_normalized_on_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "[core]\ncloud = \"aws\"\n\n[aws]\nstoragepath = \"bucket/data\"\n")
            .unwrap();
        let manager = ConfigManager::with_path(path, temp.path().to_path_buf());

        let config = manager.load().await.unwrap();
        let settings = config.remote_settings("aws").unwrap();

        assert_eq!(settings.location.scheme(), Scheme::S3);
        assert_eq!(settings.location.bucket(), Some("bucket"));
    }

    #[test]
    fn discover_walks_up_to_project() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(PROJECT_DIR)).unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let manager = ConfigManager::discover(&nested);

        assert_eq!(manager.project_root(), temp.path());
        assert_eq!(manager.path(), temp.path().join(PROJECT_DIR).join(CONFIG_FILE));
    }

    #[test]
    fn remote_settings_resolve_jobs() {
        let config = Config::from_toml(
            r#"
            [core]
            jobs = 3

            [remote.a]
            url = "memory://a"

            [remote.b]
            url = "memory://b"
            jobs = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.remote_settings("a").unwrap().jobs, 3);
        assert_eq!(config.remote_settings("b").unwrap().jobs, 9);
    }

    #[test]
    fn remote_settings_errors_are_config_errors() {
        let config = Config::from_toml(
            r#"
            [remote.ftp]
            url = "ftp://host/path"

            [remote.empty]
            url = ""
            "#,
        )
        .unwrap();

        for name in ["missing", "ftp", "empty"] {
            let err = config.remote_settings(name).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Config, "{}", name);
        }
    }

    #[test]
    fn relative_cache_dir_resolves_against_root() {
        let config = Config::default();
        let settings = config.cache_settings(Path::new("/project"));
        assert_eq!(settings.dir, Path::new("/project/.hoard/cache"));
        assert!(settings.protected);
    }
}
