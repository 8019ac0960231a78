//! Configuration schema for Hoard
//!
//! Configuration is stored at `<project>/.hoard/config.toml`, falling back to
//! `~/.config/hoard/config.toml`.

use crate::cache::LinkType;
use crate::error::HoardResult;
use crate::location::Location;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default worker count for transfers
pub const DEFAULT_JOBS: usize = 4;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Local cache settings
    pub cache: CacheConfig,

    /// Named remotes
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub remote: BTreeMap<String, RemoteConfig>,

    /// Obsolete single-cloud sections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws: Option<LegacyCloudConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcp: Option<LegacyCloudConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure: Option<LegacyCloudConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LegacyCloudConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdfs: Option<LegacyCloudConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<LegacyCloudConfig>,
}

/// Core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Default remote name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Default number of parallel transfers
    pub jobs: usize,

    /// Obsolete single-cloud type (aws, gcp, azure, local, hdfs, ssh)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,

    /// Obsolete global storage path, overriding the cloud section's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storagepath: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            remote: None,
            jobs: DEFAULT_JOBS,
            cloud: None,
            storagepath: None,
        }
    }
}

/// Local cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory, relative paths resolved against the project root
    pub dir: PathBuf,

    /// Link strategies in priority order
    #[serde(rename = "type", deserialize_with = "link_types")]
    pub types: Vec<LinkType>,

    /// Make cache entries read-only once stored
    pub protected: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".hoard").join("cache"),
            types: LinkType::DEFAULT_ORDER.to_vec(),
            protected: true,
        }
    }
}

/// Accept either `type = ["hardlink", "copy"]` or `type = "hardlink,copy"`
fn link_types<'de, D>(deserializer: D) -> Result<Vec<LinkType>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let types = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items
            .iter()
            .map(|s| s.parse())
            .collect::<HoardResult<Vec<LinkType>>>(),
        Raw::Joined(s) => LinkType::parse_list(&s),
    }
    .map_err(serde::de::Error::custom)?;

    if types.is_empty() {
        return Err(serde::de::Error::custom("cache type list is empty"));
    }
    Ok(types)
}

/// Backend credentials and connection options
///
/// Each backend reads the keys that apply to it and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom service endpoint (S3-compatible stores, Azure, WebHDFS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// AWS profile name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    /// GCP service account file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,

    /// SSH user, when not part of the URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// SSH private key path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// `[remote.<name>]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,

    /// Per-remote override of `core.jobs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Obsolete `[aws]`, `[gcp]`, ... section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyCloudConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storagepath: Option<String>,

    #[serde(flatten)]
    pub credentials: Credentials,
}

/// A remote resolved into everything a transfer tree needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub name: String,
    pub location: Location,
    pub credentials: Credentials,
    pub jobs: usize,
}
