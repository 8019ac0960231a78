//! Rewrite of the obsolete single-cloud config format
//!
//! Old configs name a cloud type in `core.cloud` and keep its settings in a
//! top-level section (`[aws]`, `[gcp]`, ...). They are turned into an
//! equivalent `[remote.<cloud>]` before anything else reads the config.

use crate::config::schema::{Config, LegacyCloudConfig, RemoteConfig};
use crate::error::{HoardError, HoardResult};
use tracing::warn;

const OBSOLETE: &str = "Using obsoleted config format. Consider updating.";

/// Normalize `config` in place
///
/// A config with `core.remote` set, or without `core.cloud`, is left alone.
pub fn normalize(config: &mut Config) -> HoardResult<()> {
    if config.core.remote.as_deref().is_some_and(|r| !r.is_empty()) {
        return Ok(());
    }

    let cloud = match config.core.cloud.as_deref().map(str::trim) {
        Some(cloud) if !cloud.is_empty() => cloud.to_ascii_lowercase(),
        _ => return Ok(()),
    };

    warn!("{}", OBSOLETE);

    let scheme = scheme_for(&cloud).ok_or_else(|| HoardError::UnknownCloudType(cloud.clone()))?;
    let section = section(config, &cloud)
        .cloned()
        .ok_or_else(|| HoardError::CloudSectionMissing(cloud.clone()))?;

    let storagepath = match config.core.storagepath.as_deref() {
        Some(global) => {
            warn!("{}", OBSOLETE);
            Some(global.to_string())
        }
        None => section.storagepath.clone(),
    }
    .ok_or_else(|| HoardError::ConfigInvalid {
        path: format!("[{}]", cloud).into(),
        reason: "storagepath is not set".to_string(),
    })?;

    let url = match scheme {
        Some(scheme) => format!("{}://{}", scheme, storagepath.trim_start_matches('/')),
        None => storagepath,
    };

    config.remote.insert(
        cloud.clone(),
        RemoteConfig {
            url,
            jobs: None,
            credentials: section.credentials,
        },
    );
    config.core.remote = Some(cloud);
    Ok(())
}

/// URL scheme for a legacy cloud type; `Some(None)` means a plain local path
fn scheme_for(cloud: &str) -> Option<Option<&'static str>> {
    match cloud {
        "aws" => Some(Some("s3")),
        "gcp" => Some(Some("gs")),
        "azure" => Some(Some("azure")),
        "hdfs" => Some(Some("hdfs")),
        "ssh" => Some(Some("ssh")),
        "local" => Some(None),
        _ => None,
    }
}

fn section<'a>(config: &'a Config, cloud: &str) -> Option<&'a LegacyCloudConfig> {
    match cloud {
        "aws" => config.aws.as_ref(),
        "gcp" => config.gcp.as_ref(),
        "azure" => config.azure.as_ref(),
        "local" => config.local.as_ref(),
        "hdfs" => config.hdfs.as_ref(),
        "ssh" => config.ssh.as_ref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn new_format_is_untouched() {
        let mut config = parse(
            r#"
            [core]
            remote = "origin"
            cloud = "aws"

            [remote.origin]
            url = "s3://bucket"
            "#,
        );

        normalize(&mut config).unwrap();

        assert_eq!(config.core.remote.as_deref(), Some("origin"));
        assert_eq!(config.remote.len(), 1);
    }

    #[test]
    fn aws_section_becomes_s3_remote() {
        let mut config = parse(
            r#"
            [core]
            cloud = "AWS"

            [aws]
            storagepath = "bucket/prefix"
            region = "us-east-2"
            "#,
        );

        normalize(&mut config).unwrap();

        assert_eq!(config.core.remote.as_deref(), Some("aws"));
        let remote = &config.remote["aws"];
        assert_eq!(remote.url, "s3://bucket/prefix");
        assert_eq!(remote.credentials.region.as_deref(), Some("us-east-2"));
    }

    #[test]
    fn local_section_keeps_plain_path() {
        let mut config = parse(
            r#"
            [core]
            cloud = "local"

            [local]
            storagepath = "/mnt/storage"
            "#,
        );

        normalize(&mut config).unwrap();
        assert_eq!(config.remote["local"].url, "/mnt/storage");
    }

    #[test]
    fn global_storagepath_overrides_section() {
        let mut config = parse(
            r#"
            [core]
            cloud = "gcp"
            storagepath = "other-bucket/data"

            [gcp]
            storagepath = "bucket"
            "#,
        );

        normalize(&mut config).unwrap();
        assert_eq!(config.remote["gcp"].url, "gs://other-bucket/data");
    }

    #[test]
    fn unknown_cloud_type_is_config_error() {
        let mut config = parse("[core]\ncloud = \"dropbox\"");
        let err = normalize(&mut config).unwrap_err();
        assert!(matches!(err, HoardError::UnknownCloudType(ref c) if c == "dropbox"));
    }

    #[test]
    fn missing_cloud_section_is_config_error() {
        let mut config = parse("[core]\ncloud = \"aws\"");
        let err = normalize(&mut config).unwrap_err();
        assert!(matches!(err, HoardError::CloudSectionMissing(_)));
    }

    #[test]
    fn no_cloud_means_no_remote() {
        let mut config = Config::default();
        normalize(&mut config).unwrap();
        assert!(config.core.remote.is_none());
        assert!(config.remote.is_empty());
    }
}
