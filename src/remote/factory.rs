//! Transfer tree factory
//!
//! Maps each URL scheme to the backend that serves it.

use crate::config::{Credentials, RemoteSettings};
use crate::error::{HoardError, HoardResult};
use crate::location::{Location, RemoteLocation, Scheme};
use crate::remote::local::LocalTree;
use crate::remote::object::ObjectTree;
use crate::remote::tree::TransferTree;
use opendal::{services, Operator};
use std::sync::Arc;
use tracing::debug;

/// Default WebHDFS namenode HTTP port
const WEBHDFS_PORT: u16 = 9870;

/// Create the transfer tree serving `settings.location`
///
/// # Returns
/// * `Ok(Box<dyn TransferTree>)` - A boxed tree for the remote's scheme
/// * `Err` - If the backend rejects the configuration
pub fn create_tree(settings: &RemoteSettings) -> HoardResult<Box<dyn TransferTree>> {
    match &settings.location {
        Location::Local(_) => Ok(Box::new(LocalTree::new(settings.location.clone())?)),
        Location::Remote(remote) => {
            let op = build_operator(remote, &settings.credentials).map_err(|e| {
                HoardError::RemoteUnreachable {
                    location: settings.location.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Box::new(ObjectTree::new(settings.location.clone(), op)?))
        }
    }
}

/// Create a tree and verify the backend before handing it out
pub async fn connect(settings: &RemoteSettings) -> HoardResult<Arc<dyn TransferTree>> {
    let tree: Arc<dyn TransferTree> = Arc::from(create_tree(settings)?);
    tree.sanity_check().await?;
    debug!(
        "Connected to remote '{}' ({})",
        settings.name,
        tree.scheme()
    );
    Ok(tree)
}

fn build_operator(remote: &RemoteLocation, creds: &Credentials) -> opendal::Result<Operator> {
    let op = match remote.scheme() {
        Scheme::S3 => {
            let mut builder = services::S3::default().bucket(remote.bucket()).root("/");
            if let Some(ref region) = creds.region {
                builder = builder.region(region);
            }
            if let Some(ref endpoint) = creds.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(ref key_id) = creds.access_key_id {
                builder = builder.access_key_id(key_id);
            }
            if let Some(ref secret) = creds.secret_access_key {
                builder = builder.secret_access_key(secret);
            }
            if let Some(ref profile) = creds.profile {
                debug!("AWS profile '{}' is read from the environment", profile);
            }
            Operator::new(builder)?.finish()
        }
        Scheme::Gs => {
            let mut builder = services::Gcs::default().bucket(remote.bucket()).root("/");
            if let Some(ref path) = creds.credential_path {
                builder = builder.credential_path(path);
            }
            if let Some(ref endpoint) = creds.endpoint {
                builder = builder.endpoint(endpoint);
            }
            Operator::new(builder)?.finish()
        }
        Scheme::Azure => {
            let mut builder = services::Azblob::default()
                .container(remote.bucket())
                .root("/");
            if let Some(ref name) = creds.account_name {
                builder = builder.account_name(name);
            }
            if let Some(ref key) = creds.account_key {
                builder = builder.account_key(key);
            }
            let endpoint = creds.endpoint.clone().or_else(|| {
                creds
                    .account_name
                    .as_ref()
                    .map(|name| format!("https://{}.blob.core.windows.net", name))
            });
            if let Some(ref endpoint) = endpoint {
                builder = builder.endpoint(endpoint);
            }
            Operator::new(builder)?.finish()
        }
        Scheme::Hdfs => {
            let endpoint = creds.endpoint.clone().unwrap_or_else(|| {
                format!(
                    "http://{}:{}",
                    remote.host(),
                    remote.port().unwrap_or(WEBHDFS_PORT)
                )
            });
            let builder = services::Webhdfs::default().endpoint(&endpoint).root("/");
            Operator::new(builder)?.finish()
        }
        Scheme::Ssh => sftp_operator(remote, creds)?,
        Scheme::Memory => {
            let builder = services::Memory::default().root(&format!("/{}", remote.host()));
            Operator::new(builder)?.finish()
        }
        Scheme::Local => {
            return Err(opendal::Error::new(
                opendal::ErrorKind::ConfigInvalid,
                "local paths are served by the filesystem tree",
            ))
        }
    };
    Ok(op)
}

#[cfg(unix)]
fn sftp_operator(remote: &RemoteLocation, creds: &Credentials) -> opendal::Result<Operator> {
    let endpoint = match remote.port() {
        Some(port) => format!("ssh://{}:{}", remote.host(), port),
        None => format!("ssh://{}", remote.host()),
    };
    let mut builder = services::Sftp::default().endpoint(&endpoint).root("/");
    if let Some(user) = remote.user().or(creds.user.as_deref()) {
        builder = builder.user(user);
    }
    if let Some(ref key) = creds.key {
        builder = builder.key(key);
    }
    Ok(Operator::new(builder)?.finish())
}

#[cfg(not(unix))]
fn sftp_operator(_remote: &RemoteLocation, _creds: &Credentials) -> opendal::Result<Operator> {
    Err(opendal::Error::new(
        opendal::ErrorKind::Unsupported,
        "ssh remotes need a unix host",
    ))
}
