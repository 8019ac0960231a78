//! Uniform addressing for local paths and remote URLs
//!
//! A [`Location`] is pure data: parsing, joining and comparing never touch
//! the filesystem or the network.

use crate::error::{HoardError, HoardResult};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Storage schemes, one per transfer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Local filesystem (no scheme, or `file://`)
    Local,
    /// Amazon S3 or a compatible service
    S3,
    /// Google Cloud Storage
    Gs,
    /// Azure Blob Storage
    Azure,
    /// HDFS through its WebHDFS endpoint
    Hdfs,
    /// SFTP over SSH
    Ssh,
    /// Process-local in-memory object store
    Memory,
}

impl Scheme {
    /// Look up a URL scheme string
    pub fn from_url_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "" | "file" => Some(Self::Local),
            "s3" => Some(Self::S3),
            "gs" => Some(Self::Gs),
            "azure" => Some(Self::Azure),
            "hdfs" => Some(Self::Hdfs),
            "ssh" => Some(Self::Ssh),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Gs => "gs",
            Self::Azure => "azure",
            Self::Hdfs => "hdfs",
            Self::Ssh => "ssh",
            Self::Memory => "memory",
        }
    }

    /// Whether directories exist only as key prefixes
    pub fn is_object_store(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A location on a remote backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocation {
    scheme: Scheme,
    /// Bucket, container, or host name
    host: String,
    port: Option<u16>,
    user: Option<String>,
    /// Normalized `/`-separated key with no leading or trailing slash
    path: String,
}

impl RemoteLocation {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bucket or container name for object stores
    pub fn bucket(&self) -> &str {
        &self.host
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Object key (path under the bucket)
    pub fn key(&self) -> &str {
        &self.path
    }
}

/// A local path or a remote URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Local(PathBuf),
    Remote(RemoteLocation),
}

impl Location {
    /// Parse a URL-like string; a string without a scheme is a local path
    pub fn parse(input: &str) -> HoardResult<Self> {
        let Some((scheme, _)) = input.split_once("://") else {
            return Ok(Self::local(input));
        };

        // Windows drive letters ("C:\...") never contain "://".
        let kind = Scheme::from_url_scheme(scheme).ok_or_else(|| HoardError::UnsupportedScheme {
            scheme: scheme.to_string(),
            url: input.to_string(),
        })?;

        let url = Url::parse(input).map_err(|e| HoardError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        if kind == Scheme::Local {
            let path = url.to_file_path().map_err(|_| HoardError::InvalidUrl {
                url: input.to_string(),
                reason: "not a valid file path".to_string(),
            })?;
            return Ok(Self::local(path));
        }

        let host = url.host_str().unwrap_or_default().to_string();
        if host.is_empty() && kind != Scheme::Memory {
            return Err(HoardError::InvalidUrl {
                url: input.to_string(),
                reason: "missing bucket or host".to_string(),
            });
        }

        let user = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self::Remote(RemoteLocation {
            scheme: kind,
            host,
            port: url.port(),
            user,
            path: normalize_key(url.path()),
        }))
    }

    /// Local path location, lexically normalized
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::Local(normalize_path(path.as_ref()))
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Local(_) => Scheme::Local,
            Self::Remote(r) => r.scheme,
        }
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Self::Local(p) => Some(p),
            Self::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteLocation> {
        match self {
            Self::Local(_) => None,
            Self::Remote(r) => Some(r),
        }
    }

    /// Bucket or host, for remote locations
    pub fn bucket(&self) -> Option<&str> {
        self.as_remote().map(RemoteLocation::bucket)
    }

    /// Key under the bucket, or the local path rendered with `/`
    pub fn key(&self) -> String {
        match self {
            Self::Local(p) => p.to_string_lossy().replace('\\', "/"),
            Self::Remote(r) => r.path.clone(),
        }
    }

    /// Child location of the same scheme
    pub fn join(&self, child: &str) -> Self {
        match self {
            Self::Local(p) => Self::local(p.join(child)),
            Self::Remote(r) => {
                let joined = if r.path.is_empty() {
                    child.to_string()
                } else {
                    format!("{}/{}", r.path, child)
                };
                Self::Remote(RemoteLocation {
                    path: normalize_key(&joined),
                    ..r.clone()
                })
            }
        }
    }

    /// Parent location, or `None` at the root
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Local(p) => p.parent().map(Self::local),
            Self::Remote(r) if r.path.is_empty() => None,
            Self::Remote(r) => {
                let parent = r.path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
                Some(Self::Remote(RemoteLocation {
                    path: parent.to_string(),
                    ..r.clone()
                }))
            }
        }
    }

    /// Final path component
    pub fn name(&self) -> Option<String> {
        match self {
            Self::Local(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote(r) => r.path.rsplit('/').next().filter(|n| !n.is_empty()).map(str::to_string),
        }
    }

    /// Whether this is the top of a bucket or host
    pub fn is_root(&self) -> bool {
        match self {
            Self::Local(p) => p.parent().is_none(),
            Self::Remote(r) => r.path.is_empty(),
        }
    }

    /// Path of `self` relative to `base`, `/`-separated
    pub fn relative_to(&self, base: &Location) -> Option<String> {
        match (self, base) {
            (Self::Local(p), Self::Local(b)) => p
                .strip_prefix(b)
                .ok()
                .map(crate::checksum::relpath_string),
            (Self::Remote(r), Self::Remote(b))
                if r.scheme == b.scheme && r.host == b.host && r.port == b.port =>
            {
                if b.path.is_empty() {
                    Some(r.path.clone())
                } else if r.path == b.path {
                    Some(String::new())
                } else {
                    r.path.strip_prefix(&format!("{}/", b.path)).map(str::to_string)
                }
            }
            _ => None,
        }
    }
}

impl std::ops::Div<&str> for &Location {
    type Output = Location;

    fn div(self, rhs: &str) -> Location {
        self.join(rhs)
    }
}

impl FromStr for Location {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(p) => write!(f, "{}", p.display()),
            Self::Remote(r) => {
                write!(f, "{}://", r.scheme)?;
                if let Some(ref user) = r.user {
                    write!(f, "{}@", user)?;
                }
                write!(f, "{}", r.host)?;
                if let Some(port) = r.port {
                    write!(f, ":{}", port)?;
                }
                write!(f, "/{}", r.path)
            }
        }
    }
}

/// Collapse `.`/`..` and repeated separators in an object key
fn normalize_key(key: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in key.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Lexical normalization of a local path
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_s3_url() {
        let loc = Location::parse("s3://bucket/some/prefix/").unwrap();
        assert_eq!(loc.scheme(), Scheme::S3);
        assert_eq!(loc.bucket(), Some("bucket"));
        assert_eq!(loc.key(), "some/prefix");
    }

    #[test]
    fn parses_ssh_url_with_user_and_port() {
        let loc = Location::parse("ssh://alice@example.com:2222/srv/data").unwrap();
        let remote = loc.as_remote().unwrap();
        assert_eq!(remote.scheme(), Scheme::Ssh);
        assert_eq!(remote.host(), "example.com");
        assert_eq!(remote.port(), Some(2222));
        assert_eq!(remote.user(), Some("alice"));
        assert_eq!(remote.key(), "srv/data");
    }

    #[test]
    fn plain_path_is_local() {
        let loc = Location::parse("/tmp/./cache/../store").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("/tmp/store")));
        assert_eq!(loc.scheme(), Scheme::Local);
    }

    #[test]
    fn unknown_scheme_is_config_error() {
        let err = Location::parse("ftp://host/path").unwrap_err();
        assert!(matches!(err, HoardError::UnsupportedScheme { .. }));
    }

    #[test]
    fn missing_bucket_is_invalid() {
        assert!(matches!(
            Location::parse("s3:///key"),
            Err(HoardError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn join_keeps_scheme() {
        let root = Location::parse("gs://bucket/prefix").unwrap();
        let child = &root / "ab/cdef";
        assert_eq!(child.scheme(), Scheme::Gs);
        assert_eq!(child.key(), "prefix/ab/cdef");
        assert_eq!(child.to_string(), "gs://bucket/prefix/ab/cdef");
        assert_eq!(child.relative_to(&root).as_deref(), Some("ab/cdef"));
    }

    #[test]
    fn join_from_bucket_root() {
        let root = Location::parse("memory://store").unwrap();
        assert!(root.is_root());
        let child = root.join("a/b");
        assert_eq!(child.key(), "a/b");
        assert_eq!(child.parent().unwrap().key(), "a");
        assert_eq!(child.name().as_deref(), Some("b"));
    }

    #[test]
    fn equality_uses_normalized_components() {
        let a = Location::parse("s3://bucket/a//b/").unwrap();
        let b = Location::parse("s3://bucket/a/b").unwrap();
        assert_eq!(a, b);

        let set: HashSet<Location> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_buckets_differ() {
        let a = Location::parse("s3://one/key").unwrap();
        let b = Location::parse("s3://two/key").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.relative_to(&b), None);
    }
}
