//! Link strategies for materializing cache entries in the workspace
//!
//! Strategies are tried in the configured priority order; the first one the
//! filesystem accepts wins.

use crate::error::{HoardError, HoardResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Mechanism used to place cache content at a workspace path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Copy-on-write clone (btrfs, xfs, apfs)
    Reflink,
    /// Hard link to the cache inode
    Hardlink,
    /// Symbolic link to the cache path
    Symlink,
    /// Full byte copy
    Copy,
}

impl LinkType {
    /// Priority order used when the config does not set one
    pub const DEFAULT_ORDER: [LinkType; 4] = [
        LinkType::Reflink,
        LinkType::Hardlink,
        LinkType::Symlink,
        LinkType::Copy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflink => "reflink",
            Self::Hardlink => "hardlink",
            Self::Symlink => "symlink",
            Self::Copy => "copy",
        }
    }

    /// Whether the workspace path shares storage with the cache entry
    pub fn shares_storage(&self) -> bool {
        matches!(self, Self::Hardlink | Self::Symlink)
    }

    /// Parse a comma-separated priority list such as `"reflink, copy"`
    pub fn parse_list(list: &str) -> HoardResult<Vec<Self>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::from_str)
            .collect()
    }

    /// Create `dest` from `src` with this strategy
    pub fn link(&self, src: &Path, dest: &Path) -> io::Result<()> {
        match self {
            Self::Reflink => reflink(src, dest),
            Self::Hardlink => fs::hard_link(src, dest),
            Self::Symlink => symlink(src, dest),
            Self::Copy => copy(src, dest),
        }
    }
}

impl FromStr for LinkType {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reflink" => Ok(Self::Reflink),
            "hardlink" => Ok(Self::Hardlink),
            "symlink" => Ok(Self::Symlink),
            "copy" => Ok(Self::Copy),
            other => Err(HoardError::UnknownLinkType(other.to_string())),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn copy(src: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(src, dest) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dest)
}

#[cfg(windows)]
fn symlink(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dest)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_src: &Path, _dest: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks not supported"))
}

fn reflink(src: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = reflink_copy::reflink(src, dest) {
        if e.kind() != io::ErrorKind::AlreadyExists {
            let _ = fs::remove_file(dest);
        }
        return Err(e);
    }
    Ok(())
}
