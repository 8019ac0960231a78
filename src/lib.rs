//! Hoard - content-addressed storage for large project data
//!
//! Files and directories are saved into a local cache keyed by checksum,
//! linked back into the workspace, and synced with remote storage
//! (local directories, S3, GCS, Azure Blob, WebHDFS, SFTP).

pub mod cache;
pub mod checksum;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod error;
pub mod location;
pub mod remote;
pub mod target;
pub mod ui;

pub use error::{HoardError, HoardResult};
