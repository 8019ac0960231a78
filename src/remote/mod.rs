//! Remote storage backends
//!
//! Every backend implements [`TransferTree`]:
//! - Local directories: tokio filesystem calls
//! - Object stores, SFTP, WebHDFS, memory: an OpenDAL operator

mod factory;
pub mod local;
pub mod object;
mod tree;

pub use factory::{connect, create_tree};
pub use local::LocalTree;
pub use object::ObjectTree;
pub use tree::{FileStream, TransferTree};
