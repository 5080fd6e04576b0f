//! Filesystem contract for vsh.
//!
//! A backend implements [`FileSystem`]; the shell only ever talks to the
//! filesystem through that trait, so any in-memory, remote or overlay store
//! can sit underneath it.

mod error;
pub mod path;
mod provider;
mod types;

pub use error::{FsError, FsResult};
pub use provider::FileSystem;
pub use types::{FileStat, FileType};
