use async_trait::async_trait;

use crate::error::FsResult;
use crate::path;
use crate::types::FileStat;

/// Storage backend the shell runs against.
///
/// All paths passed in are absolute and normalized by the caller; backends
/// may still normalize defensively. A completed write must be visible to
/// every subsequent call.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> FsResult<String>;

    /// Creates or truncates `path`. The parent directory must exist.
    async fn write_file(&self, path: &str, content: &str) -> FsResult<()>;

    /// Appends to `path`, creating it when absent.
    async fn append_file(&self, path: &str, content: &str) -> FsResult<()>;

    async fn exists(&self, path: &str) -> bool;

    async fn stat(&self, path: &str) -> FsResult<FileStat>;

    async fn mkdir(&self, path: &str, recursive: bool) -> FsResult<()>;

    /// Child names (not full paths), sorted.
    async fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    /// `force` suppresses not-found; `recursive` is required for non-empty
    /// directories.
    async fn rm(&self, path: &str, recursive: bool, force: bool) -> FsResult<()>;

    async fn cp(&self, src: &str, dest: &str, recursive: bool) -> FsResult<()>;

    async fn mv(&self, src: &str, dest: &str) -> FsResult<()>;

    /// Every path the backend knows about, used for glob matching.
    async fn get_all_paths(&self) -> Vec<String>;

    fn resolve_path(&self, base: &str, path: &str) -> String {
        path::resolve_path(base, path)
    }
}
