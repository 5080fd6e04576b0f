use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    Regular,
    Directory,
}

/// Metadata returned by [`FileSystem::stat`](crate::FileSystem::stat).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileStat {
    pub file_type: FileType,
    pub mode: u32,
    pub size: u64,
    pub mtime: SystemTime,
}

impl FileStat {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::Regular
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stat_type_helpers() {
        let stat = FileStat {
            file_type: FileType::Directory,
            mode: 0o755,
            size: 0,
            mtime: SystemTime::UNIX_EPOCH,
        };
        assert!(stat.is_dir());
        assert!(!stat.is_file());
    }
}
