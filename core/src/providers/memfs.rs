use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use vsh_sdk::path::{normalize_path, parent_path};
use vsh_sdk::{FileStat, FileSystem, FileType, FsError, FsResult};

#[derive(Debug, Clone)]
struct MemFile {
    content: String,
    mode: u32,
    mtime: SystemTime,
}

impl MemFile {
    fn new(content: String) -> Self {
        Self {
            content,
            mode: 0o644,
            mtime: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct MemDir {
    mode: u32,
    mtime: SystemTime,
}

impl Default for MemDir {
    fn default() -> Self {
        Self {
            mode: 0o755,
            mtime: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone)]
enum MemEntry {
    File(MemFile),
    Dir(MemDir),
}

impl MemEntry {
    const fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    fn to_stat(&self) -> FileStat {
        match self {
            Self::File(f) => FileStat {
                file_type: FileType::Regular,
                mode: f.mode,
                size: f.content.len() as u64,
                mtime: f.mtime,
            },
            Self::Dir(d) => FileStat {
                file_type: FileType::Directory,
                mode: d.mode,
                size: 0,
                mtime: d.mtime,
            },
        }
    }
}

type Entries = BTreeMap<String, MemEntry>;

/// In-memory tree keyed by normalized absolute path.
///
/// Each operation holds the lock for its whole duration, so a write is
/// visible to the next caller as soon as the future resolves.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<Entries>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), MemEntry::Dir(MemDir::default()));
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Builds a filesystem pre-populated with files; missing parent
    /// directories are created.
    #[must_use]
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let fs = Self::new();
        for (path, content) in files {
            fs.seed_file(path.as_ref(), content);
        }
        fs
    }

    /// Synchronously writes a file, creating parents and replacing anything
    /// already at `path`.
    pub fn seed_file(&self, path: &str, content: impl Into<String>) {
        let path = normalize_path(path);
        let mut entries = self.write_entries();
        if let Some(parent) = parent_path(&path) {
            Self::create_dirs(&mut entries, &parent);
        }
        Self::remove_subtree(&mut entries, &path);
        entries.insert(path, MemEntry::File(MemFile::new(content.into())));
    }

    /// Synchronously creates a directory and its parents.
    pub fn seed_dir(&self, path: &str) {
        let path = normalize_path(path);
        let mut entries = self.write_entries();
        Self::create_dirs(&mut entries, &path);
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// `mkdir -p` without error reporting; files in the way are replaced.
    fn create_dirs(entries: &mut Entries, path: &str) {
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            if !matches!(entries.get(&current), Some(MemEntry::Dir(_))) {
                entries.insert(current.clone(), MemEntry::Dir(MemDir::default()));
            }
        }
    }

    fn child_prefix(path: &str) -> String {
        if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        }
    }

    fn has_children(entries: &Entries, path: &str) -> bool {
        let prefix = Self::child_prefix(path);
        entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    fn subtree_keys(entries: &Entries, path: &str) -> Vec<String> {
        let prefix = Self::child_prefix(path);
        let mut keys: Vec<String> = entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        if entries.contains_key(path) {
            keys.push(path.to_string());
        }
        keys
    }

    fn remove_subtree(entries: &mut Entries, path: &str) {
        for key in Self::subtree_keys(entries, path) {
            entries.remove(&key);
        }
    }

    /// The parent of `path` must be an existing directory.
    fn check_parent(entries: &Entries, path: &str) -> FsResult<()> {
        let parent = parent_path(path).ok_or_else(|| FsError::invalid_argument("root path"))?;
        match entries.get(&parent) {
            Some(MemEntry::Dir(_)) => Ok(()),
            Some(MemEntry::File(_)) => Err(FsError::not_directory(parent)),
            None => Err(FsError::not_found(path)),
        }
    }

    fn is_within(path: &str, ancestor: &str) -> bool {
        path == ancestor || path.starts_with(&Self::child_prefix(ancestor))
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read_file(&self, path: &str) -> FsResult<String> {
        let path = normalize_path(path);
        let entries = self.read_entries();
        match entries.get(&path) {
            Some(MemEntry::File(f)) => Ok(f.content.clone()),
            Some(MemEntry::Dir(_)) => Err(FsError::is_directory(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> FsResult<()> {
        let path = normalize_path(path);
        let mut entries = self.write_entries();
        match entries.get_mut(&path) {
            Some(MemEntry::Dir(_)) => Err(FsError::is_directory(path)),
            Some(MemEntry::File(f)) => {
                f.content = content.to_string();
                f.mtime = SystemTime::now();
                Ok(())
            }
            None => {
                Self::check_parent(&entries, &path)?;
                entries.insert(path, MemEntry::File(MemFile::new(content.to_string())));
                Ok(())
            }
        }
    }

    async fn append_file(&self, path: &str, content: &str) -> FsResult<()> {
        let path = normalize_path(path);
        let mut entries = self.write_entries();
        match entries.get_mut(&path) {
            Some(MemEntry::Dir(_)) => Err(FsError::is_directory(path)),
            Some(MemEntry::File(f)) => {
                f.content.push_str(content);
                f.mtime = SystemTime::now();
                Ok(())
            }
            None => {
                Self::check_parent(&entries, &path)?;
                entries.insert(path, MemEntry::File(MemFile::new(content.to_string())));
                Ok(())
            }
        }
    }

    async fn exists(&self, path: &str) -> bool {
        self.read_entries().contains_key(&normalize_path(path))
    }

    async fn stat(&self, path: &str) -> FsResult<FileStat> {
        let path = normalize_path(path);
        self.read_entries()
            .get(&path)
            .map(MemEntry::to_stat)
            .ok_or_else(|| FsError::not_found(path))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> FsResult<()> {
        let path = normalize_path(path);
        let mut entries = self.write_entries();

        if let Some(existing) = entries.get(&path) {
            return if recursive && existing.is_dir() {
                Ok(())
            } else {
                Err(FsError::already_exists(path))
            };
        }

        if !recursive {
            Self::check_parent(&entries, &path)?;
            entries.insert(path, MemEntry::Dir(MemDir::default()));
            return Ok(());
        }

        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            match entries.get(&current) {
                Some(MemEntry::Dir(_)) => {}
                Some(MemEntry::File(_)) => return Err(FsError::not_directory(current)),
                None => {
                    entries.insert(current.clone(), MemEntry::Dir(MemDir::default()));
                }
            }
        }
        Ok(())
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize_path(path);
        let entries = self.read_entries();

        match entries.get(&path) {
            Some(MemEntry::Dir(_)) => {}
            Some(MemEntry::File(_)) => return Err(FsError::not_directory(path)),
            None => return Err(FsError::not_found(path)),
        }

        let prefix = Self::child_prefix(&path);
        let names = entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    async fn rm(&self, path: &str, recursive: bool, force: bool) -> FsResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(FsError::permission_denied(path));
        }

        let mut entries = self.write_entries();
        let Some(entry) = entries.get(&path) else {
            return if force {
                Ok(())
            } else {
                Err(FsError::not_found(path))
            };
        };

        if entry.is_dir() && !recursive {
            return Err(FsError::is_directory(path));
        }
        Self::remove_subtree(&mut entries, &path);
        Ok(())
    }

    async fn cp(&self, src: &str, dest: &str, recursive: bool) -> FsResult<()> {
        let src = normalize_path(src);
        let dest = normalize_path(dest);
        let mut entries = self.write_entries();

        let entry = entries
            .get(&src)
            .cloned()
            .ok_or_else(|| FsError::not_found(&src))?;

        match entry {
            MemEntry::File(file) => {
                if matches!(entries.get(&dest), Some(MemEntry::Dir(_))) {
                    return Err(FsError::is_directory(dest));
                }
                Self::check_parent(&entries, &dest)?;
                entries.insert(dest, MemEntry::File(MemFile::new(file.content)));
                Ok(())
            }
            MemEntry::Dir(_) => {
                if !recursive {
                    return Err(FsError::is_directory(src));
                }
                if Self::is_within(&dest, &src) {
                    return Err(FsError::invalid_argument(format!(
                        "cannot copy a directory, '{src}', into itself, '{dest}'"
                    )));
                }
                if matches!(entries.get(&dest), Some(MemEntry::File(_))) {
                    return Err(FsError::not_directory(dest));
                }
                Self::check_parent(&entries, &dest)?;

                let copies: Vec<(String, MemEntry)> = Self::subtree_keys(&entries, &src)
                    .into_iter()
                    .filter_map(|key| {
                        let entry = entries.get(&key)?.clone();
                        let target = format!("{dest}{}", &key[src.len()..]);
                        Some((target, entry))
                    })
                    .collect();
                for (target, entry) in copies {
                    entries.insert(target, entry);
                }
                Ok(())
            }
        }
    }

    async fn mv(&self, src: &str, dest: &str) -> FsResult<()> {
        let src = normalize_path(src);
        let dest = normalize_path(dest);
        if src == "/" {
            return Err(FsError::permission_denied(src));
        }
        if src == dest {
            return Ok(());
        }

        let mut entries = self.write_entries();
        let src_is_dir = entries
            .get(&src)
            .ok_or_else(|| FsError::not_found(&src))?
            .is_dir();

        if src_is_dir && Self::is_within(&dest, &src) {
            return Err(FsError::invalid_argument(format!(
                "cannot move '{src}' to a subdirectory of itself, '{dest}'"
            )));
        }
        match entries.get(&dest) {
            Some(MemEntry::Dir(_)) if !src_is_dir => return Err(FsError::is_directory(dest)),
            Some(MemEntry::Dir(_)) if Self::has_children(&entries, &dest) => {
                return Err(FsError::directory_not_empty(dest));
            }
            Some(MemEntry::File(_)) if src_is_dir => return Err(FsError::not_directory(dest)),
            _ => {}
        }
        Self::check_parent(&entries, &dest)?;

        Self::remove_subtree(&mut entries, &dest);
        for key in Self::subtree_keys(&entries, &src) {
            if let Some(entry) = entries.remove(&key) {
                let target = format!("{dest}{}", &key[src.len()..]);
                entries.insert(target, entry);
            }
        }
        Ok(())
    }

    async fn get_all_paths(&self) -> Vec<String> {
        self.read_entries().keys().cloned().collect()
    }
}
