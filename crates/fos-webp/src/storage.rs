//! Origin-Scoped Key-Value Storage
//!
//! The localStorage-style backing store for persisted capability results.
//! [`MemoryStorage`] lives for the process; [`FileStorage`] keeps one JSON
//! file per origin inside a profile directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tempfile::NamedTempFile;
use url::Url;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt storage file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}

/// localStorage-style string store
pub trait KeyValueStorage: Send + Sync {
    /// Get an item
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Set an item
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove an item
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Normalize an origin string (`https://example.com/path` -> `https://example.com`)
pub fn normalize_origin(origin: &str) -> Result<String, StorageError> {
    let url = Url::parse(origin).map_err(|e| StorageError::InvalidOrigin(format!("{origin}: {e}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(StorageError::InvalidOrigin(format!("{url} has an opaque origin")));
    }
    Ok(origin.ascii_serialization())
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `set_item` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// On-disk storage for one origin
///
/// Items live in `<profile>/local-storage/<origin>.json`. Every write
/// replaces the file through a uniquely named temporary file and a rename.
/// Instances opened on the same file within one process share a lock, so
/// their read-modify-write updates never interleave. Separate processes
/// sharing a profile are not coordinated.
#[derive(Debug)]
pub struct FileStorage {
    origin: String,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

/// Process-wide lock for one storage file
fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.entry(path.to_path_buf()).or_default().clone()
}

impl FileStorage {
    /// Open the storage of `origin` inside `profile_dir`
    pub fn open(profile_dir: impl AsRef<Path>, origin: &str) -> Result<Self, StorageError> {
        let origin = normalize_origin(origin)?;
        let dir = profile_dir.as_ref().join("local-storage");
        fs::create_dir_all(&dir)?;

        // Canonical so that every spelling of the profile maps to one lock
        let path = fs::canonicalize(&dir)?.join(format!("{}.json", file_stem(&origin)));
        tracing::debug!("Opened local storage for {} at {}", origin, path.display());

        Ok(Self {
            origin,
            lock: file_lock(&path),
            path,
        })
    }

    /// Normalized origin
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_items(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(items).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_items()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.read_items()?;
        items.insert(key.to_string(), value.to_string());
        self.write_items(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.read_items()?;
        if items.remove(key).is_some() {
            self.write_items(&items)?;
        }
        Ok(())
    }
}

/// `https://example.com:8443` -> `https_example.com_8443`
fn file_stem(origin: &str) -> String {
    origin
        .replace("://", "_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_origin() {
        assert_eq!(normalize_origin("https://example.com/a/b?c").unwrap(), "https://example.com");
        assert_eq!(normalize_origin("http://localhost:8080/").unwrap(), "http://localhost:8080");
        assert!(normalize_origin("not a url").is_err());
        assert!(normalize_origin("data:text/plain,hi").is_err());
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set_item("key", "value").unwrap();

        assert_eq!(storage.get_item("key").unwrap(), Some("value".to_string()));
        assert_eq!(storage.write_count(), 1);

        storage.remove_item("key").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), "https://example.com").unwrap();
        storage.set_item("key", "value").unwrap();

        let reopened = FileStorage::open(dir.path(), "https://example.com/page").unwrap();
        assert_eq!(reopened.get_item("key").unwrap(), Some("value".to_string()));
        assert!(reopened.path().ends_with("local-storage/https_example.com.json"));
    }

    #[test]
    fn test_file_storage_origin_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileStorage::open(dir.path(), "https://a.example").unwrap();
        let b = FileStorage::open(dir.path(), "https://b.example").unwrap();

        a.set_item("key", "a").unwrap();
        assert_eq!(b.get_item("key").unwrap(), None);
    }

    #[test]
    fn test_file_storage_shared_file_keeps_all_writes() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(FileStorage::open(dir.path(), "https://example.com").unwrap());
        let b = Arc::new(FileStorage::open(dir.path().join("."), "https://example.com/other").unwrap());

        let writers: Vec<_> = [("a", a.clone()), ("b", b.clone())]
            .into_iter()
            .map(|(name, storage)| {
                std::thread::spawn(move || {
                    for i in 0..25 {
                        storage.set_item(&format!("{name}{i}"), "1").unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        for i in 0..25 {
            assert_eq!(a.get_item(&format!("a{i}")).unwrap().as_deref(), Some("1"));
            assert_eq!(b.get_item(&format!("b{i}")).unwrap().as_deref(), Some("1"));
        }
        let leftovers = fs::read_dir(a.path().parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_file_storage_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), "https://example.com").unwrap();
        fs::write(storage.path(), "{ not json").unwrap();

        assert!(matches!(storage.get_item("key"), Err(StorageError::Corrupt { .. })));
    }
}
