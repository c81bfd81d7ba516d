use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Minimal durable key-value interface used by the recents store and the
/// widget projection. No transactions; every `set` replaces the whole value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), String>;
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// Process-local store, used by tests and when no data directory exists.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), String> {
        self.values.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key.
///
/// The widget runs in a separate process and reads the same directory, so
/// writers take an exclusive `fs2` lock on `.store.lock` and readers a
/// shared one. Values are written to a temp file and renamed into place, so
/// a reader never observes a half-written value.
pub struct FileStore {
    root: PathBuf,
}

const LOCK_FILE_NAME: &str = ".store.lock";

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, String> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| format!("Failed to create store directory {:?}: {}", root, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&root, fs::Permissions::from_mode(0o700));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, String> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}.json", key)))
    }

    fn lock_file(&self) -> Result<File, String> {
        let path = self.root.join(LOCK_FILE_NAME);
        fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| format!("Failed to open lock file {:?}: {}", path, e))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let path = self.value_path(key)?;
        let lock = self.lock_file()?;
        lock.lock_shared()
            .map_err(|e| format!("Failed to acquire read lock: {}", e))?;
        let result = match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("Failed to read {:?}: {}", path, e)),
        };
        let _ = lock.unlock();
        result
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), String> {
        let path = self.value_path(key)?;
        let lock = self.lock_file()?;
        lock.lock_exclusive()
            .map_err(|e| format!("Failed to acquire write lock: {}", e))?;
        let result = write_atomic(&path, value);
        let _ = lock.unlock();
        result
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let path = self.value_path(key)?;
        let lock = self.lock_file()?;
        lock.lock_exclusive()
            .map_err(|e| format!("Failed to acquire write lock: {}", e))?;
        let result = match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to remove {:?}: {}", path, e)),
        };
        let _ = lock.unlock();
        result
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<(), String> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(format!("Invalid storage key '{}'", key))
    }
}

/// Write `contents` to `path` via a temp file in the same directory and an
/// atomic rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| format!("Cannot determine parent directory of {:?}", path))?;
    let tmp_path = parent.join(format!(
        ".{}.hackmd-tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "value".to_string())
    ));

    {
        let mut tmp_file = File::create(&tmp_path)
            .map_err(|e| format!("Failed to create temp file {:?}: {}", tmp_path, e))?;
        tmp_file.write_all(contents).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            format!("Failed to write temp file {:?}: {}", tmp_path, e)
        })?;
        tmp_file.sync_all().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            format!("Failed to sync temp file {:?}: {}", tmp_path, e)
        })?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        format!("Failed to rename temp file to {:?}: {}", path, e)
    })
}

/// Default location of the app's private history storage.
pub fn default_history_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("hackmd"))
}

/// Default location of the storage area shared with the widget process.
pub fn default_widget_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("hackmd-widget"))
}

/// Open a file store at `dir`, falling back to memory when the directory is
/// unavailable. Storage is a best-effort cache, so this never fails.
pub fn open_or_memory(dir: Option<PathBuf>) -> Box<dyn KeyValueStore> {
    match dir.map(FileStore::open) {
        Some(Ok(store)) => Box::new(store),
        Some(Err(e)) => {
            log::warn!("{}; keeping data in memory only", e);
            Box::new(MemoryStore::new())
        }
        None => {
            log::warn!("Cannot determine data directory; keeping data in memory only");
            Box::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", b"v1").unwrap();
        store.set("k", b"v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v2".to_vec()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();

        assert_eq!(store.get("note_history").unwrap(), None);
        store.set("note_history", b"[1,2,3]").unwrap();
        assert_eq!(
            store.get("note_history").unwrap(),
            Some(b"[1,2,3]".to_vec())
        );
        assert!(dir.path().join("nested").join("note_history.json").is_file());
    }

    #[test]
    fn file_store_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::open(dir.path()).unwrap().set("a", b"x").unwrap();
        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("a").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn file_store_remove_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.remove("never_written").is_ok());
    }

    #[test]
    fn file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("recent_notes", b"[]").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".hackmd-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.set("../escape", b"x").is_err());
        assert!(store.set("a/b", b"x").is_err());
        assert!(store.set("", b"x").is_err());
        assert!(store.get(".store.lock").is_err());
    }

    #[test]
    fn open_or_memory_without_dir_uses_memory() {
        let store = open_or_memory(None);
        store.set("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
