//! Store: durable home of the [`Cursor`] between cycles.
//!
//! The notifier is the only writer and writes only after a confirmed
//! delivery, so a crash anywhere in a cycle can at worst re-deliver items,
//! never skip them.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;
use crate::types::Cursor;

/// The one key recognised in the cursor file.
pub const CURSOR_KEY: &str = "last_notification_id";

/// Durable storage for a single cursor value.
pub trait CursorStore: Send + Sync {
    /// Read the stored cursor, or [`Cursor::default`] when nothing was stored yet.
    fn load(&self) -> Result<Cursor, StorageError>;

    /// Replace the stored cursor.
    fn save(&self, cursor: &Cursor) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// FileCursorStore
// ---------------------------------------------------------------------------

/// Cursor persisted as a small JSON object, `{"last_notification_id": "..."}`.
///
/// The whole file is rewritten on every save through a sibling temp file and a
/// rename, so a reader never observes a half-written object.
///
/// `save(load())` never changes what `load` returns. On disk, saving the
/// initial cursor while no file exists writes nothing, and a legacy numeric id
/// is rewritten in string form.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<Cursor, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Cursor::default()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state: Map<String, Value> =
            serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        // Older state files may carry the id as a bare number.
        Ok(match state.get(CURSOR_KEY) {
            Some(Value::String(id)) if !id.is_empty() => Cursor::new(id.clone()),
            Some(Value::Number(id)) => Cursor::new(id.to_string()),
            _ => Cursor::default(),
        })
    }

    fn save(&self, cursor: &Cursor) -> Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };

        if *cursor == Cursor::default() && !self.path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut state = Map::new();
        state.insert(CURSOR_KEY.to_string(), Value::String(cursor.to_string()));
        let body = Value::Object(state).to_string();
        let tmp = self.temp_path();
        std::fs::write(&tmp, body).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

// ---------------------------------------------------------------------------
// MemoryCursorStore
// ---------------------------------------------------------------------------

/// In-process store, used by `--once` dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    cursor: Option<Cursor>,
    saves: usize,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            inner: Mutex::new(MemoryState {
                cursor: Some(cursor),
                saves: 0,
            }),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-save;
        // the scalar inside is still coherent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<Cursor, StorageError> {
        Ok(self.lock().cursor.clone().unwrap_or_default())
    }

    fn save(&self, cursor: &Cursor) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.cursor = Some(cursor.clone());
        state.saves += 1;
        Ok(())
    }
}

impl<T: CursorStore + ?Sized> CursorStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Cursor, StorageError> {
        (**self).load()
    }

    fn save(&self, cursor: &Cursor) -> Result<(), StorageError> {
        (**self).save(cursor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_loads_initial_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), Cursor::default());
    }

    #[test]
    fn save_then_load_returns_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("nested/state.json"));
        store.save(&Cursor::new("103")).unwrap();
        assert_eq!(store.load().unwrap(), Cursor::new("103"));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn resaving_the_loaded_cursor_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileCursorStore::new(&path);
        store.save(&Cursor::new("109876543210987654")).unwrap();
        let before = std::fs::read(&path).unwrap();

        store.save(&store.load().unwrap()).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn resaving_the_initial_cursor_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileCursorStore::new(&path);

        store.save(&store.load().unwrap()).unwrap();

        assert!(!path.exists());
        assert_eq!(store.load().unwrap(), Cursor::default());
    }

    #[test]
    fn resaving_a_legacy_numeric_cursor_keeps_its_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"last_notification_id": 42}"#).unwrap();
        let store = FileCursorStore::new(&path);

        store.save(&store.load().unwrap()).unwrap();

        assert_eq!(store.load().unwrap(), Cursor::new("42"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"last_notification_id":"42"}"#
        );
    }

    #[test]
    fn numeric_and_missing_keys_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileCursorStore::new(&path);

        std::fs::write(&path, r#"{"last_notification_id": 42}"#).unwrap();
        assert_eq!(store.load().unwrap(), Cursor::new("42"));

        std::fs::write(&path, r#"{"something_else": "x"}"#).unwrap();
        assert_eq!(store.load().unwrap(), Cursor::default());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let err = FileCursorStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }), "{err}");
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryCursorStore::with_cursor(Cursor::new("5"));
        assert_eq!(store.load().unwrap(), Cursor::new("5"));
        store.save(&Cursor::new("6")).unwrap();
        assert_eq!(store.load().unwrap(), Cursor::new("6"));
        assert_eq!(store.saves(), 1);
    }
}
