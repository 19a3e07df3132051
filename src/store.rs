use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::db;
use crate::error::QueueError;

/// Everything the store persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub queue: Vec<String>,
    pub min_wait: Option<Duration>,
    pub image_mode: Option<bool>,
}

/// Durable home of the queue and its settings.
///
/// Injected into the [`QueueProcessor`](crate::QueueProcessor), which writes
/// through after every mutation.
pub trait QueueStore: Send + Sync {
    /// Load the saved queue and settings.
    fn load(&self) -> Result<StoredState, QueueError>;

    /// Persist the full queue, replacing what was saved.
    fn save_queue(&self, queue: &[String]) -> Result<(), QueueError>;

    /// Persist the settle wait.
    fn save_min_wait(&self, wait: Duration) -> Result<(), QueueError>;

    /// Persist the image queue mode flag.
    fn save_image_mode(&self, enabled: bool) -> Result<(), QueueError>;

    /// Teardown: forget everything.
    fn clear_all(&self) -> Result<(), QueueError>;
}

/// SQLite-backed key-value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store. `None` opens an in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self, QueueError> {
        let conn = db::open_database(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn.lock().map_err(|e| QueueError::Other(e.to_string()))
    }
}

impl QueueStore for SqliteStore {
    fn load(&self) -> Result<StoredState, QueueError> {
        let conn = self.conn()?;

        let queue = match db::get_value(&conn, db::KEY_MESSAGE_QUEUE)? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        let min_wait = db::get_value(&conn, db::KEY_MIN_WAIT_TIME)?
            .as_ref()
            .and_then(Value::as_u64)
            .map(Duration::from_millis);
        let image_mode = db::get_value(&conn, db::KEY_IMAGE_QUEUE_MODE)?
            .as_ref()
            .and_then(Value::as_bool);

        Ok(StoredState {
            queue,
            min_wait,
            image_mode,
        })
    }

    fn save_queue(&self, queue: &[String]) -> Result<(), QueueError> {
        let conn = self.conn()?;
        db::put_value(&conn, db::KEY_MESSAGE_QUEUE, &json!(queue))?;
        Ok(())
    }

    fn save_min_wait(&self, wait: Duration) -> Result<(), QueueError> {
        let conn = self.conn()?;
        db::put_value(&conn, db::KEY_MIN_WAIT_TIME, &json!(wait.as_millis() as u64))?;
        Ok(())
    }

    fn save_image_mode(&self, enabled: bool) -> Result<(), QueueError> {
        let conn = self.conn()?;
        db::put_value(&conn, db::KEY_IMAGE_QUEUE_MODE, &json!(enabled))?;
        Ok(())
    }

    fn clear_all(&self) -> Result<(), QueueError> {
        let conn = self.conn()?;
        let removed = db::delete_all(&conn)?;
        tracing::info!(removed, "cleared persisted queue state");
        Ok(())
    }
}

/// In-process store. Counts queue writes so callers can observe that
/// every mutation was persisted.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoredState>,
    queue_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously saved state.
    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
            queue_writes: AtomicUsize::new(0),
        }
    }

    /// Number of times the queue was written.
    pub fn queue_writes(&self) -> usize {
        self.queue_writes.load(Ordering::SeqCst)
    }

    /// Copy of what is currently persisted.
    pub fn stored(&self) -> StoredState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoredState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl QueueStore for MemoryStore {
    fn load(&self) -> Result<StoredState, QueueError> {
        Ok(self.lock().clone())
    }

    fn save_queue(&self, queue: &[String]) -> Result<(), QueueError> {
        self.lock().queue = queue.to_vec();
        self.queue_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_min_wait(&self, wait: Duration) -> Result<(), QueueError> {
        self.lock().min_wait = Some(wait);
        Ok(())
    }

    fn save_image_mode(&self, enabled: bool) -> Result<(), QueueError> {
        self.lock().image_mode = Some(enabled);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), QueueError> {
        *self.lock() = StoredState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_store_fresh_state() {
        let store = SqliteStore::open(None).unwrap();
        let state = store.load().unwrap();
        assert!(state.queue.is_empty());
        assert!(state.min_wait.is_none());
        assert!(state.image_mode.is_none());
    }

    #[test]
    fn test_sqlite_store_round_trip() {
        let store = SqliteStore::open(None).unwrap();
        store
            .save_queue(&["first".to_string(), "second".to_string()])
            .unwrap();
        store.save_min_wait(Duration::from_millis(4000)).unwrap();
        store.save_image_mode(true).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.queue, vec!["first", "second"]);
        assert_eq!(state.min_wait, Some(Duration::from_millis(4000)));
        assert_eq!(state.image_mode, Some(true));
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("queue.db");
        {
            let store = SqliteStore::open(Some(path.as_path())).unwrap();
            store.save_queue(&["persisted".to_string()]).unwrap();
        }
        let store = SqliteStore::open(Some(path.as_path())).unwrap();
        assert_eq!(store.load().unwrap().queue, vec!["persisted"]);
    }

    #[test]
    fn test_sqlite_store_clear_all() {
        let store = SqliteStore::open(None).unwrap();
        store.save_queue(&["gone".to_string()]).unwrap();
        store.save_image_mode(true).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.load().unwrap(), StoredState::default());
    }

    #[test]
    fn test_memory_store_counts_queue_writes() {
        let store = MemoryStore::new();
        store.save_queue(&["a".to_string()]).unwrap();
        store.save_queue(&[]).unwrap();
        store.save_min_wait(Duration::from_secs(2)).unwrap();
        assert_eq!(store.queue_writes(), 2);
        assert!(store.stored().queue.is_empty());
    }
}
