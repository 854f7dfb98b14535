//! Key-value persistence.
//!
//! Everything the engine must remember across restarts -- the weekly
//! schedule, the app selection, pending records, the blocking state --
//! goes through the [`Store`] trait as JSON values under well-known keys.
//! The store is shared between the main process and any wake-triggered
//! execution context, so writes must be durable before they are reported
//! applied.

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;

/// Well-known storage keys.
pub mod keys {
    /// Weekly schedule (weekday -> goal container).
    pub const WEEKLY_SCHEDULE: &str = "weekly_schedule";
    /// Pre-weekly single goal container, kept in sync for old readers.
    pub const LEGACY_CONTAINER: &str = "goal_container";
    /// Current app selection covered by the shield.
    pub const APP_SELECTION: &str = "app_selection";
    /// Pending app-selection changes, weekday -> record.
    pub const PENDING_SELECTIONS: &str = "pending_selections";
    /// Blocking state (is_blocked + last evaluated ordinal day).
    pub const BLOCKING_STATE: &str = "blocking_state";
}

/// Raw string-keyed persistence. Object-safe; typed access goes through
/// [`StoreExt`].
pub trait Store: Send + Sync {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed JSON accessors over any [`Store`].
pub trait StoreExt: Store {
    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.load_raw(key)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.save_raw(key, &raw)
    }

    /// Load a value, falling back to its default when the key is absent
    /// or the stored bytes are malformed. Malformation is logged, not
    /// propagated -- a corrupt schedule must not brick the gate.
    fn load_json_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.load_json(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(err) => {
                tracing::warn!(key, error = %err, "malformed stored value, using default");
                T::default()
            }
        }
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// SQLite-backed store: one `kv` table, JSON values.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and migrate) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    const SCHEMA_VERSION: i32 = 1;

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < Self::SCHEMA_VERSION {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key        TEXT PRIMARY KEY,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
                );
                PRAGMA user_version = 1;",
            )?;
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        conn.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ','now'))
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory store for tests, with a switch to make writes fail.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, String>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save/delete fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().expect("store lock").fail_writes = fail;
    }
}

impl Store for MemoryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .expect("store lock")
            .values
            .get(key)
            .cloned())
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("store lock");
        if state.fail_writes {
            return Err(StoreError::QueryFailed("write disabled".into()));
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("store lock");
        if state.fail_writes {
            return Err(StoreError::QueryFailed("write disabled".into()));
        }
        state.values.remove(key);
        Ok(())
    }
}
