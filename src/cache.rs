//! Local cache store
//!
//! SQLite-backed key/value store holding the last-known-good snapshot of each
//! synced collection, the local identity, and the "already notified" flags.
//! Collections are only ever written whole; there is no partial update path.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{CanonicalId, LocalIdentity};

const IDENTITY_KEY: &str = "identity";

pub struct CacheStore {
    db: Connection,
}

impl CacheStore {
    /// Open or create the cache database inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("cache.db");
        let db = Connection::open(&db_path)?;

        // Enable WAL mode for concurrent read access
        db.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self::init(db)?;
        info!(path = %db_path.display(), "Cache store opened");
        Ok(store)
    }

    /// Non-persistent store, used by tests and one-shot CLI commands.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );
            CREATE TABLE IF NOT EXISTS notified (
                request_id TEXT PRIMARY KEY,
                notified_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )?;
        Ok(Self { db })
    }

    /// Read a snapshot. A row that no longer decodes is treated as absent.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .db
            .query_row("SELECT value FROM snapshots WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Replace a snapshot as a whole.
    pub fn replace<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.db.execute(
            "INSERT INTO snapshots (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
            params![key, raw],
        )?;
        debug!(key, bytes = raw.len(), "Cache snapshot replaced");
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.db.execute("DELETE FROM snapshots WHERE key = ?1", [key])?;
        Ok(())
    }

    pub fn load_identity(&self) -> Result<Option<LocalIdentity>> {
        self.load(IDENTITY_KEY)
    }

    pub fn store_identity(&self, identity: &LocalIdentity) -> Result<()> {
        self.replace(IDENTITY_KEY, identity)
    }

    pub fn is_notified(&self, request_id: &CanonicalId) -> Result<bool> {
        let hit: Option<i64> = self
            .db
            .query_row(
                "SELECT 1 FROM notified WHERE request_id = ?1",
                [request_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Record that a notice for this request was shown. Returns false if it already was.
    pub fn mark_notified(&self, request_id: &CanonicalId) -> Result<bool> {
        let inserted = self.db.execute(
            "INSERT OR IGNORE INTO notified (request_id) VALUES (?1)",
            [request_id.as_str()],
        )?;
        Ok(inserted > 0)
    }

    pub fn notified_ids(&self) -> Result<HashSet<CanonicalId>> {
        let mut stmt = self.db.prepare_cached("SELECT request_id FROM notified")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(CanonicalId::new).collect())
    }
}
