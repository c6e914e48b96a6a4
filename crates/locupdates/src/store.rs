//! Persistent key-value settings.
//!
//! The controller only needs one durable flag, but the store is a small
//! generic boolean table so hosts can reuse it for their own settings.

use crate::error::HostError;
use anyhow::Context;
use std::{path::Path, sync::Mutex};

/// Key of the persisted "is reporting active" flag.
pub const KEY_REQUESTING_LOCATION_UPDATES: &str = "requesting_location_updates";

/// Synchronous, durable boolean storage.
///
/// Implemented in Rust by [`SqliteStore`], or by the host (e.g. over
/// SharedPreferences).
#[uniffi::export(with_foreign)]
pub trait KeyValueStore: Send + Sync {
    fn get_bool(&self, key: String, default: bool) -> bool;

    fn set_bool(&self, key: String, value: bool) -> Result<(), HostError>;
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_file(path: &Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        Self::init_from_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        log::warn!("store: using in-memory store, state will not survive restarts");
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init_from_connection(conn)
    }

    fn init_from_connection(conn: rusqlite::Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS prefs (
                key TEXT PRIMARY KEY NOT NULL,
                value INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn read_bool(&self, key: &str) -> anyhow::Result<Option<bool>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        let mut stmt = conn
            .prepare_cached("SELECT value FROM prefs WHERE key = ?")
            .context("failed to prepare statement")?;

        let mut rows = stmt.query([key]).context("failed to query prefs")?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get::<_, i64>(0)? != 0)),
            None => Ok(None),
        }
    }

    pub fn write_bool(&self, key: &str, value: bool) -> anyhow::Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        conn.execute(
            "INSERT INTO prefs (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value as i64),
        )
        .context("failed to write pref")?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get_bool(&self, key: String, default: bool) -> bool {
        match self.read_bool(&key) {
            Ok(value) => value.unwrap_or(default),
            Err(e) => {
                log::error!("store: failed to read {key}, using default {default}: {e:#}");
                default
            }
        }
    }

    fn set_bool(&self, key: String, value: bool) -> Result<(), HostError> {
        self.write_bool(&key, value).map_err(|e| HostError::Failed {
            message: format!("{e:#}"),
        })
    }
}
