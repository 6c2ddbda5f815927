//! Offline cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

/// One cached response body with its stored-at stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

/// Storage for named cache sets.
///
/// Sets come into existence on first write; there is exactly one entry per
/// request identity per set, last write wins.
pub trait OfflineStore: Send + Sync {
  /// Store a response under (set, identity), replacing any existing entry.
  fn put(&self, set: &str, identity: &str, response: &StoredResponse) -> Result<()>;

  /// Look up a cached response.
  fn lookup(&self, set: &str, identity: &str) -> Result<Option<StoredResponse>>;

  /// Remove one entry.
  fn delete(&self, set: &str, identity: &str) -> Result<()>;

  /// Names of all cache sets that currently hold at least one entry.
  fn set_names(&self) -> Result<Vec<String>>;

  /// Drop an entire cache set.
  fn delete_set(&self, set: &str) -> Result<()>;

  /// Number of entries in a set.
  fn count(&self, set: &str) -> Result<usize>;
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryOfflineStore {
  entries: Mutex<HashMap<(String, String), StoredResponse>>,
}

impl MemoryOfflineStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OfflineStore for MemoryOfflineStore {
  fn put(&self, set: &str, identity: &str, response: &StoredResponse) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert((set.to_string(), identity.to_string()), response.clone());
    Ok(())
  }

  fn lookup(&self, set: &str, identity: &str) -> Result<Option<StoredResponse>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(&(set.to_string(), identity.to_string())).cloned())
  }

  fn delete(&self, set: &str, identity: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(&(set.to_string(), identity.to_string()));
    Ok(())
  }

  fn set_names(&self) -> Result<Vec<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut names: Vec<String> = entries.keys().map(|(set, _)| set.clone()).collect();
    names.sort();
    names.dedup();
    Ok(names)
  }

  fn delete_set(&self, set: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.retain(|(s, _), _| s != set);
    Ok(())
  }

  fn count(&self, set: &str) -> Result<usize> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.keys().filter(|(s, _)| s == set).count())
  }
}

/// SQLite-backed offline cache.
pub struct SqliteOfflineStore {
  conn: Mutex<Connection>,
}

impl SqliteOfflineStore {
  /// Create a new SQLite offline cache at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open offline cache at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("vjx").join("offline.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(OFFLINE_SCHEMA)
      .map_err(|e| eyre!("Failed to run offline cache migrations: {}", e))?;

    Ok(())
  }
}

const OFFLINE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS offline_cache (
    cache_set TEXT NOT NULL,
    identity TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (cache_set, identity)
);

CREATE INDEX IF NOT EXISTS idx_offline_cache_set ON offline_cache(cache_set);
"#;

impl OfflineStore for SqliteOfflineStore {
  fn put(&self, set: &str, identity: &str, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO offline_cache (cache_set, identity, status, content_type, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          set,
          identity,
          response.status,
          response.content_type,
          response.body,
          response.stored_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn lookup(&self, set: &str, identity: &str) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, content_type, body, stored_at FROM offline_cache
         WHERE cache_set = ? AND identity = ?",
        params![set, identity],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    match row {
      Some((status, content_type, body, stored_at)) => {
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
          .map_err(|e| eyre!("Failed to parse stored_at '{}': {}", stored_at, e))?
          .with_timezone(&Utc);
        Ok(Some(StoredResponse {
          status,
          content_type,
          body,
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, set: &str, identity: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM offline_cache WHERE cache_set = ? AND identity = ?",
        params![set, identity],
      )
      .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;

    Ok(())
  }

  fn set_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_set FROM offline_cache ORDER BY cache_set")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache sets: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_set(&self, set: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM offline_cache WHERE cache_set = ?", params![set])
      .map_err(|e| eyre!("Failed to delete cache set {}: {}", set, e))?;

    Ok(())
  }

  fn count(&self, set: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM offline_cache WHERE cache_set = ?",
        params![set],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count cache set {}: {}", set, e))?;

    Ok(count as usize)
  }
}
