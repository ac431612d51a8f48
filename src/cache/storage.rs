//! Partition storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::snapshot::{CacheKey, Snapshot};
use crate::db::Database;

/// Trait for cache storage backends.
///
/// Each operation is atomic on its own; callers never hold a transaction
/// across several calls.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open(&self, name: &str) -> Result<()>;

  /// Partition names in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  fn has(&self, name: &str) -> Result<bool>;

  /// Delete a partition and all of its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Store a snapshot, replacing any previous entry under the same key.
  fn put(&self, name: &str, key: &CacheKey, snapshot: &Snapshot) -> Result<()>;

  /// Look up a key in a single partition.
  fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<Snapshot>>;

  /// Look up a key across all partitions, oldest partition first.
  fn match_any(&self, key: &CacheKey) -> Result<Option<Snapshot>>;

  /// URLs stored in a partition.
  fn entries(&self, name: &str) -> Result<Vec<String>>;

  /// Version of the currently active worker, if any.
  fn registration(&self) -> Result<Option<String>>;

  fn set_registration(&self, version: &str) -> Result<()>;
}

/// SQLite-based partition storage.
pub struct SqliteStorage {
  db: Mutex<Database>,
}

impl SqliteStorage {
  /// Open the store at the given path, or the default location.
  pub fn open_at(path: Option<&Path>) -> Result<Self> {
    let db = match path {
      Some(p) => Database::open(p)?,
      None => Database::open(&Database::default_path()?)?,
    };

    Ok(Self { db: Mutex::new(db) })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      db: Mutex::new(Database::open_in_memory()?),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Database>> {
    self.db.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const SELECT_SNAPSHOT: &str = "SELECT e.final_url, e.status, e.status_text, e.headers, e.body, e.stored_at
   FROM entries e INNER JOIN partitions p ON p.id = e.partition_id";

/// Raw columns of an entry before decoding.
struct EntryRow {
  url: String,
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
  stored_at: String,
}

impl EntryRow {
  fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      url: row.get(0)?,
      status: row.get(1)?,
      status_text: row.get(2)?,
      headers: row.get(3)?,
      body: row.get(4)?,
      stored_at: row.get(5)?,
    })
  }

  fn decode(self) -> Result<Snapshot> {
    let headers: Vec<(String, String)> = serde_json::from_str(&self.headers)
      .map_err(|e| eyre!("Failed to decode headers for {}: {}", self.url, e))?;
    let stored_at = parse_datetime(&self.stored_at)?;

    Ok(Snapshot {
      url: self.url,
      status: self.status,
      status_text: self.status_text,
      headers,
      body: self.body,
      stored_at,
    })
  }
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let db = self.lock()?;
    db.conn()
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open partition {}: {}", name, e))?;
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let db = self.lock()?;
    let mut stmt = db
      .conn()
      .prepare("SELECT name FROM partitions ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn has(&self, name: &str) -> Result<bool> {
    let db = self.lock()?;
    let found: Option<i64> = db
      .conn()
      .query_row(
        "SELECT id FROM partitions WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up partition {}: {}", name, e))?;

    Ok(found.is_some())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let db = self.lock()?;
    let removed = db
      .conn()
      .execute("DELETE FROM partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", name, e))?;

    Ok(removed > 0)
  }

  fn put(&self, name: &str, key: &CacheKey, snapshot: &Snapshot) -> Result<()> {
    if !key.is_get() {
      return Err(eyre!("Only GET requests can be stored, got {}", key.url()));
    }

    let headers = serde_json::to_string(&snapshot.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let db = self.lock()?;
    let conn = db.conn();

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open partition {}: {}", name, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (partition_id, entry_key, url, final_url, status, status_text, headers, body, stored_at)
         SELECT id, ?, ?, ?, ?, ?, ?, ?, ? FROM partitions WHERE name = ?",
        params![
          key.hash(),
          key.url(),
          snapshot.url,
          snapshot.status,
          snapshot.status_text,
          headers,
          snapshot.body,
          snapshot.stored_at.to_rfc3339(),
          name
        ],
      )
      .map_err(|e| eyre!("Failed to store {} in {}: {}", key.url(), name, e))?;

    Ok(())
  }

  fn match_in(&self, name: &str, key: &CacheKey) -> Result<Option<Snapshot>> {
    if !key.is_get() {
      return Ok(None);
    }

    let db = self.lock()?;
    let row = db
      .conn()
      .query_row(
        &format!("{} WHERE p.name = ? AND e.entry_key = ?", SELECT_SNAPSHOT),
        params![name, key.hash()],
        EntryRow::from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {} in {}: {}", key.url(), name, e))?;

    row.map(EntryRow::decode).transpose()
  }

  fn match_any(&self, key: &CacheKey) -> Result<Option<Snapshot>> {
    if !key.is_get() {
      return Ok(None);
    }

    let db = self.lock()?;
    let row = db
      .conn()
      .query_row(
        &format!(
          "{} WHERE e.entry_key = ? ORDER BY p.id LIMIT 1",
          SELECT_SNAPSHOT
        ),
        params![key.hash()],
        EntryRow::from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", key.url(), e))?;

    row.map(EntryRow::decode).transpose()
  }

  fn entries(&self, name: &str) -> Result<Vec<String>> {
    let db = self.lock()?;
    let mut stmt = db
      .conn()
      .prepare(
        "SELECT e.url FROM entries e INNER JOIN partitions p ON p.id = e.partition_id
         WHERE p.name = ? ORDER BY e.url",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![name], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries of {}: {}", name, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    Ok(urls)
  }

  fn registration(&self) -> Result<Option<String>> {
    let db = self.lock()?;
    db.conn()
      .query_row(
        "SELECT version FROM registration WHERE id = 1",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read registration: {}", e))
  }

  fn set_registration(&self, version: &str) -> Result<()> {
    let db = self.lock()?;
    db.conn()
      .execute(
        "INSERT OR REPLACE INTO registration (id, version, activated_at)
         VALUES (1, ?, datetime('now'))",
        params![version],
      )
      .map_err(|e| eyre!("Failed to store registration: {}", e))?;
    Ok(())
  }
}

/// Parse an RFC 3339 timestamp written by `put`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
