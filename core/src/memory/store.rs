use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::MemoryError;

/// Attempts at inserting a record before giving up on id collisions
const MAX_INSERT_ATTEMPTS: usize = 3;

/// One immutable memory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub id: String,
    pub category: String,
    pub content: String,
    /// ISO-8601 creation time
    pub timestamp: String,
}

impl std::fmt::Display for MemoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.content)
    }
}

/// Append-only record store backed by SQLite.
pub struct MemoryStore {
    conn: Mutex<Connection>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, MemoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MemoryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            sequence: AtomicU64::new(0),
        })
    }

    /// Append a new record under a freshly generated id.
    pub fn create(&self, category: &str, content: &str) -> Result<MemoryRecord, MemoryError> {
        let conn = self.conn.lock();
        let mut last_error = None;

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let now = Utc::now();
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let record = MemoryRecord {
                id: record_id(now, seq, category, content),
                category: category.to_string(),
                content: content.to_string(),
                timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            };

            match conn.execute(
                "INSERT INTO memories (id, category, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, record.category, record.content, record.timestamp],
            ) {
                Ok(_) => {
                    tracing::debug!("Memory record {} created in '{}'", record.id, category);
                    return Ok(record);
                }
                Err(rusqlite::Error::SqliteFailure(e, msg)) if e.code == ErrorCode::ConstraintViolation => {
                    tracing::warn!("Memory id {} collided, regenerating", record.id);
                    last_error = Some(rusqlite::Error::SqliteFailure(e, msg));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error.map_or(MemoryError::IdExhausted, MemoryError::from))
    }

    /// Records whose content contains `term` (case-sensitive), oldest first.
    pub fn search(&self, term: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, category, content, timestamp FROM memories
             WHERE instr(content, ?1) > 0 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![term], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, category, content, timestamp FROM memories WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?)
    }

    pub fn count(&self) -> Result<usize, MemoryError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    Ok(MemoryRecord {
        id: row.get(0)?,
        category: row.get(1)?,
        content: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

/// `<utc timestamp>-<sequence>-<digest>`; the digest covers the content, the
/// category and the full-precision clock, the sequence separates records
/// created within the same clock tick.
pub fn record_id(now: DateTime<Utc>, seq: u64, category: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}-{:06}-{}", now.format("%Y%m%dT%H%M%S%.6fZ"), seq, &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_and_search() {
        let store = MemoryStore::in_memory().unwrap();
        let rust = store.create("notes", "Rust ownership rules").unwrap();
        store.create("notes", "Python indentation").unwrap();

        let hits = store.search("ownership").unwrap();
        assert_eq!(hits, vec![rust.clone()]);
        assert_eq!(store.get(&rust.id).unwrap(), Some(rust));
        assert!(store.search("nothing like this").unwrap().is_empty());
    }

    #[test]
    fn test_search_is_case_sensitive_substring() {
        let store = MemoryStore::in_memory().unwrap();
        store.create("c", "100% done").unwrap();
        assert_eq!(store.search("%").unwrap().len(), 1);
        assert!(store.search("DONE").unwrap().is_empty());
        assert!(store.search("_").unwrap().is_empty());
    }

    #[test]
    fn test_ids_unique_within_same_tick() {
        let now = Utc::now();
        let a = record_id(now, 0, "c", "same content");
        let b = record_id(now, 1, "c", "same content");
        let c = record_id(now, 2, "c", "other content");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(a.starts_with(&now.format("%Y%m%dT%H%M%S").to_string()));
    }

    #[test]
    fn test_many_creates_never_collide() {
        let store = MemoryStore::in_memory().unwrap();
        let ids: HashSet<_> = (0..200)
            .map(|i| store.create("bulk", &format!("entry {}", i % 3)).unwrap().id)
            .collect();
        assert_eq!(ids.len(), 200);
        assert_eq!(store.count().unwrap(), 200);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let id = {
            let store = MemoryStore::open(&path).unwrap();
            store.create("persist", "kept across restarts").unwrap().id
        };
        let store = MemoryStore::open(&path).unwrap();
        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.content, "kept across restarts");
        assert!(record.timestamp.ends_with('Z'));
    }
}
