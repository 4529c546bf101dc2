use crate::model::Document;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

pub const DB_FILE: &str = "school.sqlite3";
/// Key the whole document lives under.
pub const DOCUMENT_KEY: &str = "ksba_school_data";
/// Key used by the first snapshot of the application; read when the current
/// key has never been written.
pub const LEGACY_DOCUMENT_KEY: &str = "ksba_data";
pub const RECORD_ID_COUNTER: &str = "record_id";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("stored document is not valid JSON: {0}")]
    Deserialize(#[source] serde_json::Error),
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    // Caches written before save timestamps existed lack updated_at.
    ensure_kv_store_updated_at(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS counters(
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn ensure_kv_store_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "kv_store", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE kv_store ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Synchronous store for the whole document under one key.
pub struct LocalCache {
    conn: Connection,
}

impl LocalCache {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(open_db(workspace)?))
    }

    /// Raw stored document, not yet migrated. `Ok(None)` when nothing was
    /// ever saved.
    pub fn load(&self) -> Result<Option<Value>, CacheError> {
        let text = match self.get_raw(DOCUMENT_KEY)? {
            Some(t) => Some(t),
            None => self.get_raw(LEGACY_DOCUMENT_KEY)?,
        };
        let Some(text) = text else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(CacheError::Deserialize)
    }

    pub fn save(&self, doc: &Document) -> Result<(), CacheError> {
        let text = serde_json::to_string(doc).map_err(CacheError::Serialize)?;
        self.put_raw(DOCUMENT_KEY, &text)
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let v = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| {
                r.get::<_, String>(0)
            })
            .optional()?;
        Ok(v)
    }

    pub fn put_raw(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_store(key, value, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, &now),
        )?;
        Ok(())
    }

    pub fn counter(&self, name: &str) -> Result<Option<i64>, CacheError> {
        let v = self
            .conn
            .query_row("SELECT value FROM counters WHERE name = ?", [name], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?;
        Ok(v)
    }

    pub fn set_counter(&self, name: &str, value: i64) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT INTO counters(name, value) VALUES(?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            (name, value),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Announcement;

    fn memory_cache() -> LocalCache {
        let conn = Connection::open_in_memory().expect("open sqlite");
        init_schema(&conn).expect("schema");
        LocalCache::new(conn)
    }

    #[test]
    fn load_is_absent_before_first_save() {
        let cache = memory_cache();
        assert!(cache.load().expect("load").is_none());
    }

    #[test]
    fn saved_document_reads_back_exactly() {
        let cache = memory_cache();
        let doc = Document {
            announcements: vec![Announcement {
                id: 10001,
                title: "Sports Day".into(),
                content: "Feb 14".into(),
                date: "2025-01-02".into(),
                ..Announcement::default()
            }],
            ..Document::default()
        };
        cache.save(&doc).expect("save");
        let raw = cache.load().expect("load").expect("present");
        let back: Document = serde_json::from_value(raw).expect("document");
        assert_eq!(back, doc);
    }

    #[test]
    fn corrupt_bytes_are_a_deserialize_error() {
        let cache = memory_cache();
        cache.put_raw(DOCUMENT_KEY, "{not json").expect("put");
        assert!(matches!(cache.load(), Err(CacheError::Deserialize(_))));
    }

    #[test]
    fn legacy_key_is_read_when_current_key_is_missing() {
        let cache = memory_cache();
        cache
            .put_raw(LEGACY_DOCUMENT_KEY, r#"{"results":[{"id":1,"studentName":"A"}]}"#)
            .expect("put");
        let raw = cache.load().expect("load").expect("present");
        assert_eq!(raw["results"][0]["studentName"], "A");
    }

    #[test]
    fn older_kv_table_gains_updated_at() {
        let conn = Connection::open_in_memory().expect("open sqlite");
        conn.execute(
            "CREATE TABLE kv_store(key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .expect("old table");
        init_schema(&conn).expect("schema");
        assert!(table_has_column(&conn, "kv_store", "updated_at").expect("pragma"));
    }

    #[test]
    fn counters_persist() {
        let cache = memory_cache();
        assert_eq!(cache.counter(RECORD_ID_COUNTER).expect("read"), None);
        cache.set_counter(RECORD_ID_COUNTER, 10005).expect("write");
        cache.set_counter(RECORD_ID_COUNTER, 10006).expect("write");
        assert_eq!(cache.counter(RECORD_ID_COUNTER).expect("read"), Some(10006));
    }
}
