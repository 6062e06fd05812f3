//! Audit Store
//!
//! Append-mostly SQLite log of every completed decision. A single
//! connection behind a write lock serializes concurrent appends; records
//! are never updated - status is final before the one `append` call.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{RecordStatus, RequestRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("refusing to persist a pending record (id {0})")]
    PendingStatus(Uuid),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id              TEXT PRIMARY KEY,
    method          TEXT NOT NULL,
    url             TEXT NOT NULL,
    body            TEXT NOT NULL,
    headers         TEXT NOT NULL,
    malicious_prob  REAL NOT NULL,
    malicious       INTEGER NOT NULL,
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
"#;

/// Durable decision log. Safe to share across pipeline workers.
pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    /// Open (creating if needed) the audit database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Append one completed decision. Rejects transient `pending` records.
    pub fn append(&self, record: &RequestRecord) -> Result<(), StoreError> {
        if record.status == RecordStatus::Pending {
            return Err(StoreError::PendingStatus(record.id));
        }

        let headers_json = serde_json::to_string(&record.headers)
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO requests \
             (id, method, url, body, headers, malicious_prob, malicious, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.method,
                record.url,
                record.body,
                headers_json,
                record.malicious_prob,
                record.malicious as i64,
                record.status.as_str(),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    /// Most recent decisions first, up to `limit`.
    pub fn recent(&self, limit: usize) -> Result<Vec<RequestRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, method, url, body, headers, malicious_prob, malicious, status, created_at \
             FROM requests ORDER BY rowid DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, method, url, body, headers, malicious_prob, malicious, status, created_at) =
                row?;

            let id = Uuid::parse_str(&id)
                .map_err(|e| StoreError::CorruptRow(format!("bad id: {}", e)))?;
            let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
                .map_err(|e| StoreError::CorruptRow(format!("bad headers: {}", e)))?;
            let status = RecordStatus::parse(&status)
                .ok_or_else(|| StoreError::CorruptRow(format!("bad status: {}", status)))?;

            records.push(RequestRecord {
                id,
                method,
                url,
                body,
                headers,
                malicious_prob,
                malicious: malicious != 0,
                status,
                created_at,
            });
        }
        Ok(records)
    }

    /// Break the underlying table so appends fail. Test hook only.
    #[cfg(test)]
    pub fn corrupt_for_tests(&self) {
        let conn = self.conn.lock();
        conn.execute_batch("DROP TABLE requests;").unwrap();
    }

    /// Total persisted decisions.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
