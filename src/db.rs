use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::types::{DocumentRecord, DocumentState};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger lock poisoned")]
    Poisoned,

    #[error("Unknown state '{0}' in ledger")]
    UnknownState(String),
}

/// One recorded state transition.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub created_at: String,
    pub document: String,
    pub source_url: String,
    pub report_name: String,
    pub state: DocumentState,
    pub error_message: Option<String>,
}

/// Append-only SQLite history of document state transitions.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                document TEXT NOT NULL,
                source_url TEXT NOT NULL,
                report_name TEXT NOT NULL,
                state TEXT NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_history_document ON history(document);
            ",
        )?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    /// Append the record's current state.
    pub fn record(&self, record: &DocumentRecord) -> Result<i64, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        conn.execute(
            "INSERT INTO history (created_at, document, source_url, report_name, state, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                created_at,
                record.name,
                record.source_url,
                record.report_name,
                record.state.as_str(),
                record.error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All transitions for one document, oldest first.
    pub fn history_for(&self, document: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query(
            "SELECT id, created_at, document, source_url, report_name, state, error_message
             FROM history WHERE document = ?1 ORDER BY id ASC",
            params![document],
        )
    }

    /// Most recent transitions across all documents, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query(
            "SELECT id, created_at, document, source_url, report_name, state, error_message
             FROM history ORDER BY id DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Documents whose latest recorded state is Failed, newest first.
    pub fn latest_failures(&self, limit: u32) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query(
            "SELECT h.id, h.created_at, h.document, h.source_url, h.report_name, h.state, h.error_message
             FROM history h
             WHERE h.id = (SELECT MAX(id) FROM history WHERE document = h.document)
               AND h.state = 'failed'
             ORDER BY h.id DESC LIMIT ?1",
            params![limit],
        )
    }

    fn query(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, created_at, document, source_url, report_name, state, error_message) = row?;
            let state = DocumentState::parse(&state).ok_or(LedgerError::UnknownState(state))?;
            out.push(LedgerEntry {
                id,
                created_at,
                document,
                source_url,
                report_name,
                state,
                error_message,
            });
        }
        Ok(out)
    }
}
