//! neuraface-store: SQLite persistence for enrolled students and attendance.
//!
//! The schema is shared with existing `database.db` files and must not
//! change: embeddings are raw little-endian f32 blobs, dates are
//! `YYYY-MM-DD` text.

mod attendance;
mod schema;
mod students;

pub use attendance::{today, AttendanceRow, STATUS_ABSENT, STATUS_PRESENT};
pub use students::StudentSummary;

use neuraface_core::IndexError;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("student id {0:?} is already registered")]
    DuplicateKey(String),
    #[error("student id {0:?} is not registered")]
    UnknownStudent(String),
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("invalid embedding for student {student_id:?}: {reason}")]
    InvalidEmbedding { student_id: String, reason: String },
    #[error("embedding index: {0}")]
    Index(#[from] IndexError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the attendance database. One owner at a time.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened database");
        Self::init(conn)
    }

    /// A private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self { conn })
    }
}

/// Extended result code of a constraint violation, if that is what `e` is.
fn constraint_violation(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(err.extended_code)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.conn.execute_batch(schema::SCHEMA).unwrap();
        let tables: Vec<String> = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["attendance", "students"]);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let store = Store::open_in_memory().unwrap();
        let on: bool = store.conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert!(on);
    }
}
