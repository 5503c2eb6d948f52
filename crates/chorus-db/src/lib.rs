pub mod migrations;
pub mod models;
pub mod notifications;
pub mod queries;
pub mod roster;

use std::path::Path;
use std::sync::Mutex;

use chorus_types::{ChatError, ChatResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Connection;
use tracing::info;

/// SQLite-backed conversation store.
///
/// A single connection behind a mutex serializes writes; that is what gives
/// messages strictly increasing ids and non-decreasing timestamps.
pub struct Database {
    conn: Mutex<Connection>,
    last_stamp: Mutex<DateTime<Utc>>,
}

impl Database {
    pub fn open(path: &Path) -> ChatResult<Self> {
        let conn = Connection::open(path).db()?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL").db()?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> ChatResult<Self> {
        Self::init(Connection::open_in_memory().db()?)
    }

    fn init(conn: Connection) -> ChatResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").db()?;
        migrations::run(&conn)?;

        // Resume the clock where the last run left it so a backwards wall
        // clock can't reorder history across restarts.
        let last: Option<String> = conn
            .query_row("SELECT MAX(created_at) FROM messages", [], |row| row.get(0))
            .db()?;
        let last_stamp = match last {
            Some(s) => parse_timestamp(&s)?,
            None => DateTime::<Utc>::MIN_UTC,
        };

        Ok(Self {
            conn: Mutex::new(conn),
            last_stamp: Mutex::new(last_stamp),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> ChatResult<T>
    where
        F: FnOnce(&Connection) -> ChatResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ChatError::Storage(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Next server timestamp, never earlier than the previous one.
    /// Only call while holding the connection lock.
    fn next_timestamp(&self) -> ChatResult<DateTime<Utc>> {
        let mut last = self
            .last_stamp
            .lock()
            .map_err(|e| ChatError::Storage(format!("clock lock poisoned: {}", e)))?;
        let now = Utc::now().trunc_subsecs(6).max(*last);
        *last = now;
        Ok(now)
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width microsecond RFC 3339 keeps TEXT ordering == time ordering.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> ChatResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ChatError::Storage(format!("corrupt timestamp '{}': {}", s, e)))
}

/// Maps rusqlite results into the shared error taxonomy.
pub(crate) trait DbResultExt<T> {
    fn db(self) -> ChatResult<T>;
    fn optional(self) -> ChatResult<Option<T>>;
}

impl<T> DbResultExt<T> for Result<T, rusqlite::Error> {
    fn db(self) -> ChatResult<T> {
        self.map_err(|e| ChatError::Storage(e.to_string()))
    }

    fn optional(self) -> ChatResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ChatError::Storage(e.to_string())),
        }
    }
}
