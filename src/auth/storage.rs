use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use super::TokenSource;

/// The session token as persisted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Keeps the session token in SQLite.
///
/// Shares a database with [`Settings`](crate::config::Settings); pass the
/// same path to both.
pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    /// Open or create the token table in the given database path.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open token database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_token (
                id   INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL
            )",
        )
        .context("failed to create session_token table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The stored token, expired or not.
    pub fn get(&self) -> Result<Option<StoredToken>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT data FROM session_token WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let token = serde_json::from_str(&json).context("corrupt stored token")?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Store the token (replaces any previous one).
    pub fn set(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string(token)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO session_token (id, data) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            [&json],
        )?;
        Ok(())
    }

    /// Forget the token.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM session_token", [])?;
        Ok(())
    }
}

impl TokenSource for TokenStore {
    fn token(&self) -> Option<String> {
        match self.get() {
            Ok(Some(stored)) if !stored.is_expired(Utc::now()) => Some(stored.token),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to read session token");
                None
            }
        }
    }
}
