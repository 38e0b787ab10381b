//! Channel configuration.
//!
//! [`ChannelConfig`] and [`PresenceConfig`] carry the tunables with sensible
//! defaults. [`Settings`] is a key-value store backed by SQLite that can
//! override them between runs; it shares a database with
//! [`TokenStore`](crate::auth::TokenStore); pass the same path to both.

use std::ops::{Range, RangeInclusive};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use crate::consts::{
    MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY, VIEWER_CEILING, VIEWER_FLOOR,
    VIEWER_PERIOD_MAX_MS, VIEWER_PERIOD_MIN_MS, VIEWER_SEED_MAX, VIEWER_SEED_MIN,
};

pub const KEY_MAX_ATTEMPTS: &str = "reconnect.max_attempts";
pub const KEY_BASE_DELAY_MS: &str = "reconnect.base_delay_ms";
pub const KEY_API_URL: &str = "api.url";

/// Reconnect policy for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: RECONNECT_BASE_DELAY,
        }
    }
}

impl ChannelConfig {
    /// Wait before the given 1-based attempt: `base * 2^(attempt - 1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Defaults overlaid with whatever the settings store holds.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut config = Self::default();
        if let Some(max) = settings.parse::<u32>(KEY_MAX_ATTEMPTS)? {
            config.max_reconnect_attempts = max;
        }
        if let Some(ms) = settings.parse::<u64>(KEY_BASE_DELAY_MS)? {
            if ms == 0 {
                bail!("{KEY_BASE_DELAY_MS} must be positive");
            }
            config.base_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

/// Shape of the simulated viewer counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Initial count is drawn uniformly from here.
    pub seed: RangeInclusive<u32>,
    /// Tick period in milliseconds, drawn once per auction.
    pub period_ms: Range<u64>,
    /// Counts are clamped to `[floor, ceiling]`.
    pub floor: u32,
    pub ceiling: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            seed: VIEWER_SEED_MIN..=VIEWER_SEED_MAX,
            period_ms: VIEWER_PERIOD_MIN_MS..VIEWER_PERIOD_MAX_MS,
            floor: VIEWER_FLOOR,
            ceiling: VIEWER_CEILING,
        }
    }
}

/// Persistent key-value settings store.
pub struct Settings {
    conn: Mutex<Connection>,
}

impl Settings {
    /// Open or create the settings table in the given database.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open settings database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .context("failed to create settings table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get a setting by key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Get a setting and parse it, naming the key on failure.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(key)?
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .with_context(|| format!("invalid value for {key}: {raw:?}"))
            })
            .transpose()
    }

    /// Set a setting (upsert).
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Remove a setting.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}
