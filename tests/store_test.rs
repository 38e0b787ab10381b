use std::time::Duration;

use chrono::{TimeDelta, Utc};

use bidline::auth::{StoredToken, TokenSource, TokenStore};
use bidline::config::{
    ChannelConfig, KEY_API_URL, KEY_BASE_DELAY_MS, KEY_MAX_ATTEMPTS, Settings,
};

/// Helper: a database path inside a fresh temp dir.
fn temp_db() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bidline.db");
    (path.to_string_lossy().into_owned(), dir)
}

// ── Shared database ───────────────────────────────────────────────

#[test]
fn settings_and_token_share_one_file() {
    let (db, _dir) = temp_db();
    let settings = Settings::open(&db).unwrap();
    let tokens = TokenStore::open(&db).unwrap();

    settings.set(KEY_API_URL, "http://localhost:8080").unwrap();
    tokens
        .set(&StoredToken {
            token: "jwt-abc".to_string(),
            expires_at: None,
        })
        .unwrap();

    assert_eq!(
        settings.get(KEY_API_URL).unwrap().as_deref(),
        Some("http://localhost:8080")
    );
    assert_eq!(tokens.token().as_deref(), Some("jwt-abc"));
}

#[test]
fn values_survive_reopen() {
    let (db, _dir) = temp_db();
    {
        let settings = Settings::open(&db).unwrap();
        settings.set(KEY_MAX_ATTEMPTS, "3").unwrap();
        let tokens = TokenStore::open(&db).unwrap();
        tokens
            .set(&StoredToken {
                token: "persisted".to_string(),
                expires_at: None,
            })
            .unwrap();
    }

    let settings = Settings::open(&db).unwrap();
    assert_eq!(settings.parse::<u32>(KEY_MAX_ATTEMPTS).unwrap(), Some(3));
    let tokens = TokenStore::open(&db).unwrap();
    assert_eq!(tokens.token().as_deref(), Some("persisted"));
}

// ── Channel config overlay ────────────────────────────────────────

#[test]
fn config_from_empty_settings_is_default() {
    let (db, _dir) = temp_db();
    let settings = Settings::open(&db).unwrap();
    assert_eq!(
        ChannelConfig::from_settings(&settings).unwrap(),
        ChannelConfig::default()
    );
}

#[test]
fn config_overlays_stored_values() {
    let (db, _dir) = temp_db();
    let settings = Settings::open(&db).unwrap();
    settings.set(KEY_MAX_ATTEMPTS, "8").unwrap();
    settings.set(KEY_BASE_DELAY_MS, "250").unwrap();

    let config = ChannelConfig::from_settings(&settings).unwrap();
    assert_eq!(config.max_reconnect_attempts, 8);
    assert_eq!(config.base_delay, Duration::from_millis(250));
    assert_eq!(config.backoff_delay(3), Duration::from_millis(1000));
}

#[test]
fn config_rejects_garbage_naming_the_key() {
    let (db, _dir) = temp_db();
    let settings = Settings::open(&db).unwrap();
    settings.set(KEY_MAX_ATTEMPTS, "plenty").unwrap();

    let err = ChannelConfig::from_settings(&settings).unwrap_err();
    assert!(err.to_string().contains(KEY_MAX_ATTEMPTS));
}

// ── Token expiry ──────────────────────────────────────────────────

#[test]
fn expired_token_reads_as_none() {
    let (db, _dir) = temp_db();
    let tokens = TokenStore::open(&db).unwrap();
    tokens
        .set(&StoredToken {
            token: "stale".to_string(),
            expires_at: Some(Utc::now() - TimeDelta::minutes(5)),
        })
        .unwrap();

    assert!(tokens.token().is_none());
    // Still stored, just not handed out
    assert_eq!(tokens.get().unwrap().unwrap().token, "stale");
}

#[test]
fn clear_removes_token() {
    let (db, _dir) = temp_db();
    let tokens = TokenStore::open(&db).unwrap();
    tokens
        .set(&StoredToken {
            token: "bye".to_string(),
            expires_at: Some(Utc::now() + TimeDelta::hours(1)),
        })
        .unwrap();
    assert!(tokens.token().is_some());

    tokens.clear().unwrap();
    assert!(tokens.get().unwrap().is_none());
}
