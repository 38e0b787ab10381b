//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Reconnect attempts before the channel gives up and waits for a manual retry.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before the first reconnect attempt. Doubles on every further attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// How long the simulated transport takes to open.
pub const SIMULATED_CONNECT_DELAY: Duration = Duration::from_millis(500);

/// Timeout for a single auction state request.
pub const STATE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Initial simulated viewer count is drawn from this closed range.
pub const VIEWER_SEED_MIN: u32 = 5;
pub const VIEWER_SEED_MAX: u32 = 24;

/// Viewer count the simulated API reports for a room with no presence.
pub const VIEWER_FALLBACK: u32 = 5;

/// Simulated viewer counts never leave this closed range.
pub const VIEWER_FLOOR: u32 = 1;
pub const VIEWER_CEILING: u32 = 50;

/// Per-auction tick period is drawn once from `[MIN, MAX)` milliseconds.
pub const VIEWER_PERIOD_MIN_MS: u64 = 5000;
pub const VIEWER_PERIOD_MAX_MS: u64 = 10000;

/// Bidder name carried by the synthesized post-reconnect price correction.
pub const RECONNECT_SYNC_BIDDER: &str = "Reconnect Sync";

/// Bidder names used by simulated bids.
pub const SIMULATED_BIDDERS: [&str; 4] = ["John D.", "Sarah M.", "Mike R.", "Emma L."];

/// Connection-state error text when connecting while the network is down.
pub const NETWORK_OFFLINE_ERROR: &str = "Network offline";

/// Connection-state error text once automatic reconnects are exhausted.
pub const MAX_ATTEMPTS_ERROR: &str = "Max reconnect attempts reached";

/// Capacity of the event bus broadcast tap.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Default database path: `~/.bidline/bidline.db`.
/// Single DB for settings and the session token.
pub fn default_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".bidline").join("bidline.db"))
}

/// Format an amount with a currency sign and comma separators (e.g. $1,234,567).
pub fn format_amount(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3 + 1);
    result.push('$');
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
