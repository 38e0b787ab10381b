//! Startup banner and farewell.

use crate::consts::{AUTHOR, HOMEPAGE, REPO};

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub network: &'a str,
    pub api: &'a str,
    pub auth_status: &'a str,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub db: &'a str,
}

pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║            B I D L I N E              ║
   ║      live auctions, over the wire     ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   network   {}
   api       {}
   auth      {}
   backoff   {} attempts from {} ms
   db        {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.network,
        info.api,
        info.auth_status,
        info.max_attempts,
        info.base_delay_ms,
        info.db,
    );
}

/// Print the session summary and farewell.
pub fn print_session_summary(events: u64) {
    if events > 0 {
        println!("session: {events} events received");
    }
    println!("goodbye.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_banner_does_not_panic() {
        print_banner(&BannerInfo {
            network: "online",
            api: "simulated",
            auth_status: "none",
            max_attempts: 5,
            base_delay_ms: 1000,
            db: "ephemeral",
        });
    }

    #[test]
    fn print_session_summary_does_not_panic() {
        print_session_summary(0);
        print_session_summary(42);
    }
}
