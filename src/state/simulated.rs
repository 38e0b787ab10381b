use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rand::RngExt;
use tracing::debug;

use super::{AuctionState, AuctionStatus, StateFetcher};
use crate::consts::VIEWER_FALLBACK;
use crate::presence::PresenceSource;

/// Stand-in for the auction API: an active auction around $6,500 that ends
/// in an hour.
///
/// The viewer count is whatever the presence simulator currently shows for
/// the room, or [`VIEWER_FALLBACK`] when it shows nothing.
#[derive(Default, Clone)]
pub struct SimulatedStateFetcher {
    presence: Option<Arc<dyn PresenceSource>>,
}

impl SimulatedStateFetcher {
    pub fn new(presence: Option<Arc<dyn PresenceSource>>) -> Self {
        Self { presence }
    }
}

#[async_trait]
impl StateFetcher for SimulatedStateFetcher {
    async fn fetch(&self, auction_id: &str) -> Result<AuctionState> {
        debug!(auction_id, "simulating state fetch");
        let viewer_count = self
            .presence
            .as_ref()
            .and_then(|presence| presence.count(auction_id))
            .unwrap_or(VIEWER_FALLBACK);
        let mut rng = rand::rng();
        Ok(AuctionState {
            auction_id: auction_id.to_string(),
            current_price: 6500 + rng.random_range(0..1000),
            bid_count: 12 + rng.random_range(0..5),
            viewer_count,
            status: AuctionStatus::Active,
            ends_at: Utc::now() + TimeDelta::hours(1),
        })
    }
}
