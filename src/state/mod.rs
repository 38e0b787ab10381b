//! Authoritative auction state, pulled from the server during reconciliation.

pub mod http;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    #[serde(alias = "ACTIVE")]
    Active,
    #[serde(alias = "SOLD")]
    Sold,
    #[serde(alias = "EXPIRED")]
    Expired,
}

/// Snapshot of one auction as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionState {
    pub auction_id: String,
    pub current_price: u64,
    pub bid_count: u32,
    pub viewer_count: u32,
    pub status: AuctionStatus,
    pub ends_at: DateTime<Utc>,
}

/// Where authoritative state comes from. Only consulted after a (re)connect.
#[async_trait]
pub trait StateFetcher: Send + Sync {
    async fn fetch(&self, auction_id: &str) -> Result<AuctionState>;
}
