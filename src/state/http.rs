//! Auction state over the REST API.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{AuctionState, AuctionStatus, StateFetcher};
use crate::auth::TokenSource;
use crate::consts::STATE_REQUEST_TIMEOUT;

/// Fetches `GET {base_url}/auctions/{id}`, sending the bearer token when one
/// is available.
pub struct HttpStateFetcher {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpStateFetcher {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(STATE_REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn auction_url(&self, auction_id: &str) -> String {
        format!("{}/auctions/{}", self.base_url, auction_id)
    }
}

#[async_trait]
impl StateFetcher for HttpStateFetcher {
    async fn fetch(&self, auction_id: &str) -> Result<AuctionState> {
        let url = self.auction_url(auction_id);
        debug!(%url, "fetching auction state");

        let mut req = self.client.get(&url);
        if let Some(token) = self.tokens.token() {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("state fetch for {auction_id} failed ({status}): {text}");
        }

        let dto: AuctionDto = resp
            .json()
            .await
            .with_context(|| format!("invalid auction payload for {auction_id}"))?;
        Ok(dto.into_state())
    }
}

/// The backend's auction entity, reduced to what reconciliation needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuctionDto {
    id: String,
    #[serde(default)]
    current_price: Option<u64>,
    starting_price: u64,
    #[serde(default)]
    bids: Vec<serde_json::Value>,
    #[serde(default)]
    viewer_count: u32,
    #[serde(default)]
    status: Option<AuctionStatus>,
    ends_at: DateTime<Utc>,
}

impl AuctionDto {
    fn into_state(self) -> AuctionState {
        // An auction without bids reports no (or a zero) current price.
        let current_price = self
            .current_price
            .filter(|p| *p > 0)
            .unwrap_or(self.starting_price);
        AuctionState {
            auction_id: self.id,
            current_price,
            bid_count: u32::try_from(self.bids.len()).unwrap_or(u32::MAX),
            viewer_count: self.viewer_count,
            status: self.status.unwrap_or(AuctionStatus::Active),
            ends_at: self.ends_at,
        }
    }
}
