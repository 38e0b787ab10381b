//! Post-connect reconciliation.
//!
//! Ordering guarantee per (re)connect: the `connected` status first, then
//! for each desired room one reconciliation `NewBid` carrying the fetched
//! price, then that room's presence restarts (its first viewer count). A
//! listener never sees a resumed viewer count ahead of the corrected price.

use tracing::{debug, info, warn};

use super::Channel;
use crate::events::{Event, NewBid};
use crate::transport::ConnectionId;

/// Outcome of trying to bring one room live during a pass.
enum Establish {
    TornDown,
    NotDesired,
    Live { conn: ConnectionId, newly: bool },
}

impl Channel {
    /// Bring every desired room live on a fresh connection and republish
    /// its authoritative price.
    ///
    /// The channel keeps no replay log, so events missed while offline are
    /// gone; a full price replace per room is the only correction. Rooms
    /// left before or during the pass get neither a fetch nor an event.
    pub(super) async fn reconcile(&self, epoch: u64) {
        let rooms = self.rooms().desired();
        if rooms.is_empty() {
            return;
        }
        info!(rooms = rooms.len(), "reconciling subscriptions");

        for auction_id in rooms {
            let (conn, newly_live) = match self.establish(&auction_id, epoch) {
                Establish::TornDown => {
                    debug!("teardown during reconciliation");
                    return;
                }
                Establish::NotDesired => continue,
                Establish::Live { conn, newly } => (conn, newly),
            };
            if newly_live {
                self.inner.transport.join_room(conn, &auction_id);
            }

            let fetched = self.inner.fetcher.fetch(&auction_id).await;
            if !self.is_current(epoch) {
                debug!("teardown during reconciliation");
                return;
            }
            if !self.is_live(&auction_id) {
                debug!(auction_id = %auction_id, "room left during fetch");
                continue;
            }
            match fetched {
                Ok(state) => {
                    debug!(
                        auction_id = %auction_id,
                        price = state.current_price,
                        bids = state.bid_count,
                        "publishing reconciled price"
                    );
                    self.inner
                        .bus
                        .publish(Event::NewBid(NewBid::reconciled(&state)));
                }
                Err(e) => warn!(
                    auction_id = %auction_id,
                    error = %e,
                    "state fetch failed, price may be stale"
                ),
            }

            if newly_live && !self.inner.presence.is_active(&auction_id) {
                self.start_presence(&auction_id, epoch);
            }
        }
    }

    /// Mark a desired room live on the connection of `epoch`, atomically
    /// with respect to teardown.
    fn establish(&self, auction_id: &str, epoch: u64) -> Establish {
        let link = self.link();
        let Some(conn) = link.conn.filter(|_| link.epoch == epoch) else {
            return Establish::TornDown;
        };
        let mut rooms = self.rooms();
        if !rooms.is_desired(auction_id) {
            return Establish::NotDesired;
        }
        Establish::Live {
            conn,
            newly: rooms.establish(auction_id),
        }
    }
}
