//! Viewer presence per auction room.
//!
//! A real server pushes `VIEWER_COUNT` events itself. Until then
//! [`SimulatedPresence`] fakes them with one timer per room. Both sit behind
//! [`PresenceSource`], so the channel does not care which one it runs.

pub mod simulated;

pub use simulated::SimulatedPresence;

use std::sync::Arc;

use crate::events::EventBus;

/// Identifies one run of a room's presence, as returned by
/// [`PresenceSource::start`].
pub type PresenceRun = u64;

pub trait PresenceSource: Send + Sync {
    /// Begin presence for a room, publishing on `bus`. Restarting an active
    /// room replaces its previous run.
    fn start(&self, auction_id: &str, bus: Arc<EventBus>) -> PresenceRun;

    /// Stop a room. Stopping an unknown room is a no-op.
    fn stop(&self, auction_id: &str);

    /// Stop a room only while `run` is still the one driving it. A caller
    /// that lost a race uses this so it never cancels a newer run.
    fn stop_run(&self, auction_id: &str, run: PresenceRun);

    /// Stop every room.
    fn stop_all(&self);

    /// Whether the room currently produces presence events.
    fn is_active(&self, auction_id: &str) -> bool;

    /// Latest viewer count for a room, when this source keeps one.
    fn count(&self, _auction_id: &str) -> Option<u32> {
        None
    }
}

/// For transports that push viewer counts themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPresence;

impl PresenceSource for NoPresence {
    fn start(&self, _auction_id: &str, _bus: Arc<EventBus>) -> PresenceRun {
        0
    }
    fn stop(&self, _auction_id: &str) {}
    fn stop_run(&self, _auction_id: &str, _run: PresenceRun) {}
    fn stop_all(&self) {}
    fn is_active(&self, _auction_id: &str) -> bool {
        false
    }
}
