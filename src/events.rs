//! Auction event bus.
//!
//! Listeners register per [`EventKind`] with [`EventBus::on`] and get a
//! [`ListenerHandle`] back; [`EventBus::off`] removes exactly that listener.
//! [`EventBus::publish`] runs every listener of the event's kind
//! synchronously. A panicking listener is logged and skipped, the rest still
//! see the event.
//!
//! Consumers living in their own task can take an async tap with
//! [`EventBus::subscribe`], built on [`tokio::sync::broadcast`], which yields
//! every published event regardless of kind.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::error;

use crate::consts::{EVENT_BUS_CAPACITY, RECONNECT_SYNC_BIDDER};
use crate::state::AuctionState;

/// The kinds of event a listener can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ConnectionState,
    NewBid,
    AuctionEndingSoon,
    AuctionSold,
    AuctionExpired,
    ViewerCount,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::ConnectionState,
        EventKind::NewBid,
        EventKind::AuctionEndingSoon,
        EventKind::AuctionSold,
        EventKind::AuctionExpired,
        EventKind::ViewerCount,
    ];
}

/// Channel connectivity as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnecting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            reconnecting: false,
            error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            reconnecting: false,
            error: None,
        }
    }

    pub fn reconnecting() -> Self {
        Self {
            connected: false,
            reconnecting: true,
            error: None,
        }
    }

    /// Disconnected with an error description for the UI banner.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            reconnecting: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBid {
    pub auction_id: String,
    pub amount: u64,
    pub bidder_name: String,
    pub timestamp: DateTime<Utc>,
}

impl NewBid {
    /// The price correction published after a reconnect. Always carries the
    /// fetched price, whether or not a bid happened during the outage.
    pub fn reconciled(state: &AuctionState) -> Self {
        Self {
            auction_id: state.auction_id.clone(),
            amount: state.current_price,
            bidder_name: RECONNECT_SYNC_BIDDER.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndingSoon {
    pub auction_id: String,
    pub seconds_remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sold {
    pub auction_id: String,
    pub winner_name: String,
    pub final_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expired {
    pub auction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerCount {
    pub auction_id: String,
    pub count: u32,
}

/// Events that flow from the channel to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    ConnectionState(ConnectionStatus),
    NewBid(NewBid),
    AuctionEndingSoon(EndingSoon),
    AuctionSold(Sold),
    AuctionExpired(Expired),
    ViewerCount(ViewerCount),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ConnectionState(_) => EventKind::ConnectionState,
            Event::NewBid(_) => EventKind::NewBid,
            Event::AuctionEndingSoon(_) => EventKind::AuctionEndingSoon,
            Event::AuctionSold(_) => EventKind::AuctionSold,
            Event::AuctionExpired(_) => EventKind::AuctionExpired,
            Event::ViewerCount(_) => EventKind::ViewerCount,
        }
    }

    /// The auction this event concerns. `None` for connection-state, which is global.
    pub fn auction_id(&self) -> Option<&str> {
        match self {
            Event::ConnectionState(_) => None,
            Event::NewBid(e) => Some(&e.auction_id),
            Event::AuctionEndingSoon(e) => Some(&e.auction_id),
            Event::AuctionSold(e) => Some(&e.auction_id),
            Event::AuctionExpired(e) => Some(&e.auction_id),
            Event::ViewerCount(e) => Some(&e.auction_id),
        }
    }
}

/// A registered callback.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Returned by [`EventBus::on`]; pass it back to [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    kind: EventKind,
    id: u64,
}

impl ListenerHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Registered {
    id: u64,
    listener: Listener,
}

/// Per-kind listener registry plus a broadcast tap.
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<Registered>>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus whose broadcast tap buffers `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Register a callback for one kind of event.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_shared(kind, Arc::new(callback))
    }

    /// Register a shared callback. Registering the same `Arc` twice for a
    /// kind keeps one registration and returns the existing handle.
    pub fn on_shared(&self, kind: EventKind, listener: Listener) -> ListenerHandle {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = listeners.entry(kind).or_default();
        if let Some(existing) = entries.iter().find(|r| Arc::ptr_eq(&r.listener, &listener)) {
            return ListenerHandle {
                kind,
                id: existing.id,
            };
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(Registered { id, listener });
        ListenerHandle { kind, id }
    }

    /// Remove a listener. Unknown or already removed handles are ignored.
    /// Returns whether something was removed.
    pub fn off(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(&handle.kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|r| r.id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&handle.kind);
        }
        removed
    }

    /// Deliver an event to every listener of its kind and to the broadcast tap.
    /// Returns the number of listeners that ran to completion.
    pub fn publish(&self, event: Event) -> usize {
        let kind = event.kind();
        // Snapshot so listeners may call on/off without deadlocking.
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .get(&kind)
                .map(|entries| entries.iter().map(|r| Arc::clone(&r.listener)).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for listener in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(kind = ?kind, "event listener panicked"),
            }
        }

        let _ = self.tx.send(event);
        delivered
    }

    /// Async tap yielding all future events of every kind (no replay).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of listeners currently registered for a kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn viewers(auction_id: &str, count: u32) -> Event {
        Event::ViewerCount(ViewerCount {
            auction_id: auction_id.to_string(),
            count,
        })
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Event) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        (hits, move |_: &Event| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn publish_reaches_listener_of_matching_kind() {
        let bus = EventBus::default();
        let (hits, callback) = counter();
        bus.on(EventKind::ViewerCount, callback);

        assert_eq!(bus.publish(viewers("A1", 7)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_skips_other_kinds() {
        let bus = EventBus::default();
        let (hits, callback) = counter();
        bus.on(EventKind::NewBid, callback);

        assert_eq!(bus.publish(viewers("A1", 7)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multiple_listeners_each_receive_event() {
        let bus = EventBus::default();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        bus.on(EventKind::ViewerCount, cb_a);
        bus.on(EventKind::ViewerCount, cb_b);

        assert_eq!(bus.publish(viewers("A1", 3)), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_after_on_leaves_no_listeners() {
        let bus = EventBus::default();
        let (hits, callback) = counter();
        let handle = bus.on(EventKind::ViewerCount, callback);

        assert!(bus.off(handle));
        assert_eq!(bus.listener_count(EventKind::ViewerCount), 0);
        assert_eq!(bus.publish(viewers("A1", 3)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn off_twice_is_silent() {
        let bus = EventBus::default();
        let handle = bus.on(EventKind::NewBid, |_| {});
        assert!(bus.off(handle));
        assert!(!bus.off(handle));
    }

    #[test]
    fn same_shared_listener_registers_once() {
        let bus = EventBus::default();
        let (hits, callback) = counter();
        let shared: Listener = Arc::new(callback);

        let first = bus.on_shared(EventKind::ViewerCount, Arc::clone(&shared));
        let second = bus.on_shared(EventKind::ViewerCount, Arc::clone(&shared));

        assert_eq!(first, second);
        assert_eq!(bus.listener_count(EventKind::ViewerCount), 1);
        bus.publish(viewers("A1", 1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_listener_on_two_kinds_gets_two_handles() {
        let bus = EventBus::default();
        let shared: Listener = Arc::new(|_: &Event| {});
        let a = bus.on_shared(EventKind::NewBid, Arc::clone(&shared));
        let b = bus.on_shared(EventKind::AuctionSold, shared);
        assert_ne!(a, b);
        assert_eq!(a.kind(), EventKind::NewBid);
        assert_eq!(b.kind(), EventKind::AuctionSold);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let bus = EventBus::default();
        let (hits, callback) = counter();
        bus.on(EventKind::ViewerCount, |_| panic!("listener bug"));
        bus.on(EventKind::ViewerCount, callback);

        assert_eq!(bus.publish(viewers("A1", 2)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Bus still usable afterwards.
        assert_eq!(bus.publish(viewers("A1", 3)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_may_unregister_itself_during_publish() {
        let bus = Arc::new(EventBus::default());
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        let bus_ref = Arc::clone(&bus);
        let slot_ref = Arc::clone(&slot);
        let handle = bus.on(EventKind::NewBid, move |_| {
            if let Some(h) = slot_ref.lock().unwrap().take() {
                bus_ref.off(h);
            }
        });
        *slot.lock().unwrap() = Some(handle);

        let bid = Event::AuctionExpired(Expired {
            auction_id: "A1".to_string(),
        });
        bus.publish(bid);
        assert_eq!(bus.listener_count(EventKind::NewBid), 1);

        bus.publish(Event::NewBid(NewBid {
            auction_id: "A1".to_string(),
            amount: 10,
            bidder_name: "x".to_string(),
            timestamp: Utc::now(),
        }));
        assert_eq!(bus.listener_count(EventKind::NewBid), 0);
    }

    #[tokio::test]
    async fn subscribe_tap_sees_every_kind() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(Event::ConnectionState(ConnectionStatus::connected()));
        bus.publish(viewers("A1", 9));

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::ConnectionState(ConnectionStatus::connected())
        );
        assert_eq!(rx.recv().await.unwrap(), viewers("A1", 9));
    }

    #[test]
    fn auction_id_is_none_only_for_connection_state() {
        assert!(
            Event::ConnectionState(ConnectionStatus::disconnected())
                .auction_id()
                .is_none()
        );
        assert_eq!(viewers("A7", 1).auction_id(), Some("A7"));
    }

    #[test]
    fn serializes_with_type_tag_and_camel_case() {
        let json = serde_json::to_value(viewers("A1", 12)).unwrap();
        assert_eq!(json["type"], "VIEWER_COUNT");
        assert_eq!(json["data"]["auctionId"], "A1");
        assert_eq!(json["data"]["count"], 12);

        let status = serde_json::to_value(Event::ConnectionState(ConnectionStatus::failed(
            "Network offline",
        )))
        .unwrap();
        assert_eq!(status["data"]["connected"], false);
        assert_eq!(status["data"]["error"], "Network offline");
    }

    #[test]
    fn connection_status_omits_absent_error() {
        let json = serde_json::to_value(ConnectionStatus::reconnecting()).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["reconnecting"], true);
    }
}
