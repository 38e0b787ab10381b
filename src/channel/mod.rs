//! The realtime auction channel.
//!
//! A [`Channel`] owns one logical connection and everything hanging off it:
//! the event bus, the desired-room registry, presence, and the
//! reconnect loop. It is cheap to clone; clones share state. Build one with
//! [`Channel::builder`], call [`Channel::watch_network`] to follow the
//! environment's online/offline signals, and [`Channel::shutdown`] when done.
//!
//! Connection state is a single [`Phase`], so "connected" and
//! "reconnecting" can never both hold. Every teardown (explicit
//! [`disconnect`](Channel::disconnect), offline signal, server drop) bumps an
//! epoch; suspended work compares epochs when it resumes and bails out
//! instead of resurrecting a dead connection. The channel remembers the
//! [`ConnectionId`] it is live on, and a stale open closes only the
//! connection it made itself.
//!
//! Lock order is `link` then `rooms`. Neither lock is held while publishing,
//! since listeners may call back into the channel.

mod reconcile;
pub mod registry;

pub use registry::SubscriptionRegistry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::RngExt;
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{StaticToken, TokenSource};
use crate::config::{ChannelConfig, PresenceConfig};
use crate::consts::{MAX_ATTEMPTS_ERROR, NETWORK_OFFLINE_ERROR, SIMULATED_BIDDERS};
use crate::error::ChannelError;
use crate::events::{ConnectionStatus, Event, EventBus, EventKind, ListenerHandle, NewBid};
use crate::network::{ManualNetwork, NetworkSignal, NetworkStatus};
use crate::presence::{PresenceSource, SimulatedPresence};
use crate::state::StateFetcher;
use crate::state::simulated::SimulatedStateFetcher;
use crate::transport::{ConnectionId, SimulatedTransport, Transport};

/// Where the channel is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug)]
struct Link {
    phase: Phase,
    attempt: u32,
    exhausted: bool,
    epoch: u64,
    conn: Option<ConnectionId>,
}

struct Inner {
    config: ChannelConfig,
    bus: Arc<EventBus>,
    transport: Arc<dyn Transport>,
    network: Arc<dyn NetworkStatus>,
    fetcher: Arc<dyn StateFetcher>,
    tokens: Arc<dyn TokenSource>,
    presence: Arc<dyn PresenceSource>,
    link: Mutex<Link>,
    rooms: Mutex<SubscriptionRegistry>,
    /// Wakes a backoff wait early: on teardown, or when the network returns.
    interrupt: Notify,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let watcher = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        self.presence.stop_all();
    }
}

/// Assembles a [`Channel`]. Anything not supplied gets its simulated
/// stand-in.
#[derive(Default)]
pub struct ChannelBuilder {
    config: ChannelConfig,
    presence_config: PresenceConfig,
    bus: Option<Arc<EventBus>>,
    transport: Option<Arc<dyn Transport>>,
    network: Option<Arc<dyn NetworkStatus>>,
    fetcher: Option<Arc<dyn StateFetcher>>,
    tokens: Option<Arc<dyn TokenSource>>,
    presence: Option<Arc<dyn PresenceSource>>,
}

impl ChannelBuilder {
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Shape of the default simulated presence. Ignored when
    /// [`presence`](Self::presence) is set.
    pub fn presence_config(mut self, config: PresenceConfig) -> Self {
        self.presence_config = config;
        self
    }

    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn StateFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn presence(mut self, presence: Arc<dyn PresenceSource>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn build(self) -> Channel {
        let presence: Arc<dyn PresenceSource> = self
            .presence
            .unwrap_or_else(|| Arc::new(SimulatedPresence::new(self.presence_config)));
        let fetcher: Arc<dyn StateFetcher> = self.fetcher.unwrap_or_else(|| {
            Arc::new(SimulatedStateFetcher::new(Some(Arc::clone(&presence))))
        });
        let inner = Inner {
            config: self.config,
            bus: self.bus.unwrap_or_default(),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(SimulatedTransport::default())),
            network: self
                .network
                .unwrap_or_else(|| Arc::new(ManualNetwork::default())),
            fetcher,
            tokens: self.tokens.unwrap_or_else(|| Arc::new(StaticToken::none())),
            presence,
            link: Mutex::new(Link {
                phase: Phase::Disconnected,
                attempt: 0,
                exhausted: false,
                epoch: 0,
                conn: None,
            }),
            rooms: Mutex::new(SubscriptionRegistry::new()),
            interrupt: Notify::new(),
            watcher: Mutex::new(None),
        };
        Channel {
            inner: Arc::new(inner),
        }
    }
}

/// Handle to one realtime channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Default for Channel {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Channel {
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::default()
    }

    // ── Introspection ─────────────────────────────────────────────

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> Phase {
        self.link().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == Phase::Connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.phase() == Phase::Reconnecting
    }

    /// True once automatic reconnects gave up; the UI should offer a manual
    /// retry. Cleared by the next `reconnect()` or successful connect.
    pub fn max_attempts_reached(&self) -> bool {
        self.link().exhausted
    }

    /// Attempts made by the current (or last) reconnect loop.
    pub fn attempt(&self) -> u32 {
        self.link().attempt
    }

    /// Rooms the UI wants, live or not.
    pub fn subscriptions(&self) -> Vec<String> {
        self.rooms().desired()
    }

    /// Whether a room is live on the current connection.
    pub fn is_live(&self, auction_id: &str) -> bool {
        self.rooms().is_established(auction_id)
    }

    // ── Events ────────────────────────────────────────────────────

    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, callback)
    }

    pub fn off(&self, handle: ListenerHandle) -> bool {
        self.inner.bus.off(handle)
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Open the channel once.
    ///
    /// Already connected is a no-op; a concurrent attempt is refused. When
    /// the network is down this fails without touching the transport. On
    /// success, rooms joined while disconnected are brought live.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let epoch = {
            let mut link = self.link();
            match link.phase {
                Phase::Connected => return Ok(()),
                Phase::Connecting | Phase::Reconnecting => {
                    return Err(ChannelError::AttemptInProgress);
                }
                Phase::Disconnected => {}
            }
            if self.inner.network.is_online() {
                link.phase = Phase::Connecting;
                Some(link.epoch)
            } else {
                None
            }
        };

        let Some(epoch) = epoch else {
            warn!("network offline, not connecting");
            self.publish_status(ConnectionStatus::failed(NETWORK_OFFLINE_ERROR));
            return Err(ChannelError::NetworkOffline);
        };

        if let Err(e) = self.open_transport(epoch).await {
            {
                let mut link = self.link();
                if link.epoch == epoch && link.phase == Phase::Connecting {
                    link.phase = Phase::Disconnected;
                }
            }
            if !matches!(e, ChannelError::TornDown) {
                warn!(error = %e, "connect failed");
                self.publish_status(ConnectionStatus::failed(e.to_string()));
            }
            return Err(e);
        }

        self.reconcile(epoch).await;
        Ok(())
    }

    /// Reconnect with exponential backoff.
    ///
    /// No-op unless disconnected, so at most one loop runs per channel.
    /// Waits `base * 2^(n-1)` before attempt `n` and gives up after
    /// `max_reconnect_attempts`, leaving [`max_attempts_reached`] set.
    ///
    /// [`max_attempts_reached`]: Channel::max_attempts_reached
    pub async fn reconnect(&self) {
        let epoch = {
            let mut link = self.link();
            if link.phase != Phase::Disconnected {
                debug!(phase = ?link.phase, "reconnect skipped");
                return;
            }
            link.phase = Phase::Reconnecting;
            link.attempt = 0;
            link.exhausted = false;
            link.epoch
        };
        self.publish_status(ConnectionStatus::reconnecting());

        let max = self.inner.config.max_reconnect_attempts;
        loop {
            let attempt = {
                let mut link = self.link();
                if link.epoch != epoch {
                    return;
                }
                if link.attempt >= max {
                    break;
                }
                link.attempt += 1;
                link.attempt
            };

            let delay = self.inner.config.backoff_delay(attempt);
            info!(
                attempt,
                max,
                delay_ms = delay.as_millis() as u64,
                "reconnect attempt scheduled"
            );
            if !self.backoff(delay, epoch).await {
                debug!(attempt, "reconnect loop abandoned");
                return;
            }

            let result = if self.inner.network.is_online() {
                self.open_transport(epoch).await
            } else {
                Err(ChannelError::NetworkOffline)
            };
            match result {
                Ok(()) => {
                    self.reconcile(epoch).await;
                    info!(attempt, "reconnected");
                    return;
                }
                Err(ChannelError::TornDown) => return,
                Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
            }
        }

        {
            let mut link = self.link();
            if link.epoch != epoch {
                return;
            }
            link.phase = Phase::Disconnected;
            link.exhausted = true;
        }
        warn!(max, "giving up, manual retry required");
        self.publish_status(ConnectionStatus::failed(MAX_ATTEMPTS_ERROR));
    }

    /// Intentional teardown: forget every room, stop every timer, cancel
    /// any reconnect loop.
    pub fn disconnect(&self) {
        let conn = {
            let mut link = self.link();
            link.epoch += 1;
            link.phase = Phase::Disconnected;
            link.attempt = 0;
            link.exhausted = false;
            link.conn.take()
        };
        self.inner.interrupt.notify_waiters();
        self.rooms().clear();
        self.inner.presence.stop_all();
        if let Some(conn) = conn {
            self.inner.transport.close(conn);
        }
        self.publish_status(ConnectionStatus::disconnected());
        info!("disconnected");
    }

    /// The server closed the channel. Rooms stay desired for the next
    /// reconnect.
    pub fn handle_server_disconnect(&self) {
        self.connection_lost("server closed the channel");
    }

    /// React to an environment reachability change.
    ///
    /// An online signal is checked against the current level first: a burst
    /// of flips can deliver it after the network already went down again.
    pub fn handle_network_signal(&self, signal: NetworkSignal) {
        match signal {
            NetworkSignal::Offline => self.connection_lost("network offline"),
            NetworkSignal::Online if !self.inner.network.is_online() => {
                debug!("stale online signal, network is down");
            }
            NetworkSignal::Online => match self.phase() {
                Phase::Disconnected => {
                    info!("network online, attempting reconnect");
                    let channel = self.clone();
                    tokio::spawn(async move { channel.reconnect().await });
                }
                Phase::Reconnecting => {
                    debug!("network online, skipping rest of backoff");
                    self.inner.interrupt.notify_waiters();
                }
                Phase::Connecting | Phase::Connected => {}
            },
        }
    }

    /// Follow the network's signals until shutdown. Calling again replaces
    /// the previous listener.
    pub fn watch_network(&self) {
        let mut signals = self.inner.network.signals();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let received = signals.recv().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let signal = match received {
                    Ok(signal) => signal,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed network signals, using current state");
                        if inner.network.is_online() {
                            NetworkSignal::Online
                        } else {
                            NetworkSignal::Offline
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                Channel { inner }.handle_network_signal(signal);
            }
        });

        let previous = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop following the network and disconnect.
    pub fn shutdown(&self) {
        let watcher = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        self.disconnect();
    }

    // ── Rooms ─────────────────────────────────────────────────────

    /// Ask for live updates on an auction. While disconnected the room is
    /// only remembered; it goes live on the next successful (re)connect.
    pub fn join_auction(&self, auction_id: &str) {
        let joined = {
            let link = self.link();
            let mut rooms = self.rooms();
            rooms.want(auction_id);
            match (link.phase, link.conn) {
                (Phase::Connected, Some(conn)) => {
                    Some((conn, link.epoch, rooms.establish(auction_id)))
                }
                _ => None,
            }
        };
        let Some((conn, epoch, newly_live)) = joined else {
            warn!(auction_id, "not connected, join deferred until reconnect");
            return;
        };
        if newly_live {
            self.inner.transport.join_room(conn, auction_id);
            self.start_presence(auction_id, epoch);
            info!(auction_id, %conn, "joined auction");
        }
    }

    /// Stop live updates on an auction, connected or not.
    pub fn leave_auction(&self, auction_id: &str) {
        let (was_live, conn) = {
            let link = self.link();
            let was_live = self.rooms().remove(auction_id);
            self.inner.presence.stop(auction_id);
            (was_live, link.conn)
        };
        if let (true, Some(conn)) = (was_live, conn) {
            self.inner.transport.leave_room(conn, auction_id);
        }
        info!(auction_id, "left auction");
    }

    /// Inbound server push. Published only while connected and only for
    /// live rooms; connection state is never accepted from outside.
    /// Returns whether the event was published.
    pub fn deliver(&self, event: Event) -> bool {
        let Some(auction_id) = event.auction_id() else {
            warn!("ignoring pushed connection-state event");
            return false;
        };
        if !self.is_connected() || !self.is_live(auction_id) {
            debug!(auction_id, kind = ?event.kind(), "dropping event for inactive room");
            return false;
        }
        self.inner.bus.publish(event);
        true
    }

    /// Push a fake bid from a random bidder through [`deliver`](Self::deliver).
    pub fn simulate_new_bid(&self, auction_id: &str, amount: u64) -> bool {
        let bidder = SIMULATED_BIDDERS[rand::rng().random_range(0..SIMULATED_BIDDERS.len())];
        self.deliver(Event::NewBid(NewBid {
            auction_id: auction_id.to_string(),
            amount,
            bidder_name: bidder.to_string(),
            timestamp: Utc::now(),
        }))
    }

    // ── Internals ─────────────────────────────────────────────────

    fn link(&self) -> MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rooms(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.inner.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.link().epoch == epoch
    }

    fn publish_status(&self, status: ConnectionStatus) {
        self.inner.bus.publish(Event::ConnectionState(status));
    }

    /// Whether a room is still live on the connection of `epoch`.
    fn still_live(&self, auction_id: &str, epoch: u64) -> bool {
        let link = self.link();
        link.epoch == epoch && self.rooms().is_established(auction_id)
    }

    /// Start presence for a room that just went live.
    ///
    /// A teardown or leave can land while `start` runs (its first viewer
    /// count goes through listeners). Teardown bumps the epoch before it
    /// stops timers, so re-checking after the timer is in place catches
    /// every interleaving.
    fn start_presence(&self, auction_id: &str, epoch: u64) {
        let run = self
            .inner
            .presence
            .start(auction_id, Arc::clone(&self.inner.bus));
        if !self.still_live(auction_id, epoch) {
            debug!(auction_id, run, "room went down while presence started");
            self.inner.presence.stop_run(auction_id, run);
        }
    }

    /// Open the transport and, unless a teardown happened meanwhile, mark
    /// the channel connected on the new connection.
    async fn open_transport(&self, epoch: u64) -> Result<(), ChannelError> {
        let conn = self
            .inner
            .transport
            .open()
            .await
            .map_err(ChannelError::Transport)?;

        let (current, replaced) = {
            let mut link = self.link();
            if link.epoch == epoch {
                link.phase = Phase::Connected;
                link.attempt = 0;
                link.exhausted = false;
                (true, link.conn.replace(conn))
            } else {
                (false, None)
            }
        };
        if let Some(replaced) = replaced {
            self.inner.transport.close(replaced);
        }
        if !current {
            debug!(%conn, "transport opened after teardown, closing it");
            self.inner.transport.close(conn);
            return Err(ChannelError::TornDown);
        }

        if self.inner.tokens.token().is_some() {
            info!("connected with auth token");
        } else {
            info!("connected (unauthenticated)");
        }
        self.publish_status(ConnectionStatus::connected());
        Ok(())
    }

    /// Sleep out a backoff delay. Returns `false` if the channel was torn
    /// down meanwhile; an online signal only shortens the wait.
    async fn backoff(&self, delay: Duration, epoch: u64) -> bool {
        let interrupted = self.inner.interrupt.notified();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = interrupted => {}
        }
        self.is_current(epoch)
    }

    fn connection_lost(&self, reason: &str) {
        let conn = {
            let mut link = self.link();
            link.epoch += 1;
            link.phase = Phase::Disconnected;
            link.conn.take()
        };
        self.inner.interrupt.notify_waiters();
        let live = self.rooms().suspend();
        self.inner.presence.stop_all();
        if let Some(conn) = conn {
            self.inner.transport.close(conn);
        }
        info!(reason, live_rooms = live, "connection lost");
        self.publish_status(ConnectionStatus::disconnected());
    }
}
