//! The wire under the channel.
//!
//! Only the contract lives here. [`SimulatedTransport`] stands in for a real
//! socket: it opens after a fixed delay and can be told to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::debug;

use crate::consts::SIMULATED_CONNECT_DELAY;

/// One opened connection. Every later call names the connection it is
/// meant for, so an attempt that lost a race closes only its own wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// What the channel needs from a transport.
///
/// `open` is the only suspension point; room joins and leaves are
/// fire-and-forget messages on an open connection. Calls naming a
/// connection that is already closed are no-ops.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<ConnectionId>;
    fn close(&self, conn: ConnectionId);
    fn join_room(&self, conn: ConnectionId, auction_id: &str);
    fn leave_room(&self, conn: ConnectionId, auction_id: &str);
}

/// In-process transport with scripted failures.
pub struct SimulatedTransport {
    delay: Duration,
    failures: AtomicU32,
    opens: AtomicU32,
    next_id: AtomicU64,
    /// Open connections and the rooms joined on each.
    wires: Mutex<BTreeMap<ConnectionId, BTreeSet<String>>>,
}

impl SimulatedTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failures: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
            wires: Mutex::new(BTreeMap::new()),
        }
    }

    /// Make the next `n` opens fail.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// How many times `open` has been called.
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> Vec<ConnectionId> {
        self.wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn is_open(&self, conn: ConnectionId) -> bool {
        self.wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&conn)
    }

    /// Rooms joined on any open connection.
    pub fn joined_rooms(&self) -> Vec<String> {
        let wires = self.wires.lock().unwrap_or_else(PoisonError::into_inner);
        let rooms: BTreeSet<&String> = wires.values().flatten().collect();
        rooms.into_iter().cloned().collect()
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(SIMULATED_CONNECT_DELAY)
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&self) -> Result<ConnectionId> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            bail!("simulated transport failure");
        }
        let conn = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conn, BTreeSet::new());
        debug!(%conn, "wire open");
        Ok(conn)
    }

    fn close(&self, conn: ConnectionId) {
        let closed = self
            .wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn)
            .is_some();
        if closed {
            debug!(%conn, "wire closed");
        }
    }

    fn join_room(&self, conn: ConnectionId, auction_id: &str) {
        if let Some(rooms) = self
            .wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&conn)
        {
            debug!(%conn, auction_id, "join room");
            rooms.insert(auction_id.to_string());
        }
    }

    fn leave_room(&self, conn: ConnectionId, auction_id: &str) {
        if let Some(rooms) = self
            .wires
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&conn)
        {
            debug!(%conn, auction_id, "leave room");
            rooms.remove(auction_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn open_waits_for_delay() {
        let transport = SimulatedTransport::default();
        let start = tokio::time::Instant::now();
        let conn = transport.open().await.unwrap();
        assert!(start.elapsed() >= SIMULATED_CONNECT_DELAY);
        assert_eq!(transport.open_count(), 1);
        assert!(transport.is_open(conn));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_next_fails_exactly_n_times() {
        let transport = SimulatedTransport::new(Duration::ZERO);
        transport.fail_next(2);
        assert!(transport.open().await.is_err());
        assert!(transport.open().await.is_err());
        assert!(transport.open().await.is_ok());
        assert_eq!(transport.open_count(), 3);
        assert_eq!(transport.open_connections().len(), 1);
    }

    #[tokio::test]
    async fn rooms_track_join_and_leave() {
        let transport = SimulatedTransport::new(Duration::ZERO);
        let conn = transport.open().await.unwrap();
        transport.join_room(conn, "b");
        transport.join_room(conn, "a");
        transport.join_room(conn, "a");
        assert_eq!(transport.joined_rooms(), vec!["a", "b"]);

        transport.leave_room(conn, "a");
        assert_eq!(transport.joined_rooms(), vec!["b"]);

        transport.close(conn);
        assert!(transport.joined_rooms().is_empty());
        assert!(!transport.is_open(conn));
    }

    #[tokio::test]
    async fn close_only_touches_its_own_connection() {
        let transport = SimulatedTransport::new(Duration::ZERO);
        let stale = transport.open().await.unwrap();
        let live = transport.open().await.unwrap();
        assert_ne!(stale, live);
        transport.join_room(live, "A1");

        transport.close(stale);

        assert_eq!(transport.open_connections(), vec![live]);
        assert_eq!(transport.joined_rooms(), vec!["A1"]);
    }

    #[tokio::test]
    async fn calls_on_closed_connection_are_ignored() {
        let transport = SimulatedTransport::new(Duration::ZERO);
        let conn = transport.open().await.unwrap();
        transport.close(conn);

        transport.join_room(conn, "A1");
        transport.close(conn);

        assert!(transport.joined_rooms().is_empty());
        assert!(transport.open_connections().is_empty());
    }
}
