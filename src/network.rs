//! Network reachability as seen by the host environment.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Edge-triggered reachability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSignal {
    Online,
    Offline,
}

/// Level query plus a stream of edges. The channel listens to the stream for
/// as long as it lives.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
    fn signals(&self) -> broadcast::Receiver<NetworkSignal>;
}

/// Reachability flipped by hand: from the REPL, or from tests.
#[derive(Debug)]
pub struct ManualNetwork {
    online: AtomicBool,
    tx: broadcast::Sender<NetworkSignal>,
}

impl ManualNetwork {
    pub fn new(online: bool) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            online: AtomicBool::new(online),
            tx,
        }
    }

    /// Flip reachability. Emits a signal only on an actual change and
    /// returns whether one was emitted.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::SeqCst) == online {
            return false;
        }
        let signal = if online {
            NetworkSignal::Online
        } else {
            NetworkSignal::Offline
        };
        let _ = self.tx.send(signal);
        true
    }
}

impl Default for ManualNetwork {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus for ManualNetwork {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn signals(&self) -> broadcast::Receiver<NetworkSignal> {
        self.tx.subscribe()
    }
}
