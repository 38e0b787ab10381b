use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::RngExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::{PresenceRun, PresenceSource};
use crate::config::PresenceConfig;
use crate::events::{Event, EventBus, ViewerCount};

struct Timer {
    run: PresenceRun,
    task: JoinHandle<()>,
}

/// Random-walk viewer counts, one tokio task per room.
pub struct SimulatedPresence {
    config: PresenceConfig,
    next_run: AtomicU64,
    counts: Arc<Mutex<HashMap<String, u32>>>,
    timers: Mutex<HashMap<String, Timer>>,
}

impl SimulatedPresence {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            next_run: AtomicU64::new(1),
            counts: Arc::new(Mutex::new(HashMap::new())),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live timers.
    pub fn active_rooms(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for SimulatedPresence {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}

/// One ±1 step, clamped.
fn drift(count: u32, up: bool, floor: u32, ceiling: u32) -> u32 {
    let next = if up {
        count.saturating_add(1)
    } else {
        count.saturating_sub(1)
    };
    next.clamp(floor, ceiling)
}

impl PresenceSource for SimulatedPresence {
    fn start(&self, auction_id: &str, bus: Arc<EventBus>) -> PresenceRun {
        self.stop(auction_id);

        let run = self.next_run.fetch_add(1, Ordering::SeqCst);
        let (seed, period) = {
            let mut rng = rand::rng();
            let seed = rng.random_range(self.config.seed.clone());
            let period = rng.random_range(self.config.period_ms.clone());
            (seed, Duration::from_millis(period))
        };
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(auction_id.to_string(), seed);

        debug!(
            auction_id,
            run,
            seed,
            period_ms = period.as_millis() as u64,
            "presence started"
        );
        bus.publish(Event::ViewerCount(ViewerCount {
            auction_id: auction_id.to_string(),
            count: seed,
        }));

        let id = auction_id.to_string();
        let counts = Arc::clone(&self.counts);
        let (floor, ceiling) = (self.config.floor, self.config.ceiling);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = {
                    let mut counts = counts.lock().unwrap_or_else(PoisonError::into_inner);
                    let Some(count) = counts.get_mut(&id) else {
                        break;
                    };
                    *count = drift(*count, rand::rng().random_bool(0.5), floor, ceiling);
                    *count
                };
                bus.publish(Event::ViewerCount(ViewerCount {
                    auction_id: id.clone(),
                    count: next,
                }));
            }
        });

        let replaced = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(auction_id.to_string(), Timer { run, task });
        // A concurrent start for the same room got in between
        if let Some(replaced) = replaced {
            replaced.task.abort();
        }
        run
    }

    fn stop(&self, auction_id: &str) {
        let timer = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(auction_id);
        if let Some(timer) = timer {
            timer.task.abort();
            debug!(auction_id, run = timer.run, "presence stopped");
        }
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(auction_id);
    }

    fn stop_run(&self, auction_id: &str, run: PresenceRun) {
        let timer = {
            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            if timers.get(auction_id).is_none_or(|t| t.run != run) {
                return;
            }
            timers.remove(auction_id)
        };
        if let Some(timer) = timer {
            timer.task.abort();
            debug!(auction_id, run, "stale presence run stopped");
        }
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(auction_id);
    }

    fn stop_all(&self) {
        let timers: Vec<Timer> = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, timer)| timer)
            .collect();
        for timer in &timers {
            timer.task.abort();
        }
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if !timers.is_empty() {
            debug!(rooms = timers.len(), "all presence stopped");
        }
    }

    fn is_active(&self, auction_id: &str) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(auction_id)
    }

    fn count(&self, auction_id: &str) -> Option<u32> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(auction_id)
            .copied()
    }
}

impl Drop for SimulatedPresence {
    fn drop(&mut self) {
        self.stop_all();
    }
}
