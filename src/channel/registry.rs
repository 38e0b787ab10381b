use std::collections::{BTreeSet, HashSet};

/// Desired rooms and the subset currently live on the connection.
///
/// Desired survives connection loss; established does not. Every
/// established room is also desired.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    desired: BTreeSet<String>,
    established: HashSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record interest. Returns `true` if the room was not desired before.
    pub fn want(&mut self, auction_id: &str) -> bool {
        self.desired.insert(auction_id.to_string())
    }

    /// Mark a desired room live. Returns `true` only on the transition, so
    /// callers start presence exactly once per establishment.
    pub fn establish(&mut self, auction_id: &str) -> bool {
        if !self.desired.contains(auction_id) {
            return false;
        }
        self.established.insert(auction_id.to_string())
    }

    /// Drop interest. Returns whether the room was live.
    pub fn remove(&mut self, auction_id: &str) -> bool {
        self.desired.remove(auction_id);
        self.established.remove(auction_id)
    }

    /// Connection lost: nothing is live any more, interest is kept.
    /// Returns how many rooms were live.
    pub fn suspend(&mut self) -> usize {
        let live = self.established.len();
        self.established.clear();
        live
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.desired.clear();
        self.established.clear();
    }

    pub fn is_desired(&self, auction_id: &str) -> bool {
        self.desired.contains(auction_id)
    }

    pub fn is_established(&self, auction_id: &str) -> bool {
        self.established.contains(auction_id)
    }

    /// Desired rooms in a stable order.
    pub fn desired(&self) -> Vec<String> {
        self.desired.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }
}
