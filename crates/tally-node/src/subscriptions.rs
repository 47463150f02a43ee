use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tally_codec::body::BalanceUpdate;
use tally_codec::packet::{encode_packet, Packet};

use crate::lock;

/// One encoded callback and the subscribers it is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<P> {
    pub update: BalanceUpdate,
    /// Encoded Callback packet, identical for every recipient.
    pub packet: Vec<u8>,
    pub recipients: Vec<P>,
}

/// Time-bounded push-notification list.
///
/// Repeat subscriptions from the same destination collapse into one entry
/// holding the later expiry, so a destination never receives the same event
/// twice. Expired entries are pruned lazily on `publish`.
#[derive(Debug)]
pub struct SubscriptionRegistry<P> {
    active: Mutex<HashMap<P, Instant>>,
}

impl<P> Default for SubscriptionRegistry<P> {
    fn default() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: Clone + Eq + Hash> SubscriptionRegistry<P> {
    /// Registers `destination` until `now + duration` and returns the
    /// destination's effective expiry.
    pub fn subscribe(&self, destination: P, duration: Duration, now: Instant) -> Instant {
        // Unrepresentable expiry: treated as already expired.
        let requested = now.checked_add(duration).unwrap_or(now);
        let mut active = lock(&self.active);
        let expiry = active.entry(destination).or_insert(requested);
        if requested > *expiry {
            *expiry = requested;
        }
        *expiry
    }

    /// Addresses `update` to every destination whose window is still open at
    /// `now`, then drops all expired entries.
    ///
    /// The snapshot is taken under the lock; concurrent `subscribe` calls land
    /// before or after it, never inside.
    pub fn publish(&self, update: &BalanceUpdate, now: Instant) -> Notification<P> {
        let recipients = {
            let mut active = lock(&self.active);
            active.retain(|_, expiry| now < *expiry);
            active.keys().cloned().collect::<Vec<_>>()
        };
        Notification {
            update: *update,
            packet: encode_packet(&Packet::callback(update)),
            recipients,
        }
    }

    /// Entries currently held, including expired ones not yet pruned.
    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, destination: &P) -> bool {
        lock(&self.active).contains_key(destination)
    }

    pub fn expiry_of(&self, destination: &P) -> Option<Instant> {
        lock(&self.active).get(destination).copied()
    }
}
