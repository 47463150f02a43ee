use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::adapter::{TransportAdapter, TransportHealthSnapshot};

/// Drop probabilities, in whole percent, for each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossConfig {
    pub inbound_percent: u8,
    pub outbound_percent: u8,
    /// Fixed RNG seed for reproducible loss patterns.
    pub seed: Option<u64>,
}

impl LossConfig {
    /// Same loss rate in both directions, clamped to 100.
    pub fn symmetric(percent: u8) -> Self {
        let percent = percent.min(100);
        Self {
            inbound_percent: percent,
            outbound_percent: percent,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Wraps any adapter and randomly discards datagrams in either direction.
///
/// A dropped send still reports `Ok(())`, matching real datagram loss.
#[derive(Debug)]
pub struct LossyAdapter<A> {
    inner: A,
    config: LossConfig,
    rng: StdRng,
    inbound_dropped: u64,
    outbound_dropped: u64,
}

impl<A: TransportAdapter> LossyAdapter<A> {
    pub fn new(inner: A, config: LossConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner,
            config,
            rng,
            inbound_dropped: 0,
            outbound_dropped: 0,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    fn roll(&mut self, percent: u8) -> bool {
        percent > 0 && self.rng.gen_range(0..100_u8) < percent
    }
}

impl<A: TransportAdapter> TransportAdapter for LossyAdapter<A> {
    type Peer = A::Peer;
    type Error = A::Error;

    fn send(&mut self, peer: &Self::Peer, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.roll(self.config.outbound_percent) {
            self.outbound_dropped += 1;
            debug!("[DROP OUT] dropped {} bytes to {:?}", bytes.len(), peer);
            return Ok(());
        }
        self.inner.send(peer, bytes)
    }

    fn recv(&mut self) -> Option<(Self::Peer, Vec<u8>)> {
        let (peer, bytes) = self.inner.recv()?;
        if self.roll(self.config.inbound_percent) {
            self.inbound_dropped += 1;
            debug!("[DROP IN] dropped {} bytes from {:?}", bytes.len(), peer);
            return None;
        }
        Some((peer, bytes))
    }

    fn health_snapshot(&self) -> TransportHealthSnapshot {
        let mut snapshot = self.inner.health_snapshot();
        snapshot.outbound_dropped += self.outbound_dropped;
        snapshot.inbound_dropped += self.inbound_dropped;
        snapshot
    }
}
