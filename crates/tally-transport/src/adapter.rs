use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;

/// Coarse per-adapter transport health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHealthSnapshot {
    pub outbound_send_ok: u64,
    pub outbound_send_err: u64,
    /// Outbound datagrams discarded before reaching the wire.
    pub outbound_dropped: u64,
    pub inbound_received: u64,
    /// Inbound datagrams discarded before reaching the caller.
    pub inbound_dropped: u64,
    pub last_error: Option<String>,
}

/// Unreliable, unordered, message-oriented transport contract.
///
/// `send` is fire-and-forget: `Ok(())` means the datagram was handed off, not
/// that it arrived.
pub trait TransportAdapter {
    /// Source/destination address; doubles as the session key upstream.
    type Peer: Clone + Eq + Hash + Debug;
    /// Transport-specific send error.
    type Error: Debug;

    /// Attempts best-effort delivery of one datagram to a peer.
    fn send(&mut self, peer: &Self::Peer, bytes: &[u8]) -> Result<(), Self::Error>;
    /// Returns the next inbound datagram and its source, or `None` when
    /// nothing arrived within the adapter's poll window.
    fn recv(&mut self) -> Option<(Self::Peer, Vec<u8>)>;

    /// Best-effort transport health counters for logging.
    fn health_snapshot(&self) -> TransportHealthSnapshot {
        TransportHealthSnapshot::default()
    }
}

/// In-memory adapter for tests and simulations.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAdapter {
    inbound: VecDeque<(String, Vec<u8>)>,
    outbound: Vec<(String, Vec<u8>)>,
    drop_outbound: bool,
    send_ok: u64,
    dropped: u64,
    recv_ok: u64,
}

impl InMemoryAdapter {
    /// Queues bytes as inbound traffic from `peer`.
    pub fn enqueue_inbound(&mut self, peer: impl Into<String>, bytes: Vec<u8>) {
        self.inbound.push_back((peer.into(), bytes));
    }

    /// Drains and returns all outbound sends captured so far.
    pub fn take_outbound(&mut self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.outbound)
    }

    /// If enabled, outbound sends are silently discarded.
    pub fn set_drop_outbound(&mut self, drop_outbound: bool) {
        self.drop_outbound = drop_outbound;
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }
}

impl TransportAdapter for InMemoryAdapter {
    type Peer = String;
    type Error = &'static str;

    fn send(&mut self, peer: &Self::Peer, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.drop_outbound {
            self.dropped += 1;
            return Ok(());
        }
        self.outbound.push((peer.clone(), bytes.to_vec()));
        self.send_ok += 1;
        Ok(())
    }

    fn recv(&mut self) -> Option<(Self::Peer, Vec<u8>)> {
        let msg = self.inbound.pop_front();
        if msg.is_some() {
            self.recv_ok += 1;
        }
        msg
    }

    fn health_snapshot(&self) -> TransportHealthSnapshot {
        TransportHealthSnapshot {
            outbound_send_ok: self.send_ok,
            outbound_send_err: 0,
            outbound_dropped: self.dropped,
            inbound_received: self.recv_ok,
            inbound_dropped: 0,
            last_error: None,
        }
    }
}
