//! Datagram dispatch loop.
//!
//! `Dispatcher::handle_datagram` is the whole request pipeline for one
//! inbound datagram and returns what should be sent; `serve_tick` pairs it
//! with a transport.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tally_codec::body::{BalanceUpdate, MessageReply, SubscribeRequest, WireBody};
use tally_codec::error::CodecError;
use tally_codec::packet::{decode_packet, encode_packet, Packet};
use tally_core::{MessageKind, Operation};
use tally_transport::adapter::TransportAdapter;
use tracing::{debug, enabled, info, warn, Level};

use crate::config::NodeConfig;
use crate::error::{HandleError, ServiceError};
use crate::ledger::{AccountService, Ledger};
use crate::lock;
use crate::operations::{route, validate_request_body, Handled, Route};
use crate::semantics::{classify, DuplicateCheck, Idempotency, InvocationSemantics};
use crate::subscriptions::SubscriptionRegistry;

/// Why a datagram produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Envelope shorter than the packet header.
    Malformed,
    /// Well-formed packet that is not a Request.
    NotRequest(MessageKind),
    /// Request body did not match the operation's field layout.
    MalformedBody,
}

/// Datagrams to emit for one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome<P> {
    Dropped(DropReason),
    /// Cached reply for a retransmitted request, byte-identical to the first.
    Replayed(Vec<u8>),
    Executed {
        reply: Vec<u8>,
        /// Callback packets addressed to active subscribers, in publish order.
        callbacks: Vec<(P, Vec<u8>)>,
    },
}

impl<P> DispatchOutcome<P> {
    /// Encoded reply for the requester, if any.
    pub fn reply(&self) -> Option<&[u8]> {
        match self {
            DispatchOutcome::Dropped(_) => None,
            DispatchOutcome::Replayed(reply) | DispatchOutcome::Executed { reply, .. } => {
                Some(reply)
            }
        }
    }

    pub fn callbacks(&self) -> &[(P, Vec<u8>)] {
        match self {
            DispatchOutcome::Executed { callbacks, .. } => callbacks,
            _ => &[],
        }
    }
}

struct Executed {
    reply: Vec<u8>,
    events: Vec<BalanceUpdate>,
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    malformed: AtomicU64,
    ignored_non_request: AtomicU64,
    replayed: AtomicU64,
    executed: AtomicU64,
    error_replies: AtomicU64,
    callbacks_sent: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    /// Datagrams handed to the dispatcher.
    pub received: u64,
    /// Envelope or body decode failures; dropped without reply.
    pub malformed: u64,
    /// Reply/Error/Callback packets arriving at the server.
    pub ignored_non_request: u64,
    /// Retransmissions answered from reply history.
    pub replayed: u64,
    /// Requests that ran a handler, including those that failed.
    pub executed: u64,
    /// Executed requests answered with an Error packet.
    pub error_replies: u64,
    /// Callback packets addressed to subscribers.
    pub callbacks_sent: u64,
}

impl DispatchStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            ignored_non_request: self.ignored_non_request.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            error_replies: self.error_replies.load(Ordering::Relaxed),
            callbacks_sent: self.callbacks_sent.load(Ordering::Relaxed),
        }
    }
}

/// Server request pipeline, generic over the session key `P` (the transport
/// peer address) and the account backend `S`.
///
/// All state is internally synchronized, so one dispatcher can be shared
/// across worker threads. Two copies of one request are serialized on their
/// session slot, but only while that slot stays in the bounded history: if
/// the session is evicted while a worker still holds the old slot, the next
/// copy gets a fresh slot and may execute again. Size `max_sessions` above
/// the number of concurrently active peers when serving from several threads.
pub struct Dispatcher<P: Hash + Eq, S = Ledger> {
    service: S,
    semantics: InvocationSemantics<P>,
    subscriptions: SubscriptionRegistry<P>,
    stats: DispatchStats,
}

impl<P, S> Dispatcher<P, S>
where
    P: Clone + Eq + Hash + Debug,
    S: AccountService,
{
    pub fn new(service: S, config: &NodeConfig) -> Self {
        Self {
            service,
            semantics: InvocationSemantics::new(config.max_sessions),
            subscriptions: SubscriptionRegistry::default(),
            stats: DispatchStats::default(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn semantics(&self) -> &InvocationSemantics<P> {
        &self.semantics
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry<P> {
        &self.subscriptions
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Runs one inbound datagram from `peer` through decode, duplicate check,
    /// execution, history recording, and subscriber fan-out.
    pub fn handle_datagram(&self, peer: &P, datagram: &[u8], now: Instant) -> DispatchOutcome<P> {
        DispatchStats::bump(&self.stats.received, 1);

        let request = match decode_packet(datagram) {
            Ok(packet) => packet,
            Err(err) => {
                DispatchStats::bump(&self.stats.malformed, 1);
                debug!("dropping {} byte datagram from {:?}: {err}", datagram.len(), peer);
                return DispatchOutcome::Dropped(DropReason::Malformed);
            }
        };
        trace_packet("RECV", peer, &request);

        if request.kind != MessageKind::Request {
            DispatchStats::bump(&self.stats.ignored_non_request, 1);
            debug!("ignoring {} packet from {:?}", request.kind.name(), peer);
            return DispatchOutcome::Dropped(DropReason::NotRequest(request.kind));
        }

        if classify(request.operation) == Idempotency::Idempotent {
            return match self.execute(peer, &request, now) {
                Ok(executed) => self.finish(executed, now),
                Err(reason) => DispatchOutcome::Dropped(reason),
            };
        }

        // A body that will be dropped must not claim or evict a history slot.
        if let Err(err) = validate_request_body(request.operation, &request.body) {
            return DispatchOutcome::Dropped(self.malformed_body(peer, &request, &err));
        }

        // The slot stays locked until the reply is recorded, so two copies
        // of one request can never both execute.
        let session = self.semantics.session(peer);
        let mut slot = lock(&session);
        match slot.check_duplicate(request.request_id, request.operation) {
            DuplicateCheck::Replay(reply) => {
                DispatchStats::bump(&self.stats.replayed, 1);
                debug!(
                    "replaying cached reply for {:?} request {}",
                    peer, request.request_id
                );
                DispatchOutcome::Replayed(reply)
            }
            DuplicateCheck::Execute => match self.execute(peer, &request, now) {
                Ok(executed) => {
                    slot.record_result(request.request_id, request.operation, &executed.reply);
                    self.finish(executed, now)
                }
                Err(reason) => DispatchOutcome::Dropped(reason),
            },
        }
    }

    /// Runs the handler and encodes its reply. Body decode failures become a
    /// drop; service failures become an Error reply.
    fn execute(&self, peer: &P, request: &Packet, now: Instant) -> Result<Executed, DropReason> {
        let (reply, events) = match self.run_handler(peer, request, now) {
            Ok(handled) => (Packet::reply_to(request, handled.body), handled.events),
            Err(HandleError::Format(err)) => {
                return Err(self.malformed_body(peer, request, &err));
            }
            Err(HandleError::Service(err)) => {
                DispatchStats::bump(&self.stats.error_replies, 1);
                (Packet::error_to(request, err.to_string()), Vec::new())
            }
        };
        DispatchStats::bump(&self.stats.executed, 1);
        trace_packet("SEND", peer, &reply);
        Ok(Executed {
            reply: encode_packet(&reply),
            events,
        })
    }

    fn malformed_body(&self, peer: &P, request: &Packet, err: &CodecError) -> DropReason {
        DispatchStats::bump(&self.stats.malformed, 1);
        debug!(
            "dropping {} request {} from {:?}: {err}",
            Operation::name_for_code(request.operation),
            request.request_id,
            peer
        );
        DropReason::MalformedBody
    }

    /// Publishes the handler's events and addresses the callbacks.
    fn finish(&self, executed: Executed, now: Instant) -> DispatchOutcome<P> {
        let mut callbacks = Vec::new();
        for event in &executed.events {
            let notification = self.subscriptions.publish(event, now);
            for recipient in notification.recipients {
                trace_bytes("CALLBACK", &recipient, &notification.packet);
                callbacks.push((recipient, notification.packet.clone()));
            }
        }
        DispatchStats::bump(&self.stats.callbacks_sent, callbacks.len() as u64);
        DispatchOutcome::Executed {
            reply: executed.reply,
            callbacks,
        }
    }

    fn run_handler(&self, peer: &P, request: &Packet, now: Instant) -> Result<Handled, HandleError> {
        let operation = Operation::from_code(request.operation)
            .ok_or(ServiceError::UnknownOperation(request.operation))?;
        match route::<S>(operation) {
            Route::Account(handler) => handler(&self.service, &request.body),
            Route::Subscribe => self.subscribe(peer, &request.body, now),
        }
    }

    fn subscribe(&self, peer: &P, body: &[u8], now: Instant) -> Result<Handled, HandleError> {
        let req = SubscribeRequest::from_bytes(body)?;
        let duration = Duration::from_secs(u64::from(req.duration_seconds));
        self.subscriptions.subscribe(peer.clone(), duration, now);
        info!("{:?} subscribed for {} seconds", peer, req.duration_seconds);
        let reply = MessageReply::new(format!("Subscribed for {} seconds", req.duration_seconds));
        Ok(Handled {
            body: reply.to_bytes(),
            events: Vec::new(),
        })
    }

    /// Receives at most one datagram, handles it, and transmits the result:
    /// callbacks first, then the reply.
    pub fn serve_tick<A>(&self, adapter: &mut A) -> Option<DispatchOutcome<P>>
    where
        A: TransportAdapter<Peer = P>,
    {
        self.serve_tick_at(adapter, Instant::now())
    }

    /// `serve_tick` with an explicit clock, for deterministic tests.
    pub fn serve_tick_at<A>(&self, adapter: &mut A, now: Instant) -> Option<DispatchOutcome<P>>
    where
        A: TransportAdapter<Peer = P>,
    {
        let (peer, datagram) = adapter.recv()?;
        let outcome = self.handle_datagram(&peer, &datagram, now);
        for (destination, packet) in outcome.callbacks() {
            send_logged(adapter, destination, packet);
        }
        if let Some(reply) = outcome.reply() {
            send_logged(adapter, &peer, reply);
        }
        Some(outcome)
    }
}

fn send_logged<A: TransportAdapter>(adapter: &mut A, peer: &A::Peer, bytes: &[u8]) {
    if let Err(err) = adapter.send(peer, bytes) {
        warn!("send to {:?} failed: {:?}", peer, err);
    }
}

fn trace_packet(direction: &str, peer: &impl Debug, packet: &Packet) {
    debug!(
        "[{direction}] {:?} kind={} op={} req={} len={} body={}",
        peer,
        packet.kind.name(),
        Operation::name_for_code(packet.operation),
        packet.request_id,
        packet.body.len(),
        hex::encode(&packet.body)
    );
}

fn trace_bytes(direction: &str, peer: &impl Debug, bytes: &[u8]) {
    if !enabled!(Level::DEBUG) {
        return;
    }
    if let Ok(packet) = decode_packet(bytes) {
        trace_packet(direction, peer, &packet);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::{DispatchOutcome, Dispatcher, DropReason};
    use crate::config::NodeConfig;
    use crate::ledger::Ledger;
    use tally_codec::body::{
        AuthRequest, MessageReply, OpenAccountReply, OpenAccountRequest, TransactionRequest,
        WireBody,
    };
    use tally_codec::packet::{decode_packet, encode_packet, Packet};
    use tally_core::{MessageKind, Operation};

    fn dispatcher() -> Dispatcher<String> {
        Dispatcher::new(Ledger::with_seed(11), &NodeConfig::default())
    }

    fn open_request(id: u32) -> Vec<u8> {
        let body = OpenAccountRequest {
            name: "Alice".into(),
            password: "pw".into(),
            currency: 0,
            initial_balance: 1000.0,
        }
        .to_bytes();
        encode_packet(&Packet::request(id, Operation::Open, body))
    }

    #[test]
    fn short_datagram_is_dropped_silently() {
        let d = dispatcher();
        let out = d.handle_datagram(&"c".into(), &[0, 0, 0], Instant::now());
        assert_eq!(out, DispatchOutcome::Dropped(DropReason::Malformed));
        assert_eq!(d.stats().malformed, 1);
        assert_eq!(d.semantics().session_count(), 0);
    }

    #[test]
    fn non_request_packets_are_ignored() {
        let d = dispatcher();
        let mut pkt = Packet::request(1, Operation::Open, Vec::new());
        pkt.kind = MessageKind::Reply;
        let out = d.handle_datagram(&"c".into(), &encode_packet(&pkt), Instant::now());
        assert_eq!(
            out,
            DispatchOutcome::Dropped(DropReason::NotRequest(MessageKind::Reply))
        );
        assert_eq!(d.stats().ignored_non_request, 1);
    }

    #[test]
    fn malformed_body_is_dropped_and_not_cached() {
        let d = dispatcher();
        let peer = "c".to_string();
        let bad = encode_packet(&Packet::request(5, Operation::Open, vec![0, 0]));
        assert_eq!(
            d.handle_datagram(&peer, &bad, Instant::now()),
            DispatchOutcome::Dropped(DropReason::MalformedBody)
        );
        let good = open_request(5);
        assert!(matches!(
            d.handle_datagram(&peer, &good, Instant::now()),
            DispatchOutcome::Executed { .. }
        ));
        assert_eq!(d.service().account_count(), 1);
    }

    #[test]
    fn malformed_bodies_leave_history_untouched() {
        let d = dispatcher();
        let bad = encode_packet(&Packet::request(5, Operation::Open, vec![0, 0]));
        for i in 0..100 {
            let out = d.handle_datagram(&format!("spoof-{i}"), &bad, Instant::now());
            assert_eq!(out, DispatchOutcome::Dropped(DropReason::MalformedBody));
        }
        assert_eq!(d.semantics().session_count(), 0);
        assert_eq!(d.stats().malformed, 100);
        assert_eq!(d.stats().executed, 0);
    }

    #[test]
    fn malformed_body_cannot_evict_a_live_session() {
        let config = NodeConfig {
            max_sessions: 1,
            ..NodeConfig::default()
        };
        let d: Dispatcher<String> = Dispatcher::new(Ledger::with_seed(12), &config);
        let alice = "alice".to_string();

        let opened = d.handle_datagram(&alice, &open_request(1), Instant::now());
        let reply = decode_packet(opened.reply().expect("reply")).expect("decode");
        let id = OpenAccountReply::from_bytes(&reply.body)
            .expect("body")
            .account_id;
        let body = TransactionRequest {
            name: "Alice".into(),
            password: "pw".into(),
            account_id: id,
            amount: 10.0,
        }
        .to_bytes();
        let deposit = encode_packet(&Packet::request(2, Operation::Deposit, body));
        assert!(matches!(
            d.handle_datagram(&alice, &deposit, Instant::now()),
            DispatchOutcome::Executed { .. }
        ));

        let garbage = encode_packet(&Packet::request(9, Operation::Deposit, vec![0, 0, 0, 1]));
        d.handle_datagram(&"mallory".to_string(), &garbage, Instant::now());

        assert!(matches!(
            d.handle_datagram(&alice, &deposit, Instant::now()),
            DispatchOutcome::Replayed(_)
        ));
        assert_eq!(d.service().total_balance(), 1010.0);
        assert_eq!(d.semantics().session_count(), 1);
    }

    #[test]
    fn retransmitted_open_executes_once() {
        let d = dispatcher();
        let peer = "c".to_string();
        let first = d.handle_datagram(&peer, &open_request(101), Instant::now());
        let first_reply = first.reply().expect("reply").to_vec();
        for _ in 0..3 {
            let again = d.handle_datagram(&peer, &open_request(101), Instant::now());
            assert_eq!(again, DispatchOutcome::Replayed(first_reply.clone()));
        }
        assert_eq!(d.service().account_count(), 1);
        let stats = d.stats();
        assert_eq!((stats.executed, stats.replayed), (1, 3));
    }

    #[test]
    fn unknown_operation_gets_cached_error_reply() {
        let d = dispatcher();
        let peer = "c".to_string();
        let mut pkt = Packet::request(9, Operation::Open, Vec::new());
        pkt.operation = 42;
        let bytes = encode_packet(&pkt);

        let out = d.handle_datagram(&peer, &bytes, Instant::now());
        let reply = decode_packet(out.reply().expect("reply")).expect("decode");
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.operation, 42);
        assert_eq!(
            MessageReply::from_bytes(&reply.body).expect("body").message,
            "unknown operation 42"
        );
        assert!(matches!(
            d.handle_datagram(&peer, &bytes, Instant::now()),
            DispatchOutcome::Replayed(_)
        ));
    }

    #[test]
    fn balance_inquiry_is_never_recorded() {
        let d = dispatcher();
        let peer = "c".to_string();
        let opened = d.handle_datagram(&peer, &open_request(1), Instant::now());
        let reply = decode_packet(opened.reply().expect("reply")).expect("decode");
        let id = OpenAccountReply::from_bytes(&reply.body)
            .expect("body")
            .account_id;

        let body = AuthRequest {
            name: "Alice".into(),
            password: "pw".into(),
            account_id: id,
        }
        .to_bytes();
        let check = encode_packet(&Packet::request(1, Operation::CheckBalance, body));
        for _ in 0..2 {
            assert!(matches!(
                d.handle_datagram(&peer, &check, Instant::now()),
                DispatchOutcome::Executed { .. }
            ));
        }
        assert_eq!(d.stats().replayed, 0);
    }
}
