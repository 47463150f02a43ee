//! Caller side of the tally protocol.
//!
//! The server guarantees at-most-once execution per request id, so the client
//! may retransmit freely: every attempt of one call reuses the same id.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tally_codec::body::{
    AuthRequest, BalanceReply, BalanceUpdate, MessageReply, OpenAccountReply, OpenAccountRequest,
    SubscribeRequest, TransactionRequest, TransferRequest, WireBody,
};
use tally_codec::error::CodecError;
use tally_codec::packet::{decode_packet, encode_packet, Packet};
use tally_core::{AccountId, Currency, MessageKind, Operation, RequestId};
use tally_transport::adapter::TransportAdapter;
use tally_transport::udp::{resolve_peer, UdpAdapter, UdpAdapterConfig, UdpAdapterError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an Error packet.
    #[error("server error: {0}")]
    Server(String),
    #[error("no reply after {attempts} attempts")]
    Timeout { attempts: u32 },
    #[error("malformed reply: {0}")]
    Codec(#[from] CodecError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cannot resolve server address {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Udp(#[from] UdpAdapterError),
}

/// Retransmission policy for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long to wait for a reply before retransmitting.
    pub attempt_timeout: Duration,
    /// Total sends per call, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

/// Request/reply client over any datagram transport.
///
/// Callbacks that arrive while a call is waiting are queued and can be read
/// with `take_callbacks` or `poll_callback`.
pub struct RpcClient<A: TransportAdapter> {
    adapter: A,
    server: A::Peer,
    policy: RetryPolicy,
    next_request_id: RequestId,
    callbacks: VecDeque<BalanceUpdate>,
}

impl RpcClient<UdpAdapter> {
    /// Binds an ephemeral UDP socket and targets `server_addr`.
    pub fn connect_udp(server_addr: &str, policy: RetryPolicy) -> Result<Self, ClientError> {
        let server = resolve_peer(server_addr).map_err(|source| ClientError::Resolve {
            addr: server_addr.to_string(),
            source,
        })?;
        let bind = if server.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let mut config = UdpAdapterConfig::new(bind);
        config.recv_timeout = Some(policy.attempt_timeout.min(Duration::from_millis(100)));
        let adapter = UdpAdapter::bind(config)?;
        Ok(Self::new(adapter, server, policy))
    }
}

impl<A: TransportAdapter> RpcClient<A> {
    pub fn new(adapter: A, server: A::Peer, policy: RetryPolicy) -> Self {
        Self {
            adapter,
            server,
            policy,
            next_request_id: 0,
            callbacks: VecDeque::new(),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Id the next call will use.
    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id
    }

    /// Sends one request and waits for the matching Reply or Error packet,
    /// retransmitting on timeout. Error packets are returned, not converted.
    pub fn call(&mut self, operation: Operation, body: Vec<u8>) -> Result<Packet, ClientError> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let bytes = encode_packet(&Packet::request(request_id, operation, body));

        for attempt in 1..=self.policy.max_attempts {
            debug!(
                "sending {} request {request_id} (attempt {attempt}/{})",
                operation.name(),
                self.policy.max_attempts
            );
            self.adapter
                .send(&self.server, &bytes)
                .map_err(|err| ClientError::Transport(format!("{err:?}")))?;
            if let Some(reply) = self.await_reply(request_id, self.policy.attempt_timeout) {
                return Ok(reply);
            }
            debug!("request {request_id} timed out");
        }
        Err(ClientError::Timeout {
            attempts: self.policy.max_attempts,
        })
    }

    fn await_reply(&mut self, request_id: RequestId, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let Some(packet) = self.recv_from_server() else {
                continue;
            };
            match packet.kind {
                MessageKind::Reply | MessageKind::Error if packet.request_id == request_id => {
                    return Some(packet);
                }
                MessageKind::Callback => self.queue_callback(&packet),
                _ => debug!(
                    "ignoring stale {} for request {}",
                    packet.kind.name(),
                    packet.request_id
                ),
            }
        }
        None
    }

    fn recv_from_server(&mut self) -> Option<Packet> {
        let (peer, bytes) = self.adapter.recv()?;
        if peer != self.server {
            debug!("ignoring datagram from unexpected peer {:?}", peer);
            return None;
        }
        match decode_packet(&bytes) {
            Ok(packet) => Some(packet),
            Err(err) => {
                debug!("ignoring malformed datagram: {err}");
                None
            }
        }
    }

    fn queue_callback(&mut self, packet: &Packet) {
        match BalanceUpdate::from_bytes(&packet.body) {
            Ok(update) => self.callbacks.push_back(update),
            Err(err) => debug!("ignoring malformed callback: {err}"),
        }
    }

    /// Drains callbacks received so far.
    pub fn take_callbacks(&mut self) -> Vec<BalanceUpdate> {
        self.callbacks.drain(..).collect()
    }

    /// Returns the next callback, waiting up to `wait` for one to arrive.
    pub fn poll_callback(&mut self, wait: Duration) -> Option<BalanceUpdate> {
        if let Some(update) = self.callbacks.pop_front() {
            return Some(update);
        }
        let deadline = Instant::now() + wait;
        while Instant::now() < deadline {
            if let Some(packet) = self.recv_from_server() {
                if packet.kind == MessageKind::Callback {
                    self.queue_callback(&packet);
                }
            }
            if let Some(update) = self.callbacks.pop_front() {
                return Some(update);
            }
        }
        None
    }

    fn call_ok(&mut self, operation: Operation, body: Vec<u8>) -> Result<Packet, ClientError> {
        let reply = self.call(operation, body)?;
        if reply.kind == MessageKind::Error {
            let message = MessageReply::from_bytes(&reply.body)?.message;
            return Err(ClientError::Server(message));
        }
        Ok(reply)
    }

    pub fn open_account(
        &mut self,
        name: &str,
        password: &str,
        currency: Currency,
        initial_balance: f64,
    ) -> Result<AccountId, ClientError> {
        let body = OpenAccountRequest {
            name: name.to_string(),
            password: password.to_string(),
            currency: currency.code(),
            initial_balance,
        };
        let reply = self.call_ok(Operation::Open, body.to_bytes())?;
        Ok(OpenAccountReply::from_bytes(&reply.body)?.account_id)
    }

    /// Returns the server's confirmation text.
    pub fn close_account(
        &mut self,
        name: &str,
        password: &str,
        account_id: AccountId,
    ) -> Result<String, ClientError> {
        let body = auth(name, password, account_id);
        let reply = self.call_ok(Operation::Close, body.to_bytes())?;
        Ok(MessageReply::from_bytes(&reply.body)?.message)
    }

    pub fn deposit(
        &mut self,
        name: &str,
        password: &str,
        account_id: AccountId,
        amount: f64,
    ) -> Result<f64, ClientError> {
        self.transaction(Operation::Deposit, name, password, account_id, amount)
    }

    pub fn withdraw(
        &mut self,
        name: &str,
        password: &str,
        account_id: AccountId,
        amount: f64,
    ) -> Result<f64, ClientError> {
        self.transaction(Operation::Withdraw, name, password, account_id, amount)
    }

    fn transaction(
        &mut self,
        operation: Operation,
        name: &str,
        password: &str,
        account_id: AccountId,
        amount: f64,
    ) -> Result<f64, ClientError> {
        let body = TransactionRequest {
            name: name.to_string(),
            password: password.to_string(),
            account_id,
            amount,
        };
        let reply = self.call_ok(operation, body.to_bytes())?;
        Ok(BalanceReply::from_bytes(&reply.body)?.balance)
    }

    pub fn check_balance(
        &mut self,
        name: &str,
        password: &str,
        account_id: AccountId,
    ) -> Result<f64, ClientError> {
        let body = auth(name, password, account_id);
        let reply = self.call_ok(Operation::CheckBalance, body.to_bytes())?;
        Ok(BalanceReply::from_bytes(&reply.body)?.balance)
    }

    /// Returns the sender's balance after the transfer.
    pub fn transfer(
        &mut self,
        name: &str,
        password: &str,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: f64,
    ) -> Result<f64, ClientError> {
        let body = TransferRequest {
            name: name.to_string(),
            password: password.to_string(),
            sender_id,
            receiver_id,
            amount,
        };
        let reply = self.call_ok(Operation::Transfer, body.to_bytes())?;
        Ok(BalanceReply::from_bytes(&reply.body)?.balance)
    }

    /// Registers this client's address for callbacks; returns the
    /// acknowledgment text.
    pub fn subscribe(&mut self, duration_seconds: u32) -> Result<String, ClientError> {
        let body = SubscribeRequest { duration_seconds };
        let reply = self.call_ok(Operation::Subscribe, body.to_bytes())?;
        Ok(MessageReply::from_bytes(&reply.body)?.message)
    }
}

fn auth(name: &str, password: &str, account_id: AccountId) -> AuthRequest {
    AuthRequest {
        name: name.to_string(),
        password: password.to_string(),
        account_id,
    }
}
