use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::adapter::{TransportAdapter, TransportHealthSnapshot};

#[derive(Debug, Clone)]
pub struct UdpAdapterConfig {
    pub bind_addr: String,
    /// How long `recv` blocks before returning `None`. `None` blocks forever.
    pub recv_timeout: Option<Duration>,
    /// Receive buffer size; longer datagrams are truncated by the OS.
    pub max_datagram_bytes: usize,
}

impl UdpAdapterConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            recv_timeout: Some(Duration::from_millis(200)),
            max_datagram_bytes: 4096,
        }
    }
}

#[derive(Debug, Error)]
pub enum UdpAdapterError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("failed to configure socket: {0}")]
    Configure(io::Error),
    #[error("send failed: {0}")]
    Send(io::Error),
    #[error("short write: sent {sent} of {len} bytes")]
    ShortWrite { sent: usize, len: usize },
}

/// Blocking `std::net::UdpSocket` adapter with a bounded receive poll.
#[derive(Debug)]
pub struct UdpAdapter {
    socket: UdpSocket,
    buf: Vec<u8>,
    send_ok: u64,
    send_err: u64,
    recv_ok: u64,
    last_error: Option<String>,
}

impl UdpAdapter {
    pub fn bind(config: UdpAdapterConfig) -> Result<Self, UdpAdapterError> {
        let socket = UdpSocket::bind(&config.bind_addr).map_err(|source| UdpAdapterError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(config.recv_timeout)
            .map_err(UdpAdapterError::Configure)?;
        Ok(Self {
            socket,
            buf: vec![0_u8; config.max_datagram_bytes.max(1)],
            send_ok: 0,
            send_err: 0,
            recv_ok: 0,
            last_error: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Changes the receive poll window after construction.
    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), UdpAdapterError> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(UdpAdapterError::Configure)
    }
}

/// Resolves `host:port` to the first socket address.
pub fn resolve_peer(addr: &str) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address resolved for {addr}"),
        )
    })
}

impl TransportAdapter for UdpAdapter {
    type Peer = SocketAddr;
    type Error = UdpAdapterError;

    fn send(&mut self, peer: &Self::Peer, bytes: &[u8]) -> Result<(), Self::Error> {
        match self.socket.send_to(bytes, peer) {
            Ok(sent) if sent == bytes.len() => {
                self.send_ok += 1;
                Ok(())
            }
            Ok(sent) => {
                self.send_err += 1;
                Err(UdpAdapterError::ShortWrite {
                    sent,
                    len: bytes.len(),
                })
            }
            Err(err) => {
                self.send_err += 1;
                self.last_error = Some(err.to_string());
                Err(UdpAdapterError::Send(err))
            }
        }
    }

    fn recv(&mut self) -> Option<(Self::Peer, Vec<u8>)> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((len, peer)) => {
                self.recv_ok += 1;
                Some((peer, self.buf[..len].to_vec()))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                None
            }
            Err(err) => {
                warn!("udp recv failed: {err}");
                self.last_error = Some(err.to_string());
                None
            }
        }
    }

    fn health_snapshot(&self) -> TransportHealthSnapshot {
        TransportHealthSnapshot {
            outbound_send_ok: self.send_ok,
            outbound_send_err: self.send_err,
            outbound_dropped: 0,
            inbound_received: self.recv_ok,
            inbound_dropped: 0,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{resolve_peer, UdpAdapter, UdpAdapterConfig};
    use crate::adapter::TransportAdapter;

    fn loopback() -> UdpAdapter {
        let mut config = UdpAdapterConfig::new("127.0.0.1:0");
        config.recv_timeout = Some(Duration::from_millis(500));
        UdpAdapter::bind(config).expect("bind loopback")
    }

    #[test]
    fn loopback_datagram_round_trips_with_source_address() {
        let mut a = loopback();
        let mut b = loopback();
        let b_addr = b.local_addr().expect("addr");
        let a_addr = a.local_addr().expect("addr");

        a.send(&b_addr, &[1, 2, 3]).expect("send");
        let (from, bytes) = b.recv().expect("datagram should arrive on loopback");
        assert_eq!(from, a_addr);
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(a.health_snapshot().outbound_send_ok, 1);
        assert_eq!(b.health_snapshot().inbound_received, 1);
    }

    #[test]
    fn recv_times_out_with_none() {
        let mut a = loopback();
        a.set_recv_timeout(Some(Duration::from_millis(20)))
            .expect("timeout");
        assert!(a.recv().is_none());
    }

    #[test]
    fn bind_error_names_address() {
        let err = UdpAdapter::bind(UdpAdapterConfig::new("not-an-address"))
            .expect_err("invalid address must fail");
        assert!(err.to_string().contains("not-an-address"));
    }

    #[test]
    fn resolve_peer_handles_literal_addresses() {
        let addr = resolve_peer("127.0.0.1:8080").expect("resolve");
        assert_eq!(addr.port(), 8080);
    }
}
