use tally_transport::udp::UdpAdapterConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Sessions whose reply slot is retained; least recently used sessions
    /// are forgotten first. `0` keeps every session.
    pub max_sessions: usize,
    /// Largest datagram the node will read. Longer datagrams are truncated by
    /// the socket and usually fail to decode.
    pub max_datagram_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            max_sessions: 65_536,
            max_datagram_bytes: 4096,
        }
    }
}

impl NodeConfig {
    /// UDP socket settings for serving on `bind_addr` with this config.
    pub fn udp_config(&self, bind_addr: impl Into<String>) -> UdpAdapterConfig {
        let mut udp = UdpAdapterConfig::new(bind_addr);
        udp.max_datagram_bytes = self.max_datagram_bytes;
        udp
    }
}
