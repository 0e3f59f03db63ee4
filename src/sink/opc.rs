// src/sink/opc.rs
//! Open Pixel Control client sink.
//!
//! Each frame goes out as a 4-byte header followed by the raw RGB payload:
//!
//! ```text
//! [channel][command][len_hi][len_lo][r g b r g b ...]
//! ```
//!
//! Channel and command are always 0 (broadcast, set pixel colors). Nothing
//! is ever read back from the server.
//!
//! The sink owns its connection and heals it on its own. A failed dial drops
//! the frame and opens a quiet period (`retry_interval`) during which frames
//! are dropped without dialing, so a missing server never slows the
//! generator down. A failed write drops the frame and the socket; the next
//! frame dials again.

use super::{Delivery, OutputSink};
use crate::config::NetworkConfig;
use anyhow::Result;
use log::*;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

pub const OPC_HEADER_LEN: usize = 4;

/// Broadcast channel: every strand on the server.
pub const OPC_BROADCAST_CHANNEL: u8 = 0;
/// "Set 8-bit pixel colors".
pub const OPC_SET_PIXELS: u8 = 0;

/// Builds an OPC header. The length field is 16 bits, so payloads of 64 KiB
/// or more wrap (65536 encodes as 0).
pub fn opc_header(channel: u8, command: u8, payload_len: usize) -> [u8; OPC_HEADER_LEN] {
    let [len_hi, len_lo] = ((payload_len % 65536) as u16).to_be_bytes();
    [channel, command, len_hi, len_lo]
}

/// Opens byte streams to a server. `TcpConnector` is the real one; tests
/// substitute scripted connectors.
pub trait Connector: Send {
    type Stream: Write + Send;

    fn connect(&mut self, addr: &str) -> io::Result<Self::Stream>;
}

/// Dials TCP with bounded connect and write times.
///
/// Name resolution has no timeout of its own, so the resolved addresses are
/// cached: a lookup only runs until one succeeds. A server that moves to a
/// new address needs a restart.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    write_timeout: Duration,
    resolved: Option<(String, Vec<SocketAddr>)>,
}

impl TcpConnector {
    /// A zero duration leaves the corresponding operation unbounded.
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            write_timeout,
            resolved: None,
        }
    }

    /// Addresses for `addr`, looked up on first use and cached afterwards.
    pub fn resolve(&mut self, addr: &str) -> io::Result<&[SocketAddr]> {
        let cached = matches!(&self.resolved, Some((name, _)) if name == addr);
        if !cached {
            let socket_addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
            if socket_addrs.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve to any address", addr),
                ));
            }
            debug!("TcpConnector: {} resolved to {:?}", addr, socket_addrs);
            self.resolved = Some((addr.to_string(), socket_addrs));
        }
        Ok(self
            .resolved
            .as_ref()
            .map(|(_, socket_addrs)| socket_addrs.as_slice())
            .unwrap_or_default())
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self, addr: &str) -> io::Result<TcpStream> {
        let (connect_timeout, write_timeout) = (self.connect_timeout, self.write_timeout);
        let mut last_err = None;
        for &socket_addr in self.resolve(addr)? {
            let attempt = if connect_timeout.is_zero() {
                TcpStream::connect(socket_addr)
            } else {
                TcpStream::connect_timeout(&socket_addr, connect_timeout)
            };
            match attempt {
                Ok(stream) => {
                    if !write_timeout.is_zero() {
                        stream.set_write_timeout(Some(write_timeout))?;
                    }
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("TcpConnector: {} failed: {}", socket_addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", addr),
            )
        }))
    }
}

/// How hard to try when the server is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Dials per disconnected frame. Values below 1 are treated as 1.
    pub attempts: u32,
    /// Pause between dials of the same frame.
    pub attempt_backoff: Duration,
    /// Quiet period after the last failed dial.
    pub retry_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for ReconnectPolicy {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            attempts: config.connect_attempts,
            attempt_backoff: config.attempt_backoff(),
            retry_interval: config.retry_interval(),
        }
    }
}

#[derive(Debug)]
pub enum ConnectionState<S> {
    Disconnected,
    Connected(S),
}

/// Counters kept by the network sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub delivered: u64,
    pub dropped: u64,
    pub connects: u64,
    pub failed_dials: u64,
}

/// OPC client. Generic over the connector so the reconnect logic can be
/// driven without a network.
pub struct NetworkSink<C: Connector = TcpConnector> {
    addr: String,
    connector: C,
    policy: ReconnectPolicy,
    state: ConnectionState<C::Stream>,
    retry_after: Option<Instant>,
    stats: SinkStats,
}

impl NetworkSink<TcpConnector> {
    /// TCP sink for `addr` (`host:port`) with the policy and timeouts from `config`.
    pub fn tcp(addr: impl Into<String>, config: &NetworkConfig) -> Self {
        let addr = addr.into();
        let mut connector = TcpConnector::new(config.connect_timeout(), config.write_timeout());
        // Look the name up now rather than on the first frame; a failure here
        // is retried on the next dial.
        if let Err(e) = connector.resolve(&addr) {
            warn!("NetworkSink: could not resolve {}: {}", addr, e);
        }
        Self::with_connector(addr, connector, ReconnectPolicy::from(config))
    }
}

impl<C: Connector> NetworkSink<C> {
    pub fn with_connector(addr: impl Into<String>, connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            addr: addr.into(),
            connector,
            policy,
            state: ConnectionState::Disconnected,
            retry_after: None,
            stats: SinkStats::default(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Dials if needed and allowed. Returns whether a connection is held.
    fn ensure_connected(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        if let Some(retry_after) = self.retry_after {
            if Instant::now() < retry_after {
                return false;
            }
        }

        info!("NetworkSink: connecting to {}...", self.addr);
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            match self.connector.connect(&self.addr) {
                Ok(stream) => {
                    info!("NetworkSink: connected to {}", self.addr);
                    self.state = ConnectionState::Connected(stream);
                    self.retry_after = None;
                    self.stats.connects += 1;
                    return true;
                }
                Err(e) => {
                    self.stats.failed_dials += 1;
                    warn!(
                        "NetworkSink: dial {}/{} to {} failed: {}",
                        attempt, attempts, self.addr, e
                    );
                    if attempt < attempts {
                        thread::sleep(self.policy.attempt_backoff);
                    }
                }
            }
        }

        info!(
            "NetworkSink: waiting {:?} before retrying {}",
            self.policy.retry_interval, self.addr
        );
        self.retry_after = Some(Instant::now() + self.policy.retry_interval);
        false
    }

    fn drop_frame(&mut self) -> Delivery {
        self.stats.dropped += 1;
        trace!("NetworkSink: frame dropped ({} so far)", self.stats.dropped);
        Delivery::Dropped
    }
}

impl<C: Connector> OutputSink for NetworkSink<C> {
    fn name(&self) -> &str {
        "opc"
    }

    fn deliver(&mut self, frame: &[u8]) -> Result<Delivery> {
        if !self.ensure_connected() {
            return Ok(self.drop_frame());
        }

        let header = opc_header(OPC_BROADCAST_CHANNEL, OPC_SET_PIXELS, frame.len());
        let written = match &mut self.state {
            ConnectionState::Connected(stream) => stream
                .write_all(&header)
                .and_then(|()| stream.write_all(frame)),
            ConnectionState::Disconnected => return Ok(self.drop_frame()),
        };

        match written {
            Ok(()) => {
                self.stats.delivered += 1;
                trace!("NetworkSink: sent {} bytes", frame.len());
                Ok(Delivery::Sent)
            }
            Err(e) => {
                warn!("NetworkSink: write to {} failed: {}", self.addr, e);
                self.state = ConnectionState::Disconnected;
                Ok(self.drop_frame())
            }
        }
    }
}
