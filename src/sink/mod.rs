// src/sink/mod.rs
//! Output sinks: where finished frames go.
//!
//! Two implementations share the `OutputSink` interface:
//! - `opc::NetworkSink` streams frames to an Open Pixel Control server
//! - `spi::HardwareSink` bit-packs frames for an LPD8806 strand on SPI
//!
//! A sink reports what happened to each frame via `Delivery`. Transient
//! failures are absorbed inside the sink and show up as `Delivery::Dropped`;
//! an `Err` means the sink cannot continue and the pump must stop.

pub mod opc;
pub mod spi;

use anyhow::Result;
use std::fmt;

pub use opc::NetworkSink;
pub use spi::HardwareSink;

/// Destination string that selects the SPI strand instead of a server.
pub const SPI_MAGIC_WORD: &str = "SPI";

/// Outcome of delivering one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
}

/// Consumes frames. Runs on the sink stage thread.
///
/// `deliver` must return in bounded time; it is the only thing standing
/// between a dead link and a stalled scheduler.
pub trait OutputSink: Send {
    fn name(&self) -> &str;

    fn deliver(&mut self, frame: &[u8]) -> Result<Delivery>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver(&mut self, frame: &[u8]) -> Result<Delivery> {
        (**self).deliver(frame)
    }
}

/// Where frames should go, parsed from the destination argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// OPC server at `host:port`.
    Network(String),
    /// The SPI strand.
    Hardware,
}

impl OutputTarget {
    /// `SPI` selects the strand; anything else is an address, with
    /// `default_port` appended when it has no port of its own.
    pub fn parse(destination: &str, default_port: u16) -> Self {
        let destination = destination.trim();
        if destination == SPI_MAGIC_WORD {
            OutputTarget::Hardware
        } else if destination.contains(':') {
            OutputTarget::Network(destination.to_string())
        } else {
            OutputTarget::Network(format!("{}:{}", destination, default_port))
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Network(addr) => write!(f, "opc://{}", addr),
            OutputTarget::Hardware => write!(f, "spi"),
        }
    }
}
