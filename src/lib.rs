// src/lib.rs
//! pixel-pump: drives 3-D arrays of addressable RGB pixels from a frame
//! generator, over Open Pixel Control (TCP) or an SPI-attached LED strand.
//!
//! The frame pump is built from three actors:
//! - a generator stage thread that fills pixel buffers
//! - a sink stage thread that ships them (network or hardware)
//! - the scheduler loop that owns both buffers and swaps their roles
//!
//! Buffers move between actors over rendezvous channels, so only one actor
//! can touch a given buffer at any time.

pub mod color;
pub mod config;
pub mod frame;
pub mod generator;
pub mod layout;
pub mod patterns;
pub mod scheduler;
pub mod signals;
pub mod sink;
pub mod stage;

pub use config::Config;
pub use frame::{BufferArena, FrameBuffer};
pub use generator::{ControlSnapshot, FrameContext, FrameGenerator, InputSource, NoInput};
pub use layout::{Bounds, CoordinateTable, Point};
pub use scheduler::{FrameScheduler, RunBudget, RunSummary, StopSignal};
pub use sink::{Delivery, OutputSink, OutputTarget};
pub use stage::{spawn_generator_stage, spawn_sink_stage, StageHandle};
