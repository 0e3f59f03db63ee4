// src/generator.rs
//! Frame generator contract.
//!
//! A generator computes one frame of colors per call. It runs on the
//! generator stage thread (see `stage.rs`), which hands it a fresh
//! `FrameContext` and the filling buffer for every frame. Generators keep
//! their own state between frames; live control input reaches them only
//! through the per-frame `ControlSnapshot`.

use crate::layout::{Bounds, CoordinateTable};
use std::time::Duration;

/// Number of MIDI keys tracked in a snapshot.
pub const KEY_COUNT: usize = 128;

/// Copy of the live control-surface state, taken once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSnapshot {
    /// Knob/fader positions in `0.0..=1.0`, by controller index.
    pub knobs: Vec<f64>,
    /// Note-on velocities in `0.0..=1.0`, by key number. 0 is released.
    pub keys: [f64; KEY_COUNT],
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            knobs: Vec::new(),
            keys: [0.0; KEY_COUNT],
        }
    }
}

impl ControlSnapshot {
    /// Knob value, or `default` when the controller has no such knob.
    pub fn knob(&self, index: usize, default: f64) -> f64 {
        self.knobs.get(index).copied().unwrap_or(default)
    }
}

/// Source of control snapshots (MIDI, OSC, a UI...). Ingestion lives
/// outside this crate; implementors only need to hand out copies.
pub trait InputSource: Send {
    fn snapshot(&mut self) -> ControlSnapshot;
}

/// Input source for installations without a controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputSource for NoInput {
    fn snapshot(&mut self) -> ControlSnapshot {
        ControlSnapshot::default()
    }
}

/// Everything a generator may read while filling one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub coords: &'a CoordinateTable,
    pub bounds: &'a Bounds,
    /// Time since the generator stage started.
    pub elapsed: Duration,
    /// Sequence number of this frame, starting at 0.
    pub frame: u64,
    pub input: &'a ControlSnapshot,
}

/// Fills frame buffers with colors.
///
/// `fill` must overwrite every byte of `frame` (`3 * coords.len()` bytes,
/// RGB per pixel) and must not block indefinitely: a hung generator stalls
/// the whole pump.
pub trait FrameGenerator: Send {
    fn name(&self) -> &str;

    fn fill(&mut self, ctx: &FrameContext<'_>, frame: &mut [u8]);
}

impl<G: FrameGenerator + ?Sized> FrameGenerator for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fill(&mut self, ctx: &FrameContext<'_>, frame: &mut [u8]) {
        (**self).fill(ctx, frame)
    }
}
