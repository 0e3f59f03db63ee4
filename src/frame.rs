// src/frame.rs
//! Frame buffers and the two-slot arena the scheduler ping-pongs between.
//!
//! A `FrameBuffer` is moved, never shared: the scheduler takes it out of its
//! slot, sends it to a stage, and puts it back when the stage returns it.
//! Which slot is "filling" and which is "sending" is a single index that
//! flips every iteration.

use anyhow::{bail, Result};

/// One frame of RGB bytes (3 per pixel, coordinate-table order), tagged
/// with the arena slot it belongs to.
#[derive(Debug)]
pub struct FrameBuffer {
    slot: usize,
    pixels: Box<[u8]>,
}

impl FrameBuffer {
    pub(crate) fn new(slot: usize, len: usize) -> Self {
        Self {
            slot,
            pixels: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Arena slot this buffer lives in (0 or 1).
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len() / 3
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

/// Which stage a slot currently serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Filling,
    Sending,
}

/// Two frame buffers and the role flag that decides who gets which.
#[derive(Debug)]
pub struct BufferArena {
    slots: [Option<FrameBuffer>; 2],
    filling: usize,
}

impl BufferArena {
    /// Allocates two zeroed buffers of `frame_len` bytes each.
    pub fn new(frame_len: usize) -> Self {
        Self {
            slots: [
                Some(FrameBuffer::new(0, frame_len)),
                Some(FrameBuffer::new(1, frame_len)),
            ],
            filling: 0,
        }
    }

    /// Slot index currently assigned to `role`.
    pub fn slot_for(&self, role: Role) -> usize {
        match role {
            Role::Filling => self.filling,
            Role::Sending => 1 - self.filling,
        }
    }

    /// Takes the buffer for `role` out of the arena.
    pub fn take(&mut self, role: Role) -> Result<FrameBuffer> {
        let slot = self.slot_for(role);
        match self.slots[slot].take() {
            Some(buffer) => Ok(buffer),
            None => bail!("{:?} buffer (slot {}) is already checked out", role, slot),
        }
    }

    /// Returns a buffer to the arena. It must come back as the `role` it left as.
    pub fn put_back(&mut self, role: Role, buffer: FrameBuffer) -> Result<()> {
        let slot = self.slot_for(role);
        if buffer.slot != slot {
            bail!(
                "{:?} stage returned buffer from slot {}, expected slot {}",
                role,
                buffer.slot,
                slot
            );
        }
        if self.slots[slot].is_some() {
            bail!("slot {} is already occupied", slot);
        }
        self.slots[slot] = Some(buffer);
        Ok(())
    }

    /// Flips the roles: the buffer just filled is sent next.
    pub fn swap(&mut self) {
        self.filling = 1 - self.filling;
    }

    /// Read access to a resident buffer, used by tests and diagnostics.
    pub fn peek(&self, role: Role) -> Option<&FrameBuffer> {
        self.slots[self.slot_for(role)].as_ref()
    }
}
