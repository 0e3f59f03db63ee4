// src/stage.rs
//! Stage actors - one dedicated thread per pipeline stage.
//!
//! Simple hand-off pattern: receives a frame buffer, works on it, hands the
//! same buffer back. Returning the buffer *is* the completion signal, so
//! ownership always flows back to the scheduler.
//!
//! Threading model:
//! - Owns: its worker (a generator plus its inputs, or a sink)
//! - Both channels are rendezvous channels (capacity 0): a hand-off only
//!   completes when the other side is ready, so at most one frame is in
//!   flight per stage
//! - A worker error ends the thread; the scheduler picks the error up when
//!   it next talks to the stage

use crate::frame::FrameBuffer;
use crate::generator::{FrameContext, FrameGenerator, InputSource};
use crate::layout::{Bounds, CoordinateTable};
use crate::sink::{Delivery, OutputSink};
use anyhow::{anyhow, Context, Result};
use log::*;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Work done on one buffer by a stage thread.
pub trait StageWorker: Send + 'static {
    fn process(&mut self, buffer: &mut FrameBuffer) -> Result<()>;

    /// Called once when the stage shuts down cleanly.
    fn finish(&mut self) {}
}

struct StageChannels {
    work_tx: SyncSender<FrameBuffer>,
    done_rx: Receiver<FrameBuffer>,
}

/// Scheduler-side handle to a running stage.
///
/// Dropping the handle closes the stage's channels and joins its thread.
pub struct StageHandle {
    name: String,
    channels: Option<StageChannels>,
    thread_handle: Option<JoinHandle<Result<()>>>,
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hands `buffer` to the stage, blocking until the stage takes it.
    pub fn submit(&mut self, buffer: FrameBuffer) -> Result<()> {
        let sent = match &self.channels {
            Some(channels) => channels.work_tx.send(buffer).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            Err(self.failure())
        }
    }

    /// Blocks until the stage hands its buffer back.
    pub fn wait(&mut self) -> Result<FrameBuffer> {
        let received = match &self.channels {
            Some(channels) => channels.done_rx.recv().ok(),
            None => None,
        };
        match received {
            Some(buffer) => Ok(buffer),
            None => Err(self.failure()),
        }
    }

    /// Closes the stage and waits for its thread, surfacing any worker error.
    pub fn shutdown(mut self) -> Result<()> {
        self.channels.take();
        self.join()
    }

    /// Explains why the stage stopped talking.
    fn failure(&mut self) -> anyhow::Error {
        self.channels.take();
        match self.join() {
            Ok(()) => anyhow!("{} stage exited unexpectedly", self.name),
            Err(e) => e,
        }
    }

    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result.with_context(|| format!("{} stage failed", self.name)),
            Err(_) => Err(anyhow!("{} stage panicked", self.name)),
        }
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        debug!("StageHandle({}) dropped", self.name);
        self.channels.take();
        if let Err(e) = self.join() {
            error!("{:#}", e);
        }
    }
}

/// Spawns `worker` on a thread named `name`.
pub fn spawn_stage<W: StageWorker>(name: &str, worker: W) -> Result<StageHandle> {
    let (work_tx, work_rx) = sync_channel::<FrameBuffer>(0);
    let (done_tx, done_rx) = sync_channel::<FrameBuffer>(0);

    let thread_name = name.to_string();
    let thread_handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run_stage(&thread_name, worker, work_rx, done_tx))
        .with_context(|| format!("Failed to spawn {} thread", name))?;

    info!("{} stage spawned", name);
    Ok(StageHandle {
        name: name.to_string(),
        channels: Some(StageChannels { work_tx, done_rx }),
        thread_handle: Some(thread_handle),
    })
}

fn run_stage<W: StageWorker>(
    name: &str,
    mut worker: W,
    work_rx: Receiver<FrameBuffer>,
    done_tx: SyncSender<FrameBuffer>,
) -> Result<()> {
    info!("{} stage: thread started", name);

    for mut buffer in work_rx.iter() {
        trace!("{} stage: received buffer {}", name, buffer.slot());
        if let Err(e) = worker.process(&mut buffer) {
            error!("{} stage: {:#}", name, e);
            return Err(e);
        }
        if done_tx.send(buffer).is_err() {
            info!("{} stage: scheduler went away, exiting", name);
            break;
        }
    }

    worker.finish();
    info!("{} stage: thread stopped", name);
    Ok(())
}

/// Drives a `FrameGenerator` with a fresh context for every buffer.
pub struct GeneratorWorker<G, I> {
    generator: G,
    input: I,
    coords: Arc<CoordinateTable>,
    bounds: Bounds,
    started: Instant,
    frame: u64,
}

impl<G: FrameGenerator, I: InputSource> GeneratorWorker<G, I> {
    pub fn new(generator: G, input: I, coords: Arc<CoordinateTable>, bounds: Bounds) -> Self {
        Self {
            generator,
            input,
            coords,
            bounds,
            started: Instant::now(),
            frame: 0,
        }
    }
}

impl<G, I> StageWorker for GeneratorWorker<G, I>
where
    G: FrameGenerator + 'static,
    I: InputSource + 'static,
{
    fn process(&mut self, buffer: &mut FrameBuffer) -> Result<()> {
        let input = self.input.snapshot();
        let ctx = FrameContext {
            coords: self.coords.as_ref(),
            bounds: &self.bounds,
            elapsed: self.started.elapsed(),
            frame: self.frame,
            input: &input,
        };
        self.generator.fill(&ctx, buffer.as_bytes_mut());
        self.frame += 1;
        Ok(())
    }

    fn finish(&mut self) {
        info!(
            "Generator '{}' produced {} frames",
            self.generator.name(),
            self.frame
        );
    }
}

/// Hands every buffer to an `OutputSink` and tallies the outcomes.
pub struct SinkWorker<S> {
    sink: S,
    sent: u64,
    dropped: u64,
}

impl<S: OutputSink> SinkWorker<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            sent: 0,
            dropped: 0,
        }
    }
}

impl<S: OutputSink + 'static> StageWorker for SinkWorker<S> {
    fn process(&mut self, buffer: &mut FrameBuffer) -> Result<()> {
        match self.sink.deliver(buffer.as_bytes())? {
            Delivery::Sent => self.sent += 1,
            Delivery::Dropped => self.dropped += 1,
        }
        Ok(())
    }

    fn finish(&mut self) {
        info!(
            "Sink '{}': {} frames sent, {} dropped",
            self.sink.name(),
            self.sent,
            self.dropped
        );
    }
}

/// Spawns the generator stage.
pub fn spawn_generator_stage<G, I>(
    generator: G,
    input: I,
    coords: Arc<CoordinateTable>,
    bounds: Bounds,
) -> Result<StageHandle>
where
    G: FrameGenerator + 'static,
    I: InputSource + 'static,
{
    spawn_stage("generator", GeneratorWorker::new(generator, input, coords, bounds))
}

/// Spawns the sink stage.
pub fn spawn_sink_stage<S: OutputSink + 'static>(sink: S) -> Result<StageHandle> {
    spawn_stage("sink", SinkWorker::new(sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BufferArena, Role};
    use crate::generator::NoInput;
    use crate::layout::Point;
    use crate::patterns::Solid;
    use anyhow::bail;

    struct FailOnSecond {
        seen: u32,
    }

    impl StageWorker for FailOnSecond {
        fn process(&mut self, _buffer: &mut FrameBuffer) -> Result<()> {
            self.seen += 1;
            if self.seen == 2 {
                bail!("device unplugged");
            }
            Ok(())
        }
    }

    #[test_log::test]
    fn it_should_fill_and_return_the_same_buffer() -> Result<()> {
        let coords = Arc::new(CoordinateTable::new(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 1.0, 1.0),
        ]));
        let bounds = coords.bounds().unwrap();
        let mut stage = spawn_generator_stage(Solid, NoInput, coords.clone(), bounds)?;
        assert_eq!(stage.name(), "generator");

        let mut arena = BufferArena::new(coords.frame_len());
        stage.submit(arena.take(Role::Filling)?)?;
        let filled = stage.wait()?;

        assert_eq!(filled.slot(), 0);
        assert_eq!(filled.as_bytes(), &[255u8; 6]);
        arena.put_back(Role::Filling, filled)?;
        stage.shutdown()
    }

    #[test_log::test]
    fn it_should_surface_the_worker_error_on_the_next_hand_off() -> Result<()> {
        let mut stage = spawn_stage("flaky", FailOnSecond { seen: 0 })?;
        let mut arena = BufferArena::new(3);

        stage.submit(arena.take(Role::Sending)?)?;
        arena.put_back(Role::Sending, stage.wait()?)?;

        stage.submit(arena.take(Role::Sending)?)?;
        let err = stage.wait().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("flaky stage failed"), "{}", message);
        assert!(message.contains("device unplugged"), "{}", message);
        Ok(())
    }

    #[test_log::test]
    fn it_should_join_cleanly_when_dropped_idle() -> Result<()> {
        let stage = spawn_sink_stage(crate::sink::HardwareSink::new(Vec::new()))?;
        drop(stage);
        Ok(())
    }
}
