// src/scheduler.rs
//! FrameScheduler - the double-buffered frame pump.
//!
//! Each iteration hands the filling buffer to the generator stage and the
//! sending buffer to the sink stage, waits for both to come back, paces to
//! the target frame rate, then swaps the two buffers' roles. The frame the
//! generator fills in iteration `n` is the one the sink ships in `n + 1`.
//!
//! Pacing only ever slows the loop down: a slow stage makes the pump run
//! below target, with no frame skipping and no catch-up.

use crate::frame::{BufferArena, Role};
use crate::stage::StageHandle;
use anyhow::Result;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long the pump runs, and whether the sink takes part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunBudget {
    /// Run until stopped.
    Forever,
    /// Generate and send for this long.
    Timed(Duration),
    /// Generate only, unpaced, for this long. Measures generator throughput.
    Benchmark(Duration),
}

impl RunBudget {
    /// 0 runs forever, positive runs for that many seconds, negative
    /// benchmarks the generator for `-seconds`. A span too long for a
    /// `Duration` never runs out.
    pub fn from_seconds(seconds: f64) -> Self {
        if seconds.is_nan() || seconds == 0.0 {
            return RunBudget::Forever;
        }
        let limit = Duration::try_from_secs_f64(seconds.abs()).ok();
        match limit {
            Some(limit) if seconds > 0.0 => RunBudget::Timed(limit),
            None if seconds > 0.0 => RunBudget::Forever,
            limit => RunBudget::Benchmark(limit.unwrap_or(Duration::MAX)),
        }
    }

    pub fn is_benchmark(&self) -> bool {
        matches!(self, RunBudget::Benchmark(_))
    }

    pub fn limit(&self) -> Option<Duration> {
        match *self {
            RunBudget::Forever => None,
            RunBudget::Timed(limit) | RunBudget::Benchmark(limit) => Some(limit),
        }
    }
}

/// Cooperative stop flag, checked at the top of every iteration.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    /// Completed iterations.
    pub iterations: u64,
    pub frames_generated: u64,
    /// Frames handed to the sink, whether it delivered or dropped them.
    pub frames_sent: u64,
    pub elapsed: Duration,
}

/// One throughput report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsReport {
    pub frames: u32,
    pub average_frame_ms: f64,
    pub fps: f64,
}

/// Averages iteration times over fixed reporting windows.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
    frame_time: Duration,
}

impl ThroughputMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
            frame_time: Duration::ZERO,
        }
    }

    /// Records one frame that took `frame_time` and finished at `now`.
    /// Returns a report when the current window has closed.
    pub fn record(&mut self, now: Instant, frame_time: Duration) -> Option<FpsReport> {
        self.frames += 1;
        self.frame_time += frame_time;
        if now.duration_since(self.window_start) < self.interval {
            return None;
        }

        let average_frame_ms = self.frame_time.as_secs_f64() * 1000.0 / self.frames as f64;
        let report = FpsReport {
            frames: self.frames,
            average_frame_ms,
            fps: if average_frame_ms > 0.0 {
                1000.0 / average_frame_ms
            } else {
                f64::INFINITY
            },
        };
        self.window_start = now;
        self.frames = 0;
        self.frame_time = Duration::ZERO;
        Some(report)
    }
}

/// Drives a generator stage and a sink stage in lockstep.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    fps: f64,
    budget: RunBudget,
    report_interval: Duration,
    stop: StopSignal,
}

impl FrameScheduler {
    /// `fps` of 0 (or anything not positive) disables pacing.
    pub fn new(fps: f64, budget: RunBudget) -> Self {
        Self {
            fps,
            budget,
            report_interval: Duration::from_secs(1),
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Minimum iteration period, or `None` when unpaced. Rates too slow to
    /// express saturate at `Duration::MAX`.
    pub fn frame_budget(&self) -> Option<Duration> {
        if self.fps > 0.0 && self.fps.is_finite() {
            Some(Duration::try_from_secs_f64(1.0 / self.fps).unwrap_or(Duration::MAX))
        } else {
            None
        }
    }

    /// Runs the pump over two buffers of `frame_len` bytes.
    ///
    /// Returns when the run budget is spent or the stop signal is raised.
    /// Errors only when a stage has died; the stage's own error is returned.
    pub fn run(
        &self,
        frame_len: usize,
        generator: &mut StageHandle,
        sink: &mut StageHandle,
    ) -> Result<RunSummary> {
        let benchmark = self.budget.is_benchmark();
        let pacing = if benchmark { None } else { self.frame_budget() };
        info!(
            "FrameScheduler: pumping '{}' into '{}'",
            generator.name(),
            sink.name()
        );
        match self.budget {
            RunBudget::Forever => info!("FrameScheduler: running forever"),
            RunBudget::Timed(limit) => {
                info!("FrameScheduler: running for {:?}, pixels and output", limit)
            }
            RunBudget::Benchmark(limit) => {
                info!("FrameScheduler: running for {:?}, pixels only", limit)
            }
        }
        match pacing {
            Some(budget) => info!("FrameScheduler: frame budget {:?} ({} fps)", budget, self.fps),
            None => info!("FrameScheduler: frame rate unlimited"),
        }

        let mut arena = BufferArena::new(frame_len);
        let mut summary = RunSummary::default();
        let started = Instant::now();
        let mut meter = ThroughputMeter::new(self.report_interval, started);

        loop {
            if self.stop.is_raised() {
                info!("FrameScheduler: stop requested");
                break;
            }
            let iteration_started = Instant::now();

            generator.submit(arena.take(Role::Filling)?)?;
            if !benchmark {
                sink.submit(arena.take(Role::Sending)?)?;
            }

            arena.put_back(Role::Filling, generator.wait()?)?;
            summary.frames_generated += 1;
            if !benchmark {
                arena.put_back(Role::Sending, sink.wait()?)?;
                summary.frames_sent += 1;
            }
            summary.iterations += 1;

            if let Some(limit) = self.budget.limit() {
                if started.elapsed() > limit {
                    info!("FrameScheduler: run budget of {:?} spent", limit);
                    break;
                }
            }

            if let Some(budget) = pacing {
                let spent = iteration_started.elapsed();
                if spent < budget {
                    thread::sleep(budget - spent);
                }
            }

            arena.swap();

            if let Some(report) = meter.record(Instant::now(), iteration_started.elapsed()) {
                info!(
                    "FrameScheduler: {:.2} ms ({:.1} fps)",
                    report.average_frame_ms, report.fps
                );
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            "FrameScheduler: {} iterations in {:.2?} ({} generated, {} sent)",
            summary.iterations, summary.elapsed, summary.frames_generated, summary.frames_sent
        );
        Ok(summary)
    }
}
