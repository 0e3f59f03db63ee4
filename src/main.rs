// src/main.rs

use pixel_pump::{
    config::Config,
    patterns,
    signals,
    sink::{HardwareSink, NetworkSink, OutputTarget},
    spawn_generator_stage, spawn_sink_stage, CoordinateTable, FrameGenerator, FrameScheduler,
    NoInput, RunBudget, StopSignal,
};

use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Streams a pattern to an LED installation over Open Pixel Control or SPI.
#[derive(Parser, Debug)]
#[command(name = "pixel-pump", version)]
struct Cli {
    /// Layout file with one [x, y, z] triple per pixel.
    layout: Option<PathBuf>,

    /// OPC server as host[:port] (port defaults to 7890), or "SPI" for the strand.
    target: Option<String>,

    /// Desired frames per second. Use 0 for no limit.
    #[arg(allow_negative_numbers = true)]
    fps: Option<f64>,

    /// Quit after this many seconds. Use 0 for forever, a negative number to
    /// benchmark the pattern alone.
    #[arg(allow_negative_numbers = true)]
    seconds: Option<f64>,

    /// JSON configuration file. Positional arguments override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pattern to run (rainbow, solid).
    #[arg(long, short)]
    pattern: Option<String>,
}

impl Cli {
    fn apply_to(self, config: &mut Config) {
        if let Some(layout) = self.layout {
            config.output.layout_path = layout;
        }
        if let Some(target) = self.target {
            config.output.target = target;
        }
        if let Some(fps) = self.fps {
            config.timing.fps = fps;
        }
        if let Some(seconds) = self.seconds {
            config.timing.run_seconds = seconds;
        }
        if let Some(pattern) = self.pattern {
            config.output.pattern = pattern;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    info!("Configuration: {:?}", config);

    // --- Layout ---
    let coords = Arc::new(CoordinateTable::load(&config.output.layout_path)?);
    let bounds = coords
        .bounds()
        .with_context(|| format!("Layout {} has no pixels", config.output.layout_path.display()))?;
    info!("Layout bounds: min {:?}, max {:?}", bounds.min, bounds.max);

    // --- Shutdown ---
    let stop = StopSignal::new();
    signals::install_shutdown_handler(&stop)?;

    // --- Stages ---
    let target = OutputTarget::parse(&config.output.target, config.network.default_port);
    info!("Output: {}", target);
    let mut sink = match target {
        OutputTarget::Network(addr) => {
            let network = NetworkSink::tcp(addr, &config.network);
            info!("Streaming OPC frames to {}", network.addr());
            spawn_sink_stage(network)?
        }
        OutputTarget::Hardware => {
            spawn_sink_stage(HardwareSink::open(&config.hardware.device_path)?)?
        }
    };

    let pattern = patterns::by_name(&config.output.pattern)?;
    info!("Pattern: {}", pattern.name());
    let mut generator = spawn_generator_stage(pattern, NoInput, coords.clone(), bounds)?;

    // --- Main Loop ---
    let scheduler = FrameScheduler::new(
        config.timing.fps,
        RunBudget::from_seconds(config.timing.run_seconds),
    )
    .with_stop_signal(stop)
    .with_report_interval(Duration::from_millis(config.timing.report_interval_ms));

    let summary = scheduler.run(coords.frame_len(), &mut generator, &mut sink)?;
    info!("Run finished: {:?}", summary);

    // --- Cleanup ---
    generator.shutdown()?;
    sink.shutdown()?;
    info!("pixel-pump exited successfully.");
    Ok(())
}
