// Copyright 2026 The Incapy Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use incapy_engine::{
    Controller, DataSource, EngineConfig, GraphUpdate, Observer, SeriesSource, SyntheticSource,
    UiEvent, VertexId,
};

#[derive(Parser)]
#[command(name = "incapy", version)]
#[command(about = "Animated force-directed layout for time-evolving weighted graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Animate on a background thread for a fixed wall-clock duration
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Seconds to animate before writing the final layout
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
    },
    /// Step the layout with a fixed time delta on the calling thread
    Layout {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of frames to compute
        #[arg(long, default_value_t = 600)]
        steps: usize,

        /// Seconds per frame
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f64,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// JSON dataset with vertex ids, edges, positions and windows
    #[arg(long, value_name = "FILE")]
    dataset: Option<PathBuf>,

    /// Grid side length of the synthetic dataset used without --dataset
    #[arg(long, default_value_t = 4)]
    side: usize,

    /// Number of synthetic windows
    #[arg(long, default_value_t = 10)]
    windows: usize,

    /// Seed for the synthetic windows
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// JSON engine configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long)]
    speed: Option<f64>,

    /// Seconds per window, 0 to stay on the first window
    #[arg(long)]
    time_per_window: Option<f64>,

    /// Wrap back to the first window after the last one
    #[arg(long)]
    repeat: bool,

    /// Where to write the final layout; stdout if omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl CommonArgs {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                EngineConfig::from_json(&json)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            config.edge_threshold = threshold;
        }
        if let Some(speed) = self.speed {
            config.anim_speed_const = speed;
        }
        if let Some(seconds) = self.time_per_window {
            config.time_per_window = seconds;
        }
        config.repeat |= self.repeat;

        config.validate().context("invalid command line options")?;
        Ok(config)
    }

    fn source(&self) -> Result<Box<dyn DataSource>> {
        match &self.dataset {
            Some(path) => {
                let source = SeriesSource::open(path)
                    .with_context(|| format!("failed to load dataset {}", path.display()))?;
                Ok(Box::new(source))
            }
            None => {
                if self.side == 0 {
                    bail!("--side must be at least 1");
                }
                Ok(Box::new(SyntheticSource::new(
                    self.side,
                    self.windows,
                    self.seed,
                )))
            }
        }
    }

    fn controller(&self) -> Result<(Controller, EngineConfig)> {
        let config = self.engine_config()?;
        let controller = Controller::new(self.source()?, config.clone())
            .context("failed to initialize the layout")?;
        controller.add_observer(Box::new(WindowLogger::default()));
        Ok((controller, config))
    }
}

/// Logs window changes and how many edges are visible.
#[derive(Default)]
struct WindowLogger {
    visible: Option<usize>,
}

impl Observer for WindowLogger {
    fn on_update(&mut self, update: &GraphUpdate<'_>) {
        let visible = update.edge_sources.len();
        if self.visible != Some(visible) {
            debug!(visible, "visible edges changed");
            self.visible = Some(visible);
        }
    }

    fn on_ui_event(&mut self, event: &UiEvent) {
        match event {
            UiEvent::WindowCount(count) => info!(count, "dataset loaded"),
            UiEvent::WindowChanged(window) => info!(window, "window changed"),
            other => debug!(event = other.name(), "parameter changed"),
        }
    }
}

#[derive(Serialize)]
struct LayoutOutput {
    window: Option<usize>,
    frames: u64,
    edge_threshold: Option<f64>,
    vertex_ids: Vec<VertexId>,
    positions: Vec<[f64; 2]>,
    visible_edges: Vec<(usize, usize)>,
}

impl LayoutOutput {
    fn capture(controller: &Controller) -> Self {
        let (sources, targets) = controller.visible_edges();
        LayoutOutput {
            window: controller.current_window(),
            frames: controller.stats().frames,
            edge_threshold: controller.edge_threshold(),
            vertex_ids: controller.vertex_ids(),
            positions: controller
                .positions()
                .into_iter()
                .map(|p| [p.x, p.y])
                .collect(),
            visible_edges: sources.into_iter().zip(targets).collect(),
        }
    }

    fn write(&self, path: Option<&Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        match path {
            Some(path) => fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => println!("{json}"),
        }
        Ok(())
    }
}

fn run(common: &CommonArgs, duration: f64) -> Result<()> {
    if !(duration.is_finite() && duration >= 0.0) {
        bail!("--duration must be a non-negative number of seconds");
    }
    let (controller, _) = common.controller()?;

    controller.start();
    thread::sleep(Duration::from_secs_f64(duration));
    controller.stop();
    controller.join();

    LayoutOutput::capture(&controller).write(common.output.as_deref())
}

fn layout(common: &CommonArgs, steps: usize, dt: f64) -> Result<()> {
    if !(dt.is_finite() && dt > 0.0) {
        bail!("--dt must be positive");
    }
    let (controller, config) = common.controller()?;

    controller.next_window(Some(0))?;
    let mut shown_for = 0.0;
    for _ in 0..steps {
        shown_for += dt;
        if shown_for > config.time_per_window {
            shown_for = 0.0;
            if config.time_per_window != 0.0 {
                controller.next_window(None)?;
            }
        }
        controller.step_once(dt);
    }

    LayoutOutput::capture(&controller).write(common.output.as_deref())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match &cli.command {
        Commands::Run { common, duration } => run(common, *duration),
        Commands::Layout { common, steps, dt } => layout(common, *steps, *dt),
    }
}
