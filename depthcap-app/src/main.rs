//! Depthcap
//!
//! Runs one capture session against the synthetic depth sensor and prints the
//! path of the merged point cloud, the way the uploader would receive it.

mod app;

use app::{CaptureApp, LoggingConfig};
use clap::Parser;
use depthcap_capture::CaptureConfig;
use depthcap_data::ConfidenceLevel;
use std::path::PathBuf;

/// Depthcap - depth capture to a single point cloud
#[derive(Parser, Debug)]
#[command(name = "depthcap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON capture config; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that receives session folders
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Process one frame out of every N
    #[arg(short, long)]
    pick_every: Option<u32>,

    /// Minimum depth confidence (low, medium, high)
    #[arg(long)]
    confidence: Option<ConfidenceLevel>,

    /// Maximum point distance from the camera in metres (0 = unbounded)
    #[arg(long)]
    radius: Option<f32>,

    /// Frames the synthetic sensor delivers before stopping
    #[arg(short, long, default_value_t = 120)]
    frames: u64,

    /// Depth frame width
    #[arg(long, default_value_t = 64)]
    width: u32,

    /// Depth frame height
    #[arg(long, default_value_t = 48)]
    height: u32,

    /// Raise a memory warning after this many frames
    #[arg(long)]
    memory_pressure_at: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Send spans to Tracy (needs the `tracy` feature)
    #[arg(long)]
    tracy: bool,
}

impl Args {
    fn capture_config(&self) -> Result<CaptureConfig, depthcap_capture::ConfigError> {
        let mut config = match &self.config {
            Some(path) => CaptureConfig::from_json_file(path)?,
            None => CaptureConfig::default(),
        };
        if let Some(root) = &self.root {
            config.root_dir = root.clone();
        }
        if let Some(n) = self.pick_every {
            config.pick_every_n = n;
        }
        if let Some(level) = self.confidence {
            config.confidence_threshold = level;
        }
        if let Some(radius) = self.radius {
            config.inclusion_radius = radius;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    let config = match args.capture_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let app = CaptureApp::new(config)
        .with_sensor_size(args.width, args.height)
        .with_frames(args.frames)
        .with_memory_pressure_at(args.memory_pressure_at)
        .with_logging(LoggingConfig {
            level: args.log_level.clone(),
            enable_tracy: args.tracy,
        });

    match app.run() {
        Ok(artifact) => println!("{}", artifact.path.display()),
        Err(e) => {
            eprintln!("Capture error: {}", e);
            std::process::exit(1);
        }
    }
}
