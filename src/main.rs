//! `snapmark` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use snapmark::config::{load_json, ProcessingMethod, RecordingConfig, TranscodeConfig, WatermarkSource};
use snapmark::error::SnapMarkResult;

#[derive(Parser)]
#[command(name = "snapmark")]
#[command(about = "Watermark video files and desktop recordings on the GPU")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Compositing backend.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Gpu,
    Filter,
}

impl From<MethodArg> for ProcessingMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Gpu => ProcessingMethod::Gpu,
            MethodArg::Filter => ProcessingMethod::FilterGraph,
        }
    }
}

#[derive(clap::Args)]
struct WatermarkArgs {
    /// Tile this text across the frame
    #[arg(long, group = "layer")]
    text: Option<String>,

    /// Fit this PNG to the frame
    #[arg(long, group = "layer")]
    png: Option<PathBuf>,

    /// Watermark opacity (0.0-1.0)
    #[arg(long)]
    opacity: Option<f32>,

    /// JSON file with base settings; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl WatermarkArgs {
    fn source(&self) -> Option<WatermarkSource> {
        if self.text.is_none() && self.png.is_none() {
            return None;
        }
        Some(WatermarkSource::from_options(self.text.clone(), self.png.clone()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode a video file with a watermark on every frame
    Transcode {
        /// Source video
        input: PathBuf,

        /// Output path (default: <stem>_watermarked<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compositing backend
        #[arg(long)]
        method: Option<MethodArg>,

        #[command(flatten)]
        watermark: WatermarkArgs,
    },
    /// Record the primary desktop with a watermark
    Record {
        /// Output video
        output: PathBuf,

        /// Length in seconds
        duration: u32,

        /// Frames per second
        #[arg(long)]
        fps: Option<u32>,

        #[command(flatten)]
        watermark: WatermarkArgs,
    },
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn transcode(
    input: PathBuf,
    output: Option<PathBuf>,
    method: Option<MethodArg>,
    args: WatermarkArgs,
) -> SnapMarkResult<()> {
    let mut config: TranscodeConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => TranscodeConfig::default(),
    };
    config.input = input;
    if let Some(output) = output {
        config.output = output;
    }
    if let Some(method) = method {
        config.method = method.into();
    }
    if let Some(opacity) = args.opacity {
        config.opacity = opacity;
    }
    if let Some(source) = args.source() {
        config.watermark = source;
    }

    let stats = snapmark::pipeline::run_transcode(&config)?;
    info!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

fn record(output: PathBuf, duration: u32, fps: Option<u32>, args: WatermarkArgs) -> SnapMarkResult<()> {
    let mut config: RecordingConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => RecordingConfig::default(),
    };
    config.output = output;
    config.duration_secs = duration;
    if let Some(fps) = fps {
        config.fps = fps;
    }
    if let Some(opacity) = args.opacity {
        config.opacity = opacity;
    }
    if let Some(source) = args.source() {
        config.watermark = source;
    }
    run_record(&config)
}

#[cfg(windows)]
fn run_record(config: &RecordingConfig) -> SnapMarkResult<()> {
    let stats = snapmark::pipeline::record_desktop(config)?;
    info!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

#[cfg(not(windows))]
fn run_record(_config: &RecordingConfig) -> SnapMarkResult<()> {
    Err(snapmark::error::SnapMarkError::InvalidConfig(
        "desktop recording requires Windows desktop duplication".to_string(),
    ))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Transcode {
            input,
            output,
            method,
            watermark,
        } => transcode(input, output, method, watermark),
        Commands::Record {
            output,
            duration,
            fps,
            watermark,
        } => record(output, duration, fps, watermark),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
