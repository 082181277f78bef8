use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use tinypic::settings::{
    default_settings_path, load_settings_or_default, save_settings, CropMode, Settings,
};
use tinypic::{ArchiveProcessor, BatchProgress, ExternalTools, ProcessOptions};

/// Recompress manga and comic archives into compact CBZ files
#[derive(Parser, Debug)]
#[command(name = "tinypic", version, about, long_about = None)]
struct Cli {
    /// Folders, ZIP/CBZ, RAR/CBR or EPUB files to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target JPEG quality (60-95)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Worker threads (1-100)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Cropping: none, margins or margins+page
    #[arg(long)]
    crop_mode: Option<CropMode>,

    /// Cropping aggressiveness (0.0-3.0, 0 disables)
    #[arg(long)]
    crop_power: Option<f32>,

    /// Store every page as grayscale
    #[arg(long)]
    grayscale: bool,

    /// Settings file (defaults to config.json next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply_to(&self, mut settings: Settings) -> Settings {
        if let Some(quality) = self.quality {
            settings.quality = quality;
        }
        if let Some(threads) = self.threads {
            settings.num_threads = threads;
        }
        if let Some(mode) = self.crop_mode {
            settings.crop_mode = mode;
        }
        if let Some(power) = self.crop_power {
            settings.crop_power = power;
        }
        settings.normalize()
    }
}

fn settings_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    let root = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    default_settings_path(&root)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = settings_path(&cli);
    let settings = cli.apply_to(load_settings_or_default(&config_path));

    if cli.save_config {
        match save_settings(&config_path, &settings) {
            Ok(()) => info!(path = %config_path.display(), "settings saved"),
            Err(err) => warn!(path = %config_path.display(), error = %err, "could not save settings"),
        }
    }

    let tools = ExternalTools::discover();
    let processor = ArchiveProcessor::new(
        ProcessOptions::from_settings(&settings, cli.grayscale),
        tools,
    );
    info!(
        quality = settings.quality,
        threads = settings.num_threads,
        crop_mode = ?settings.crop_mode,
        crop_power = settings.crop_power,
        "starting"
    );

    let mut failures = 0usize;
    for input in &cli.inputs {
        let mut report = |progress: BatchProgress| {
            info!(
                "[{}/{}] {}",
                progress.completed, progress.total, progress.current_item
            );
        };

        match processor.process(input, Some(&mut report)) {
            Ok((output, stats)) => {
                info!(
                    "{} -> {}: {} -> {} bytes ({:.1}%), {} pages, {} errors",
                    input.display(),
                    output.display(),
                    stats.original_size,
                    stats.compressed_size,
                    stats.ratio() * 100.0,
                    stats.pages_written,
                    stats.errors.len()
                );
                for failure in &stats.errors {
                    warn!(page = %failure.name, "{}", failure.message);
                }
            }
            Err(err) => {
                error!(input = %input.display(), error = %err, "processing failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
