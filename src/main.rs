//! `pixel-pipeline`: run the processing pipeline over a file, a directory
//! tree or the frames of an animated GIF, writing PNGs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use rust_pixel_pipeline::tasks::{batch, video};
use rust_pixel_pipeline::{ImageProcessor, PipelineConfig, PixelBuffer, Source};

/// Command line options shared by every subcommand.
#[derive(Debug, Parser)]
#[command(name = "pixel-pipeline", about = "Apply filters and effects to images")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the random seed
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process a single image
    Process {
        input: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Process every image under a directory, one at a time
    Batch {
        input: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
    /// Process each frame of an animated GIF
    Animate {
        input: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("rust_pixel_pipeline={level}").parse()?)
        .add_directive(format!("pixel_pipeline={level}").parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn save(buffer: PixelBuffer, path: &Path) -> Result<()> {
    buffer
        .into_image()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if cli.seed.is_some() {
        cfg.seed = cli.seed;
    }
    let cfg = cfg.validated().context("validating configuration")?;
    let mut processor = ImageProcessor::new(&cfg);

    match cli.command {
        Command::Process { input, output } => {
            let buffer = processor
                .process(&Source::Path(input.clone()), &cfg.options)
                .await
                .with_context(|| format!("processing {}", input.display()))?;
            save(buffer, &output)?;
            info!(output = %output.display(), "wrote image");
        }
        Command::Batch { input, output } => {
            let paths = batch::collect_images(&input);
            info!(count = paths.len(), "scanned images");
            let mut failed = 0usize;
            let mut jobs = Vec::with_capacity(paths.len());
            let targets = batch::output_targets(&input, &paths, &output);
            for (path, target) in paths.iter().zip(targets) {
                match target {
                    Ok(target) => jobs.push((path, target)),
                    Err(err) => {
                        failed += 1;
                        error!(path = %path.display(), error = %err, "skipping image");
                    }
                }
            }
            let sources: Vec<Source> = jobs
                .iter()
                .map(|(path, _)| Source::Path(path.to_path_buf()))
                .collect();
            let results = batch::run(&mut processor, &sources, &cfg.options).await;
            for ((path, target), result) in jobs.iter().zip(results) {
                match result {
                    Ok(buffer) => {
                        if let Some(parent) = target.parent() {
                            std::fs::create_dir_all(parent)
                                .with_context(|| format!("creating {}", parent.display()))?;
                        }
                        save(buffer, target)?;
                    }
                    Err(err) => {
                        failed += 1;
                        error!(path = %path.display(), error = %err, "skipping image");
                    }
                }
            }
            info!(failed, "batch complete");
        }
        Command::Animate { input, output } => {
            std::fs::create_dir_all(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let mut frames = video::AnimationFrames::open(&input)
                .with_context(|| format!("decoding {}", input.display()))?;
            info!(
                frames = frames.len(),
                interval = %humantime::format_duration(cfg.frame_interval),
                "starting animation"
            );
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });
            let mut write_error = None;
            video::run(
                &mut processor,
                &mut frames,
                &cfg.options,
                cfg.frame_interval,
                cancel,
                |index, buffer| {
                    let target = output.join(format!("frame-{index:05}.png"));
                    if let Err(err) = save(buffer, &target) {
                        write_error.get_or_insert(err);
                    }
                },
            )
            .await
            .context("processing animation")?;
            if let Some(err) = write_error {
                return Err(err);
            }
        }
    }
    Ok(())
}
