// src/main.rs

use anyhow::{bail, Context, Result};
use clap::Parser;
use cyclist_posture::analysis::{Comparer, FrameStreamAnalyzer};
use cyclist_posture::providers::Providers;
use cyclist_posture::video_processor::VideoProcessor;
use cyclist_posture::visualization::Renderer;
use cyclist_posture::Config;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Compare cyclist posture across a dataset of still images and videos.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Dataset directory, overrides `dataset.input_dir`
    dataset: Option<PathBuf>,

    /// Frames per second sampled from videos
    #[arg(long)]
    analyse_rate: Option<f64>,

    /// Output directory for annotated frames and the report
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip annotated images and videos
    #[arg(long)]
    no_visualize: bool,
}

fn main() -> Result<()> {
    // RUST_LOG wins; otherwise start at info and switch to `logging.level` once the config is read.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("cyclist_posture=info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(dir) = args.dataset {
        config.dataset.input_dir = dir;
    }
    if let Some(rate) = args.analyse_rate {
        config.analysis.analyse_rate = rate;
    }
    if let Some(dir) = args.output_dir {
        config.output.output_dir = dir;
    }
    if args.no_visualize {
        config.output.visualize = false;
    }
    config.validate()?;

    if !from_env {
        filter_handle
            .reload(EnvFilter::new(format!("cyclist_posture={}", config.logging.level)))
            .context("Failed to apply logging.level")?;
    }

    info!("🚴 Cyclist Posture Analysis Starting");
    info!("✓ Configuration loaded from {}", args.config.display());
    info!(
        "Analysis: rate={:.1} fps, front_threshold={:.1}%",
        config.analysis.analyse_rate, config.analysis.front_threshold
    );

    // No model runtime is linked in; keypoints and masks come from folders.
    let providers = Providers::from_config(&config.sources, None, None)
        .context("Failed to set up keypoint and mask sources")?;
    info!("✓ Keypoint and mask sources ready");

    let processor = VideoProcessor::new(config.dataset.clone());
    let samples = processor.find_samples()?;
    if samples.is_empty() {
        error!("No samples found in {}", config.dataset.input_dir.display());
        return Ok(());
    }
    info!("Found {} sample(s) to analyse", samples.len());

    let renderer = Renderer::new(&config.visualization)?;
    let analyzer = FrameStreamAnalyzer::new(config.analysis.clone(), renderer);
    let mut comparer = Comparer::new(analyzer, providers);
    if config.output.visualize {
        comparer = comparer.with_visualization(&config.output.output_dir);
    }

    let report = comparer.compare(&samples);

    info!("\n========================================");
    for (orientation, samples) in &report.area {
        for (name, area) in samples {
            info!(
                "  {} {}: area {:.0} ± {:.0}",
                orientation, name, area.mean, area.std
            );
        }
    }
    for (orientation, samples) in &report.stability {
        for (name, spread) in samples {
            let listed: Vec<String> = spread
                .iter()
                .map(|(kp, std)| format!("{}={:.2}", kp, std))
                .collect();
            info!("  {} {}: {}", orientation, name, listed.join(" "));
        }
    }
    if !report.failures.is_empty() {
        warn!("  ⚠️  {} sample(s) failed:", report.failures.len());
        for failure in &report.failures {
            warn!("     {}: {}", failure.sample, failure.reason);
        }
    }
    info!(
        "  Frames analysed: {} ({:.1} FPS)",
        report.run.frames_processed, report.run.fps
    );
    info!("  Total time: {:.2}s", report.run.elapsed_secs);
    info!("========================================\n");

    let report_path = config.report_path();
    report
        .save(&report_path)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    if report.run.samples_analysed == 0 {
        bail!("none of the {} samples could be analysed", report.run.samples_total);
    }
    Ok(())
}
