// src/main.rs

mod config;
mod counting;
mod detection_source;
mod membership;
mod overlay;
mod pipeline;
mod results;
mod types;
mod zone;

use anyhow::{bail, Result};
use clap::Parser;
use detection_source::{DetectionReader, DetectionSource};
use membership::PolygonOracle;
use pipeline::PipelineOrchestrator;
use results::{ResultsWriter, SessionSummary};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zone::ZoneSet;

/// Frames buffered between the reader task and the counting loop
const FRAME_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(
    name = "traffic-flow",
    version,
    about = "Counts vehicles moving between road zones from tracked detections"
)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Directory searched for detection files (overrides input.dir)
    #[arg(long)]
    input_dir: Option<String>,

    /// Directory for result files (overrides output.dir)
    #[arg(long)]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = types::Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("🚦 Traffic Flow Counter Starting");
    info!("✓ Configuration loaded from {}", args.config);

    if let Some(dir) = args.input_dir {
        config.input.dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }
    config.validate()?;

    let zones = ZoneSet::from_config(&config.zones)?;
    info!("Counting mode: {:?}", zones.mode());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing current frame");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let files = detection_source::find_detection_files(&config.input)?;
    if files.is_empty() {
        error!("No detection files found in {}", config.input.dir);
        return Ok(());
    }

    for (idx, path) in files.iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            warn!("Stopping before {}", path.display());
            break;
        }

        info!("\n========================================");
        info!(
            "Processing file {}/{}: {}",
            idx + 1,
            files.len(),
            path.display()
        );
        info!("========================================\n");

        match process_file(path, &config, zones.clone(), stop.clone()).await {
            Ok(stats) => {
                info!("\n✓ File processed{}", if stats.stopped { " (stopped early)" } else { "" });
                info!("  Total frames: {}", stats.summary.metrics.total_frames);
                info!("  Tracks seen: {}", stats.summary.tracks_seen);
                if let Some(inside) = stats.summary.occupancy {
                    info!("  Inside zone at end: {}", inside);
                } else {
                    info!("  Transitions recorded: {}", stats.summary.total_transitions);
                    for cell in &stats.summary.transitions {
                        info!(
                            "    {} → {}: {}",
                            cell.entry_name, cell.exit_name, cell.count
                        );
                    }
                }
                if stats.skipped_lines > 0 {
                    warn!("  Skipped input lines: {}", stats.skipped_lines);
                }
                info!("  Processing Speed: {:.1} FPS", stats.summary.metrics.fps);
            }
            Err(e) => {
                error!("Failed to process {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(())
}

struct ProcessingStats {
    summary: SessionSummary,
    skipped_lines: usize,
    stopped: bool,
}

async fn process_file(
    path: &Path,
    config: &types::Config,
    zones: ZoneSet,
    stop: Arc<AtomicBool>,
) -> Result<ProcessingStats> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now().to_rfc3339();

    let reader = DetectionReader::open(path, config.session.confidence_threshold)?;
    let frame_rate = match (config.session.frame_rate, reader.video_info()) {
        (Some(fps), _) => fps,
        (None, Some(info)) if info.fps.is_finite() && info.fps > 0.0 => info.fps,
        _ => bail!(
            "No frame rate for {}: set session.frame_rate or add a video_info header",
            path.display()
        ),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("detections")
        .to_string();
    let output_dir = Path::new(&config.output.dir);
    let mut writer = ResultsWriter::create(
        output_dir,
        &stem,
        config.output.write_events,
        config.output.write_overlays,
    )?;

    let mut orchestrator =
        PipelineOrchestrator::new(zones, PolygonOracle, &config.session, frame_rate);

    let (rx, producer) = detection_source::spawn_source(reader, FRAME_CHANNEL_CAPACITY);
    let outcome = orchestrator.run(rx, &mut writer, &stop).await?;
    let report = producer.await??;

    writer.finish()?;

    let summary = SessionSummary::build(
        session_id,
        started_at,
        path,
        &config.session,
        orchestrator.frame_rate(),
        orchestrator.zones(),
        orchestrator.engine(),
        orchestrator.metrics().summary(),
    );
    summary.save(output_dir, &stem)?;

    Ok(ProcessingStats {
        summary,
        skipped_lines: report.skipped_lines,
        stopped: outcome.stopped,
    })
}
