mod analyze;
mod backend;
mod batching;
mod capture;
mod config;
mod error;
mod prompt;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::analyze::{Analyzer, STATS_MARKER};
use crate::config::RunConfig;

#[derive(Parser)]
#[command(name = "clipsight")]
#[command(about = "Describe short video clips with a vision language model", long_about = None)]
struct Cli {
    /// Path to the video file (MP4/H264 and friends).
    video_file: PathBuf,

    /// What to ask the model about the clip.
    #[arg(default_value = "summarize what is happening")]
    prompt: String,

    /// Frames per second to extract from the video.
    #[arg(short, long, default_value_t = 8)]
    fps: u32,

    /// Frames per inference call; auto-calculated when omitted.
    #[arg(short, long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let started = Instant::now();
    let cli = Cli::parse();

    let config = RunConfig::from_env()?;
    capture::validate_video_file(&cli.video_file)?;

    capture::init();
    let extraction_started = Instant::now();
    let clip = capture::extract_clip(&cli.video_file, cli.fps)?;
    info!(
        video = %cli.video_file.display(),
        frames = clip.frames.len(),
        duration_seconds = clip.duration_seconds,
        width = clip.width,
        height = clip.height,
        extraction_seconds = extraction_started.elapsed().as_secs_f64(),
        "clip extracted"
    );

    let client = backend::build_client(&config)?;
    info!(endpoint = %config.endpoint, prompt = %cli.prompt, "analyzing frames");

    let analyzer = Analyzer::new(client, &config);
    let result = analyzer
        .analyze(&clip.frames, &cli.prompt, cli.batch_size, clip.sample_fps)
        .await?;

    print_report(&result.report());

    println!(
        "\nTotal application runtime: {:.2} seconds",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Split the report on the statistics marker, best-effort: when the marker
/// is absent the whole string is the narrative.
fn print_report(report: &str) {
    let rule = "-".repeat(80);
    match report.split_once(STATS_MARKER) {
        Some((narrative, stats)) => {
            println!("\nAnalysis Result:");
            println!("{rule}");
            println!("{}", narrative.trim());
            println!("{rule}");
            println!("\nPerformance Statistics:");
            println!("{rule}");
            println!("{STATS_MARKER}{stats}");
            println!("{rule}");
        }
        None => {
            println!("\nAnalysis Result:");
            println!("{rule}");
            println!("{report}");
            println!("{rule}");
        }
    }
}
