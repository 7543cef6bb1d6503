mod cli;
mod jobs;
mod pipeline;
mod storage;
mod video;
mod web;

use anyhow::Result;
use cli::{Args, Command, ProcessArgs};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::build_pipeline;
use std::time::Duration;
use video::processor::StreamProcessor;
use video::MediaKind;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    match args.command {
        Command::Serve(serve) => run_server(serve).await?,
        Command::Process(process) => {
            tokio::task::spawn_blocking(move || run_process(process)).await??
        }
    }

    Ok(())
}

fn run_process(args: ProcessArgs) -> Result<()> {
    let kind = args
        .kind
        .unwrap_or_else(|| MediaKind::from_path(&args.input));
    let mut pipeline = build_pipeline(&args.models)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} frames ({per_sec:.1.yellow}) {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let stats = StreamProcessor::new(&mut pipeline, args.thresholds.thresholds())
        .with_mode(args.mode)
        .with_progress(pb)
        .process_file(&args.input, &args.output, kind)?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
