use crate::pipeline::types::Thresholds;
use crate::video::processor::DetectionMode;
use crate::video::MediaKind;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the upload form and annotated results over HTTP
    Serve(ServeArgs),
    /// Annotate one image or video file and exit
    Process(ProcessArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "SUBJECT_BOXES_HOST")]
    pub host: IpAddr,

    /// Port to bind to; the next free port is tried if it is taken
    #[arg(long, default_value_t = 12207, env = "SUBJECT_BOXES_PORT")]
    pub port: u16,

    /// Root directory for uploads and processed files
    #[arg(long, default_value = "storage", env = "SUBJECT_BOXES_STORAGE_ROOT")]
    pub storage_root: PathBuf,

    /// Seconds a stored file is kept before the reaper deletes it
    #[arg(long, default_value_t = 1800, env = "SUBJECT_BOXES_FILE_TTL_SECS")]
    pub file_ttl_secs: u64,

    #[command(flatten)]
    pub models: ModelArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Image or video to annotate
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the annotated result (same container type as input)
    #[arg(long)]
    pub output: PathBuf,

    /// Input type; guessed from the file extension when omitted
    #[arg(long, value_enum)]
    pub kind: Option<MediaKind>,

    /// Which detection stages to run
    #[arg(long, value_enum, default_value_t = DetectionMode::Full)]
    pub mode: DetectionMode,

    #[command(flatten)]
    pub models: ModelArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// RT-DETR ONNX model used for subject detection
    #[arg(long, env = "SUBJECT_BOXES_SUBJECT_MODEL")]
    pub subject_model: String,

    /// OpenCV cascade XML used for region detection
    #[arg(long, env = "SUBJECT_BOXES_REGION_MODEL")]
    pub region_model: String,

    /// Maximum raw subject detections considered per frame (0 = no cap)
    #[arg(long, default_value_t = 20, env = "SUBJECT_BOXES_MAX_BOXES")]
    pub max_boxes: usize,

    /// Subject classes to keep (comma separated)
    #[arg(
        long,
        default_value = "person",
        value_delimiter = ',',
        env = "SUBJECT_BOXES_KEEP_CLASSES"
    )]
    pub keep_class: Vec<String>,
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct ThresholdArgs {
    /// Minimum subject score (exclusive)
    #[arg(
        long,
        default_value_t = 0.5,
        value_parser = parse_unit,
        env = "SUBJECT_BOXES_THRESHOLD_SUBJECT"
    )]
    pub threshold_subject: f32,

    /// Minimum region score (exclusive)
    #[arg(
        long,
        default_value_t = 0.1,
        value_parser = parse_unit,
        env = "SUBJECT_BOXES_THRESHOLD_REGION"
    )]
    pub threshold_region: f32,
}

impl ThresholdArgs {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            subject: self.threshold_subject,
            region: self.threshold_region,
        }
    }
}

fn parse_unit(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not within [0, 1]", value))
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
