pub mod opencv_reader;
pub mod processor;
pub mod writer;

use anyhow::Result;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Geometry and timing of a stream, fixed once the source is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamProperties {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

/// Source of decoded frames.
pub trait VideoReader: Send {
    fn properties(&self) -> StreamProperties;
    /// Next frame. An error means end-of-stream or an undecodable frame;
    /// either way the stream is over.
    fn next_frame(&mut self) -> Result<Mat>;
    fn release(&mut self) -> Result<()>;
}

/// Destination for annotated frames.
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &Mat) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// Container type of an input/output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "m4v", "webm"];

impl MediaKind {
    /// Guess from the file extension; anything unrecognised is an image.
    pub fn from_path(path: &Path) -> Self {
        let is_video = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| VIDEO_EXTENSIONS.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_video {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

pub fn open_reader(path: &Path, kind: MediaKind) -> Result<Box<dyn VideoReader>> {
    Ok(match kind {
        MediaKind::Video => Box::new(opencv_reader::OpencvReader::new(path)?),
        MediaKind::Image => Box::new(opencv_reader::ImageReader::new(path)?),
    })
}

pub fn open_writer(
    path: &Path,
    kind: MediaKind,
    properties: StreamProperties,
) -> Result<Box<dyn FrameWriter>> {
    Ok(match kind {
        MediaKind::Video => Box::new(writer::OpencvWriter::new(path, properties)?),
        MediaKind::Image => Box::new(writer::ImageWriter::new(path)),
    })
}
