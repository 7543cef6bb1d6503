use super::{FrameWriter, StreamProperties};
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::{Mat, Size, Vector},
    imgcodecs,
    prelude::*,
    videoio,
};
use std::path::{Path, PathBuf};

/// Writes frames into a video container (MP4V), keeping the source geometry
/// and frame rate.
pub struct OpencvWriter {
    writer: videoio::VideoWriter,
}

impl OpencvWriter {
    pub fn new(path: &Path, properties: StreamProperties) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {:?}", path))?;
        let fourcc = videoio::VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = videoio::VideoWriter::new(
            path_str,
            fourcc,
            properties.fps,
            Size::new(properties.width, properties.height),
            true,
        )
        .with_context(|| format!("Failed to create video writer at: '{}'", path_str))?;

        if !writer.is_opened()? {
            return Err(anyhow!("Failed to open video writer: {}", path_str));
        }

        Ok(Self { writer })
    }
}

impl FrameWriter for OpencvWriter {
    fn write_frame(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame)?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.writer.release()?;
        Ok(())
    }
}

/// Writes a frame as a still image; the format follows the file extension.
pub struct ImageWriter {
    path: PathBuf,
}

impl ImageWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl FrameWriter for ImageWriter {
    fn write_frame(&mut self, frame: &Mat) -> Result<()> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {:?}", self.path))?;
        if !imgcodecs::imwrite(path_str, frame, &Vector::new())? {
            return Err(anyhow!("Failed to write image {}", path_str));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
