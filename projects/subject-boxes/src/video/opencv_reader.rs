use super::{StreamProperties, VideoReader};
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    imgcodecs,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};
use std::path::Path;

pub struct OpencvReader {
    capture: VideoCapture,
    properties: StreamProperties,
}

impl OpencvReader {
    pub fn new(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 video path: {:?}", path))?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .with_context(|| format!("Failed to open video at: '{}'", path_str))?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path_str));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvReader: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let width = capture.get(CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)? as i32;
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)? as usize;

        tracing::info!(
            "OpencvReader: opened {}, {}x{}, fps={:.2}, stream_frames={}",
            path_str,
            width,
            height,
            fps,
            raw_count
        );

        Ok(Self {
            capture,
            properties: StreamProperties { width, height, fps },
        })
    }
}

impl VideoReader for OpencvReader {
    fn properties(&self) -> StreamProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Err(anyhow!("Failed to read frame"));
        }

        Ok(frame)
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        Ok(())
    }
}

/// A still image presented as a one-frame stream. An undecodable image is
/// an empty stream rather than an error.
pub struct ImageReader {
    image: Option<Mat>,
    properties: StreamProperties,
}

impl ImageReader {
    pub fn new(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 image path: {:?}", path))?;
        let image = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
        if image.empty() {
            tracing::warn!("ImageReader: could not decode {}", path_str);
            return Ok(Self {
                image: None,
                properties: StreamProperties {
                    width: 0,
                    height: 0,
                    fps: 0.0,
                },
            });
        }

        Ok(Self::from_mat(image))
    }

    pub fn from_mat(image: Mat) -> Self {
        let properties = StreamProperties {
            width: image.cols(),
            height: image.rows(),
            fps: 0.0,
        };
        Self {
            image: Some(image),
            properties,
        }
    }
}

impl VideoReader for ImageReader {
    fn properties(&self) -> StreamProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Mat> {
        self.image.take().ok_or_else(|| anyhow!("Image already consumed"))
    }

    fn release(&mut self) -> Result<()> {
        self.image = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::black_image;

    #[test]
    fn test_image_reader_yields_exactly_one_frame() {
        let mut reader = ImageReader::from_mat(black_image(8, 6));
        assert_eq!(
            reader.properties(),
            StreamProperties {
                width: 8,
                height: 6,
                fps: 0.0
            }
        );
        assert!(reader.next_frame().is_ok());
        assert!(reader.next_frame().is_err());
    }

    #[test]
    fn test_undecodable_image_is_an_empty_stream() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let mut reader = ImageReader::new(&path).unwrap();
        assert!(reader.next_frame().is_err());
    }

    #[test]
    fn test_image_round_trip_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let mut writer = crate::video::writer::ImageWriter::new(&path);
        crate::video::FrameWriter::write_frame(&mut writer, &black_image(12, 7)).unwrap();

        let mut reader = ImageReader::new(&path).unwrap();
        assert_eq!(reader.properties().width, 12);
        assert_eq!(reader.properties().height, 7);
        assert!(reader.next_frame().is_ok());
    }
}
