use crate::pipeline::detector::RegionDetector;
use crate::pipeline::error::DetectorError;
use crate::pipeline::types::{PixelBox, RegionCandidate};
use anyhow::{anyhow, Result};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

/// Region detector backed by an OpenCV Haar/LBP cascade.
///
/// The per-detection level weights stand in for confidence scores.
pub struct CascadeRegionDetector {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
}

impl CascadeRegionDetector {
    pub fn new(cascade_path: &str) -> Result<Self> {
        let classifier = CascadeClassifier::new(cascade_path)?;
        if classifier.empty()? {
            return Err(anyhow!("Failed to load cascade from {}", cascade_path));
        }
        tracing::info!("Loaded region cascade from {}", cascade_path);

        Ok(Self {
            classifier,
            scale_factor: 1.1,
            min_neighbors: 3,
        })
    }
}

impl RegionDetector for CascadeRegionDetector {
    fn detect(&mut self, crop: &Mat) -> Result<Vec<RegionCandidate>, DetectorError> {
        let mut gray = Mat::default();
        imgproc::cvt_color_def(crop, &mut gray, imgproc::COLOR_RGB2GRAY)?;

        let mut objects = Vector::<Rect>::new();
        let mut reject_levels = Vector::<i32>::new();
        let mut level_weights = Vector::<f64>::new();
        self.classifier.detect_multi_scale3(
            &gray,
            &mut objects,
            &mut reject_levels,
            &mut level_weights,
            self.scale_factor,
            self.min_neighbors,
            0,
            Size::new(0, 0),
            Size::new(0, 0),
            true,
        )?;

        if objects.len() != level_weights.len() {
            return Err(DetectorError::Malformed(format!(
                "{} boxes but {} scores",
                objects.len(),
                level_weights.len()
            )));
        }

        Ok(objects
            .iter()
            .zip(level_weights.iter())
            .map(|(r, weight)| RegionCandidate {
                bbox: PixelBox::new(r.x, r.y, r.x + r.width, r.y + r.height),
                score: weight as f32,
            })
            .collect())
    }
}
