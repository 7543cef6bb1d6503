// Detection orchestrator: subject detection -> per-subject crops -> region
// detection -> coordinate remapping, all written into one Frame.

use crate::pipeline::detector::{RegionDetector, SubjectDetector};
use crate::pipeline::error::{DetectorError, InvariantViolation};
use crate::pipeline::frame::{Crop, Frame};
use crate::pipeline::geometry::{
    clamp_non_negative, expand_inclusive, normalized_to_pixel, translate,
};
use crate::pipeline::types::{DetectionConfig, Offset, RegionBox, RegionCandidate, Thresholds};
use opencv::core::Mat;
use opencv::imgproc;

/// Label shown for class ids the subject backend cannot name.
const UNKNOWN_CLASS: &str = "N/A";

/// Owns both detector backends and runs the two-stage pipeline on frames.
pub struct DetectionPipeline {
    subject: Box<dyn SubjectDetector>,
    region: Box<dyn RegionDetector>,
    config: DetectionConfig,
}

impl DetectionPipeline {
    pub fn new(
        subject: Box<dyn SubjectDetector>,
        region: Box<dyn RegionDetector>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            subject,
            region,
            config,
        }
    }

    /// Populate `frame` with subject boxes, labels and one region result per
    /// subject. Detector failures degrade locally; only a broken invariant
    /// is reported.
    pub fn run(&mut self, frame: &mut Frame, thresholds: Thresholds) -> Result<(), InvariantViolation> {
        frame.clear_detections();
        self.detect_subjects(frame, thresholds.subject)?;

        for index in 0..frame.subject_boxes().len() {
            let region = match frame.subject_crop(index) {
                Ok(Some(crop)) => self.locate_region(&crop, thresholds.region),
                Ok(None) => {
                    tracing::debug!("Subject {} lies outside the frame, no region search", index);
                    RegionBox::Absent
                }
                Err(e) => {
                    tracing::warn!("Failed to crop subject {}: {}", index, e);
                    RegionBox::Absent
                }
            };
            frame.push_region(region)?;
        }

        frame.check_alignment()
    }

    /// Subject stage only. Every subject gets an `Absent` region so the
    /// per-subject sequences stay aligned.
    pub fn run_subjects_only(
        &mut self,
        frame: &mut Frame,
        threshold_subject: f32,
    ) -> Result<(), InvariantViolation> {
        frame.clear_detections();
        self.detect_subjects(frame, threshold_subject)?;
        for _ in 0..frame.subject_boxes().len() {
            frame.push_region(RegionBox::Absent)?;
        }
        frame.check_alignment()
    }

    /// Run the region detector over a whole image. Every raw candidate is
    /// reported in order; those at or below `threshold` come back `Absent`.
    pub fn detect_all_regions(&mut self, image: &Mat, threshold: f32) -> Vec<RegionBox> {
        let detected = to_rgb(image)
            .map_err(DetectorError::from)
            .and_then(|rgb| self.region.detect(&rgb));
        let candidates = match detected {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Region detection on full image failed: {}", e);
                return vec![RegionBox::Absent];
            }
        };

        candidates
            .iter()
            .map(|c| {
                if !(c.score > threshold && c.bbox.is_ordered()) {
                    return RegionBox::Absent;
                }
                match expand_inclusive(c.bbox) {
                    Some(b) => RegionBox::Present(clamp_non_negative(b)),
                    None => {
                        tracing::warn!("Region detector returned out-of-range box {:?}", c.bbox);
                        RegionBox::Absent
                    }
                }
            })
            .collect()
    }

    fn detect_subjects(&mut self, frame: &mut Frame, threshold: f32) -> Result<(), InvariantViolation> {
        let (width, height) = (frame.width(), frame.height());

        let detections = match self.subject.detect(frame.image()) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Subject detection failed, frame left without subjects: {}", e);
                return Ok(());
            }
        };

        let cap = match self.config.max_boxes {
            0 => detections.len(),
            n => n,
        };

        for det in detections.iter().take(cap) {
            if !det.score.is_finite() {
                tracing::warn!("Dropping subject detection with score {}", det.score);
                continue;
            }

            let class_name = self
                .subject
                .class_name(det.class_id)
                .unwrap_or(UNKNOWN_CLASS);
            let score = if self.config.keeps(class_name) {
                det.score
            } else {
                0.0
            };

            if score <= threshold {
                continue;
            }

            let b = &det.bbox;
            if ![b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()) {
                tracing::warn!("Dropping subject detection with non-finite box {:?}", det.bbox);
                continue;
            }

            let Some(bbox) = expand_inclusive(normalized_to_pixel(b, width, height)) else {
                tracing::warn!("Dropping subject detection with out-of-range box {:?}", det.bbox);
                continue;
            };
            if !bbox.is_ordered() {
                tracing::warn!("Dropping subject detection with inverted box {:?}", det.bbox);
                continue;
            }

            frame.push_subject(bbox, format_label(class_name, score))?;
        }

        tracing::debug!(
            "Accepted {} of {} subject detections",
            frame.subject_boxes().len(),
            detections.len()
        );
        Ok(())
    }

    fn locate_region(&mut self, crop: &Crop, threshold: f32) -> RegionBox {
        let rgb = match to_rgb(&crop.image) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Failed to convert crop to RGB: {}", e);
                return RegionBox::Absent;
            }
        };

        match self.region.detect(&rgb) {
            Ok(candidates) => select_region(&candidates, threshold, crop.offset),
            Err(e) => {
                tracing::warn!("Region detection failed, recording Absent: {}", e);
                RegionBox::Absent
            }
        }
    }
}

/// `"<class>: <percent>% "`, percent truncated.
pub fn format_label(class_name: &str, score: f32) -> String {
    format!("{}: {}% ", class_name, (score * 100.0) as i32)
}

/// Pick the highest-scoring candidate (first one wins ties) and, if it beats
/// `threshold`, map it from crop-local to frame-global pixels.
pub fn select_region(candidates: &[RegionCandidate], threshold: f32, offset: Offset) -> RegionBox {
    let mut best: Option<&RegionCandidate> = None;
    for c in candidates.iter().filter(|c| c.score.is_finite()) {
        if best.map_or(true, |b| c.score > b.score) {
            best = Some(c);
        }
    }

    match best {
        Some(c) if c.score > threshold => {
            if !c.bbox.is_ordered() {
                tracing::warn!("Region detector returned inverted box {:?}", c.bbox);
                return RegionBox::Absent;
            }
            tracing::debug!("Region accepted with score {:.3}", c.score);
            let global = expand_inclusive(c.bbox)
                .map(clamp_non_negative)
                .and_then(|local| translate(local, offset));
            match global {
                Some(b) => RegionBox::Present(b),
                None => {
                    tracing::warn!("Region detector returned out-of-range box {:?}", c.bbox);
                    RegionBox::Absent
                }
            }
        }
        _ => RegionBox::Absent,
    }
}

fn to_rgb(image: &Mat) -> opencv::Result<Mat> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(image, &mut rgb, imgproc::COLOR_BGR2RGB)?;
    Ok(rgb)
}
