use crate::pipeline::error::InvariantViolation;
use serde::{Deserialize, Serialize};

/// Bounding box in normalized coordinates [0, 1], relative to image size.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Bounding box in pixel coordinates. Both corners are inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_ordered(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }

    pub fn ensure_ordered(&self) -> Result<(), InvariantViolation> {
        if self.is_ordered() {
            Ok(())
        } else {
            Err(InvariantViolation::InvertedBox(*self))
        }
    }
}

/// Translation between crop-local and frame-global pixel space.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

/// Region (sub-feature) outcome for one subject.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "status", content = "bbox", rename_all = "snake_case")]
pub enum RegionBox {
    Present(PixelBox),
    /// No qualifying region above threshold, or the region stage failed.
    Absent,
}

impl RegionBox {
    pub fn as_box(&self) -> Option<&PixelBox> {
        match self {
            RegionBox::Present(b) => Some(b),
            RegionBox::Absent => None,
        }
    }
}

/// Raw whole-frame detection as produced by a subject detector backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectDetection {
    pub bbox: NormalizedBox,
    pub class_id: usize,
    pub score: f32,
}

/// Raw sub-detection inside a crop. `bbox` is crop-local pixel space with
/// exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionCandidate {
    pub bbox: PixelBox,
    pub score: f32,
}

/// Per-request acceptance thresholds for both detection stages.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub subject: f32,
    pub region: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            subject: 0.5,
            region: 0.1,
        }
    }
}

impl Thresholds {
    pub fn new(subject: f32, region: f32) -> anyhow::Result<Self> {
        for (name, value) in [("subject", subject), ("region", region)] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} threshold must be within [0, 1], got {}", name, value);
            }
        }
        Ok(Self { subject, region })
    }
}

/// Static pipeline configuration, fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Cap applied to raw subject detections before thresholding. 0 disables it.
    pub max_boxes: usize,
    /// Subject classes that may be accepted; other classes score as 0.
    pub kept_classes: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_boxes: 20,
            kept_classes: vec!["person".to_string()],
        }
    }
}

impl DetectionConfig {
    pub fn keeps(&self, class_name: &str) -> bool {
        self.kept_classes.iter().any(|c| c == class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_reject_out_of_range() {
        assert!(Thresholds::new(0.5, 0.1).is_ok());
        assert!(Thresholds::new(0.0, 1.0).is_ok());
        assert!(Thresholds::new(-0.1, 0.1).is_err());
        assert!(Thresholds::new(0.5, 1.5).is_err());
        assert!(Thresholds::new(f32::NAN, 0.1).is_err());
    }

    #[test]
    fn test_inverted_box_is_an_invariant_violation() {
        let ok = PixelBox::new(1, 1, 1, 1);
        assert!(ok.ensure_ordered().is_ok());

        let inverted = PixelBox::new(5, 1, 2, 3);
        assert_eq!(
            inverted.ensure_ordered(),
            Err(InvariantViolation::InvertedBox(inverted))
        );
    }

    #[test]
    fn test_region_box_serializes_with_status_tag() {
        let present = RegionBox::Present(PixelBox::new(1, 2, 3, 4));
        let json = serde_json::to_value(present).unwrap();
        assert_eq!(json["status"], "present");
        assert_eq!(json["bbox"]["x2"], 3);

        let absent = serde_json::to_value(RegionBox::Absent).unwrap();
        assert_eq!(absent["status"], "absent");
    }
}
