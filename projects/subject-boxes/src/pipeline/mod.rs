// Two-stage detection: subject boxes on the full frame, region boxes inside
// each subject crop.

pub mod cascade;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod orchestrator;
pub mod types;

use crate::cli::ModelArgs;
use anyhow::{Context, Result};
use cascade::CascadeRegionDetector;
use detection::RtdetrSubjectDetector;
use orchestrator::DetectionPipeline;
use types::DetectionConfig;

/// Load both model backends and assemble a pipeline.
pub fn build_pipeline(models: &ModelArgs) -> Result<DetectionPipeline> {
    let subject = RtdetrSubjectDetector::new(&models.subject_model)
        .with_context(|| format!("Failed to load subject model: '{}'", models.subject_model))?;
    let region = CascadeRegionDetector::new(&models.region_model)
        .with_context(|| format!("Failed to load region model: '{}'", models.region_model))?;

    let config = DetectionConfig {
        max_boxes: models.max_boxes,
        kept_classes: models.keep_class.clone(),
    };

    Ok(DetectionPipeline::new(
        Box::new(subject),
        Box::new(region),
        config,
    ))
}
