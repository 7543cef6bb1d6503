use crate::pipeline::types::PixelBox;
use thiserror::Error;

/// Failure inside a detector backend. Always recovered by the pipeline.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("malformed detector output: {0}")]
    Malformed(String),
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// Broken per-frame bookkeeping. Indicates a bug, never a data condition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error(
        "per-subject sequences out of alignment: {boxes} boxes, {labels} labels, {regions} regions"
    )]
    Misaligned {
        boxes: usize,
        labels: usize,
        regions: usize,
    },
    #[error("box has inverted corners: {0:?}")]
    InvertedBox(PixelBox),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
    #[error("no subject at index {0}")]
    NoSuchSubject(usize),
}
