use crate::pipeline::error::DetectorError;
use crate::pipeline::types::{RegionCandidate, SubjectDetection};
use opencv::core::Mat;

/// Whole-frame subject detector.
///
/// Input is the frame as stored (BGR, height x width x 3). Boxes come back
/// normalized to [0, 1]; the pipeline owns thresholding and class selection.
pub trait SubjectDetector {
    fn detect(&mut self, image: &Mat) -> Result<Vec<SubjectDetection>, DetectorError>;

    /// Display name of a class id, if the backend knows it.
    fn class_name(&self, class_id: usize) -> Option<&str>;
}

/// Sub-feature detector run on a single subject crop.
///
/// Input is an RGB crop. Boxes are crop-local pixels with exclusive
/// right/bottom edges; the pipeline picks the best one and remaps it.
pub trait RegionDetector {
    fn detect(&mut self, crop: &Mat) -> Result<Vec<RegionCandidate>, DetectorError>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted detector doubles.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Returns the same scripted output on every call.
    pub struct ScriptedSubjectDetector {
        pub detections: Vec<SubjectDetection>,
        pub fail: bool,
        pub names: Vec<&'static str>,
    }

    impl ScriptedSubjectDetector {
        pub fn new(detections: Vec<SubjectDetection>) -> Self {
            Self {
                detections,
                fail: false,
                names: vec!["background", "person", "bicycle"],
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    impl SubjectDetector for ScriptedSubjectDetector {
        fn detect(&mut self, _image: &Mat) -> Result<Vec<SubjectDetection>, DetectorError> {
            if self.fail {
                return Err(DetectorError::Inference("scripted failure".to_string()));
            }
            Ok(self.detections.clone())
        }

        fn class_name(&self, class_id: usize) -> Option<&str> {
            self.names.get(class_id).copied()
        }
    }

    /// One scripted response per call, in order; falls back to `default`
    /// once the queue is drained. Records the size of every crop it sees.
    pub struct ScriptedRegionDetector {
        pub responses: VecDeque<Result<Vec<RegionCandidate>, DetectorError>>,
        pub default: Vec<RegionCandidate>,
        pub seen_sizes: Arc<Mutex<Vec<(i32, i32)>>>,
    }

    impl ScriptedRegionDetector {
        pub fn always(default: Vec<RegionCandidate>) -> Self {
            Self {
                responses: VecDeque::new(),
                default,
                seen_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn sequence(
            responses: Vec<Result<Vec<RegionCandidate>, DetectorError>>,
        ) -> Self {
            Self {
                responses: responses.into(),
                ..Self::always(Vec::new())
            }
        }
    }

    impl RegionDetector for ScriptedRegionDetector {
        fn detect(&mut self, crop: &Mat) -> Result<Vec<RegionCandidate>, DetectorError> {
            use opencv::prelude::*;
            self.seen_sizes
                .lock()
                .unwrap()
                .push((crop.cols(), crop.rows()));
            match self.responses.pop_front() {
                Some(response) => response,
                None => Ok(self.default.clone()),
            }
        }
    }
}
