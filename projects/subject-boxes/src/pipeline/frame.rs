use crate::pipeline::error::{FrameError, InvariantViolation};
use crate::pipeline::geometry::clip_to_image;
use crate::pipeline::types::{Offset, PixelBox, RegionBox};
use opencv::core::{Mat, Point, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

/// Side length of resized region crops.
pub const REGION_CROP_SIZE: i32 = 64;

const BOX_COLOR: (f64, f64, f64) = (255.0, 0.0, 0.0); // Blue (BGR)
const TEXT_COLOR: (f64, f64, f64) = (255.0, 255.0, 255.0);
const BOX_THICKNESS: i32 = 2;
const FONT_FACE: i32 = imgproc::FONT_HERSHEY_DUPLEX;
const FONT_SCALE: f64 = 0.6;
const FONT_THICKNESS: i32 = 1;

fn color((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

/// Which boxes to cut crops from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropKind {
    Subject,
    Region,
}

/// A materialised sub-image plus the frame-global position of its origin.
#[derive(Debug)]
pub struct Crop {
    pub image: Mat,
    pub offset: Offset,
}

/// One image plus everything detected on it.
///
/// `subject_boxes`, `subject_labels` and `region_boxes` are index-aligned:
/// entry `i` of each describes the same subject.
pub struct Frame {
    image: Mat,
    subject_boxes: Vec<PixelBox>,
    subject_labels: Vec<String>,
    region_boxes: Vec<RegionBox>,
}

impl Frame {
    pub fn new(image: Mat) -> Self {
        Self {
            image,
            subject_boxes: Vec::new(),
            subject_labels: Vec::new(),
            region_boxes: Vec::new(),
        }
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }

    pub fn into_image(self) -> Mat {
        self.image
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }

    pub fn subject_boxes(&self) -> &[PixelBox] {
        &self.subject_boxes
    }

    pub fn subject_labels(&self) -> &[String] {
        &self.subject_labels
    }

    pub fn region_boxes(&self) -> &[RegionBox] {
        &self.region_boxes
    }

    /// Forget all detections, keeping the image.
    pub fn clear_detections(&mut self) {
        self.subject_boxes.clear();
        self.subject_labels.clear();
        self.region_boxes.clear();
    }

    /// Record an accepted subject. Box and label are pushed together so the
    /// two sequences can never drift apart.
    pub fn push_subject(&mut self, bbox: PixelBox, label: String) -> Result<(), InvariantViolation> {
        bbox.ensure_ordered()?;
        self.subject_boxes.push(bbox);
        self.subject_labels.push(label);
        Ok(())
    }

    pub fn push_region(&mut self, region: RegionBox) -> Result<(), InvariantViolation> {
        if let RegionBox::Present(b) = &region {
            b.ensure_ordered()?;
        }
        if self.region_boxes.len() >= self.subject_boxes.len() {
            return Err(self.misaligned(self.region_boxes.len() + 1));
        }
        self.region_boxes.push(region);
        Ok(())
    }

    /// Checks `len(subject_boxes) == len(subject_labels) == len(region_boxes)`.
    pub fn check_alignment(&self) -> Result<(), InvariantViolation> {
        let n = self.subject_boxes.len();
        if self.subject_labels.len() != n || self.region_boxes.len() != n {
            return Err(self.misaligned(self.region_boxes.len()));
        }
        Ok(())
    }

    fn misaligned(&self, regions: usize) -> InvariantViolation {
        InvariantViolation::Misaligned {
            boxes: self.subject_boxes.len(),
            labels: self.subject_labels.len(),
            regions,
        }
    }

    /// Crop of subject `index`, tagged with the frame-global origin of the
    /// crop. `None` if the box lies entirely outside the image.
    pub fn subject_crop(&self, index: usize) -> Result<Option<Crop>, FrameError> {
        let bbox = self
            .subject_boxes
            .get(index)
            .ok_or(FrameError::NoSuchSubject(index))?;

        let Some(roi) = clip_to_image(bbox, self.width(), self.height()) else {
            return Ok(None);
        };

        let view = Mat::roi(&self.image, roi)?;
        let mut out = Mat::default();
        view.copy_to(&mut out)?;

        Ok(Some(Crop {
            image: out,
            offset: Offset {
                dx: roi.x,
                dy: roi.y,
            },
        }))
    }

    /// Fixed-size crop of an accepted region box. `None` for `Absent`.
    pub fn region_crop(&self, region: &RegionBox, size: i32) -> Result<Option<Crop>, FrameError> {
        let Some(bbox) = region.as_box() else {
            return Ok(None);
        };

        let Some(roi) = clip_to_image(bbox, self.width(), self.height()) else {
            tracing::warn!("Region box {:?} lies outside the frame, no crop produced", bbox);
            return Ok(None);
        };

        let view = Mat::roi(&self.image, roi)?;
        let mut region = Mat::default();
        view.copy_to(&mut region)?;

        let mut resized = Mat::default();
        imgproc::resize(
            &region,
            &mut resized,
            Size::new(size, size),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        Ok(Some(Crop {
            image: resized,
            offset: Offset {
                dx: roi.x,
                dy: roi.y,
            },
        }))
    }

    /// Crops for every subject or every region, index-aligned with the
    /// corresponding box sequence. `None` marks `Absent` (or out-of-frame).
    pub fn crop(&self, kind: CropKind) -> Result<Vec<Option<Crop>>, FrameError> {
        match kind {
            CropKind::Subject => (0..self.subject_boxes.len())
                .map(|i| self.subject_crop(i))
                .collect(),
            CropKind::Region => self
                .region_boxes
                .iter()
                .map(|r| self.region_crop(r, REGION_CROP_SIZE))
                .collect(),
        }
    }

    /// Draw region boxes, then subject boxes with their labels.
    ///
    /// Both passes always run; if either fails the first error is returned
    /// after the other pass has finished.
    pub fn render_annotations(&mut self) -> Result<(), FrameError> {
        let regions = self.render_region_boxes();
        let subjects = self.render_subject_boxes();
        regions.and(subjects)
    }

    pub fn render_region_boxes(&mut self) -> Result<(), FrameError> {
        draw_region_boxes(&mut self.image, &self.region_boxes)
    }

    fn render_subject_boxes(&mut self) -> Result<(), FrameError> {
        if self.subject_labels.len() != self.subject_boxes.len() {
            return Err(self.misaligned(self.region_boxes.len()).into());
        }

        for (bbox, label) in self.subject_boxes.iter().zip(&self.subject_labels) {
            imgproc::rectangle_points(
                &mut self.image,
                Point::new(bbox.x1, bbox.y1),
                Point::new(bbox.x2, bbox.y2),
                color(BOX_COLOR),
                BOX_THICKNESS,
                imgproc::LINE_8,
                0,
            )?;

            let mut baseline = 0;
            let text = imgproc::get_text_size(label, FONT_FACE, FONT_SCALE, FONT_THICKNESS, &mut baseline)?;
            imgproc::rectangle_points(
                &mut self.image,
                Point::new(bbox.x1, bbox.y1 - text.height),
                Point::new(bbox.x1 + text.width, bbox.y1),
                color(BOX_COLOR),
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )?;
            imgproc::put_text(
                &mut self.image,
                label,
                Point::new(bbox.x1, bbox.y1),
                FONT_FACE,
                FONT_SCALE,
                color(TEXT_COLOR),
                FONT_THICKNESS,
                imgproc::LINE_8,
                false,
            )?;
        }

        Ok(())
    }
}

/// Draw every present region box as an unfilled rectangle, skipping `Absent`.
pub fn draw_region_boxes(image: &mut Mat, regions: &[RegionBox]) -> Result<(), FrameError> {
    for bbox in regions.iter().filter_map(RegionBox::as_box) {
        imgproc::rectangle_points(
            image,
            Point::new(bbox.x1, bbox.y1),
            Point::new(bbox.x2, bbox.y2),
            color(BOX_COLOR),
            BOX_THICKNESS,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(())
}

/// Sum over all channels; zero means nothing has been drawn on a black image.
#[cfg(test)]
pub(crate) fn pixel_sum(image: &Mat) -> f64 {
    let s = opencv::core::sum_elems(image).unwrap();
    s[0] + s[1] + s[2] + s[3]
}

#[cfg(test)]
pub(crate) fn black_image(width: i32, height: i32) -> Mat {
    Mat::new_rows_cols_with_default(height, width, opencv::core::CV_8UC3, Scalar::all(0.0))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;

    fn frame_with_subject() -> Frame {
        let mut frame = Frame::new(black_image(100, 100));
        frame
            .push_subject(PixelBox::new(10, 10, 51, 51), "person: 90% ".to_string())
            .unwrap();
        frame
    }

    #[test]
    fn test_subject_crop_carries_offset() {
        let frame = frame_with_subject();
        let crops = frame.crop(CropKind::Subject).unwrap();
        assert_eq!(crops.len(), 1);

        let crop = crops[0].as_ref().unwrap();
        assert_eq!(crop.offset, Offset { dx: 10, dy: 10 });
        assert_eq!(crop.image.cols(), 42);
        assert_eq!(crop.image.rows(), 42);
    }

    #[test]
    fn test_subject_crop_outside_image_is_none() {
        let mut frame = Frame::new(black_image(100, 100));
        frame
            .push_subject(PixelBox::new(150, 150, 180, 190), "person: 70% ".to_string())
            .unwrap();
        let crops = frame.crop(CropKind::Subject).unwrap();
        assert!(crops[0].is_none());
    }

    #[test]
    fn test_subject_crop_past_edge_is_clipped() {
        let mut frame = Frame::new(black_image(100, 80));
        frame
            .push_subject(PixelBox::new(90, 70, 130, 120), "person: 70% ".to_string())
            .unwrap();
        let crop = frame.subject_crop(0).unwrap().unwrap();
        assert_eq!((crop.image.cols(), crop.image.rows()), (10, 10));
        assert_eq!(crop.offset, Offset { dx: 90, dy: 70 });
        // The stored box itself is not clamped to the image.
        assert_eq!(frame.subject_boxes()[0].x2, 130);
    }

    #[test]
    fn test_region_crop_resizes_and_propagates_absent() {
        let mut frame = Frame::new(black_image(100, 100));
        frame
            .push_subject(PixelBox::new(0, 0, 40, 40), "person: 80% ".to_string())
            .unwrap();
        frame
            .push_subject(PixelBox::new(50, 50, 90, 90), "person: 60% ".to_string())
            .unwrap();
        frame
            .push_region(RegionBox::Present(PixelBox::new(5, 5, 20, 30)))
            .unwrap();
        frame.push_region(RegionBox::Absent).unwrap();

        let crops = frame.crop(CropKind::Region).unwrap();
        assert_eq!(crops.len(), 2);
        let first = crops[0].as_ref().unwrap();
        assert_eq!((first.image.cols(), first.image.rows()), (64, 64));
        assert!(crops[1].is_none());
    }

    #[test]
    fn test_push_region_beyond_subjects_is_rejected() {
        let mut frame = frame_with_subject();
        frame.push_region(RegionBox::Absent).unwrap();
        let err = frame.push_region(RegionBox::Absent).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::Misaligned {
                boxes: 1,
                labels: 1,
                regions: 2
            }
        );
    }

    #[test]
    fn test_check_alignment_detects_missing_regions() {
        let frame = frame_with_subject();
        assert!(frame.check_alignment().is_err());

        let mut frame = frame_with_subject();
        frame.push_region(RegionBox::Absent).unwrap();
        assert!(frame.check_alignment().is_ok());
    }

    #[test]
    fn test_push_subject_rejects_inverted_box() {
        let mut frame = Frame::new(black_image(10, 10));
        let err = frame
            .push_subject(PixelBox::new(5, 5, 1, 1), "x".to_string())
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::InvertedBox(_)));
        assert!(frame.subject_boxes().is_empty());
        assert!(frame.subject_labels().is_empty());
    }

    #[test]
    fn test_render_draws_subject_box_edges() {
        let mut frame = frame_with_subject();
        frame.push_region(RegionBox::Absent).unwrap();
        frame.render_annotations().unwrap();

        let image = frame.image();
        let edge = image.at_2d::<Vec3b>(30, 10).unwrap();
        assert_eq!(edge[0], 255);
        assert_eq!(edge[2], 0);

        let inside = image.at_2d::<Vec3b>(30, 30).unwrap();
        assert_eq!(inside[0], 0);
    }

    #[test]
    fn test_render_region_boxes_skips_absent() {
        let mut frame = frame_with_subject();
        frame.push_region(RegionBox::Absent).unwrap();
        frame.render_region_boxes().unwrap();
        assert_eq!(pixel_sum(frame.image()), 0.0);

        let mut frame = frame_with_subject();
        frame
            .push_region(RegionBox::Present(PixelBox::new(20, 20, 30, 30)))
            .unwrap();
        frame.render_region_boxes().unwrap();
        let edge = frame.image().at_2d::<Vec3b>(25, 20).unwrap();
        assert_eq!(edge[0], 255);
    }

    #[test]
    fn test_render_without_detections_draws_nothing() {
        let mut frame = Frame::new(black_image(32, 24));
        frame.render_annotations().unwrap();
        assert_eq!(pixel_sum(frame.image()), 0.0);
    }

    #[test]
    fn test_clear_detections_keeps_image() {
        let mut frame = frame_with_subject();
        frame.push_region(RegionBox::Absent).unwrap();
        frame.clear_detections();
        assert!(frame.subject_boxes().is_empty());
        assert!(frame.region_boxes().is_empty());
        assert_eq!(frame.width(), 100);
    }
}
