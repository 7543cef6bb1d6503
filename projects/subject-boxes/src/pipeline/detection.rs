use crate::pipeline::detector::SubjectDetector;
use crate::pipeline::error::DetectorError;
use crate::pipeline::types::{NormalizedBox, SubjectDetection};
use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::Mat;
use opencv::prelude::*;
use usls::models::RTDETR;
use usls::{Config, Image};

/// Subject detector backed by the USLS RT-DETR model (COCO-80 classes).
///
/// Handles BGR-to-RGB conversion, corrects for the aspect-ratio padding bug in
/// the underlying model library, and normalizes boxes to [0, 1].
pub struct RtdetrSubjectDetector {
    model: RTDETR,
}

impl RtdetrSubjectDetector {
    /// Create a new detector with the given model path.
    pub fn new(model_path: &str) -> Result<Self> {
        let config = Config::default()
            .with_model_file(model_path)
            .with_class_names(&usls::NAMES_COCO_80);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = RTDETR::new(config)?;
        tracing::info!("Loaded subject model from {}", model_path);
        Ok(Self { model })
    }

    /// Run the model on one BGR image, returning corrected pixel-space boxes.
    fn forward(&mut self, image: &Mat) -> Result<Vec<usls::Hbb>> {
        let dynamic_image = mat_to_dynamic_image(image)?;

        // Correction calculations (USLS RT-DETR bug workaround)
        let size = image.size()?;
        let img_w = size.width as f32;
        let img_h = size.height as f32;

        let (x_correction, y_correction) = if img_w > img_h {
            (img_w / img_h, 1.0)
        } else if img_h > img_w {
            (1.0, img_h / img_w)
        } else {
            (1.0, 1.0)
        };

        let results = self.model.forward(&[Image::from(dynamic_image)])?;
        let y = results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model returned no result for the frame"))?;

        let corrected = y
            .hbbs
            .into_iter()
            .map(|hbb| {
                let x = hbb.xmin() * x_correction;
                let w = hbb.width() * x_correction;
                let y_coord = hbb.ymin() * y_correction;
                let h = hbb.height() * y_correction;

                let mut new_hbb = usls::Hbb::default().with_xyxy(x, y_coord, x + w, y_coord + h);

                if let Some(conf) = hbb.confidence() {
                    new_hbb = new_hbb.with_confidence(conf);
                }
                if let Some(id) = hbb.id() {
                    new_hbb = new_hbb.with_id(id);
                }

                new_hbb
            })
            .collect();

        Ok(corrected)
    }
}

impl SubjectDetector for RtdetrSubjectDetector {
    fn detect(&mut self, image: &Mat) -> Result<Vec<SubjectDetection>, DetectorError> {
        let hbbs = self
            .forward(image)
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let size = image.size()?;
        let img_w = size.width as f32;
        let img_h = size.height as f32;
        if img_w <= 0.0 || img_h <= 0.0 {
            return Err(DetectorError::Malformed(format!(
                "empty input image {}x{}",
                size.width, size.height
            )));
        }

        let mut detections: Vec<SubjectDetection> = hbbs
            .into_iter()
            .filter_map(|hbb| {
                let (Some(class_id), Some(score)) = (hbb.id(), hbb.confidence()) else {
                    tracing::debug!("Skipping detection without class id or confidence");
                    return None;
                };
                Some(SubjectDetection {
                    bbox: NormalizedBox {
                        x1: hbb.xmin() / img_w,
                        y1: hbb.ymin() / img_h,
                        x2: (hbb.xmin() + hbb.width()) / img_w,
                        y2: (hbb.ymin() + hbb.height()) / img_h,
                    },
                    class_id,
                    score,
                })
            })
            .collect();

        // The box cap keeps the first N, so most confident first.
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(detections)
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        usls::NAMES_COCO_80.get(class_id).copied()
    }
}

/// Convert an OpenCV Mat (BGR) to an image::DynamicImage (RGB)
fn mat_to_dynamic_image(mat: &Mat) -> Result<DynamicImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let data_bytes = rgb_mat.data_bytes()?;
    let buffer = data_bytes.to_vec();

    let img_buffer = ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, buffer)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    #[test]
    fn test_mat_to_dynamic_image_swaps_channels() {
        // Pure blue in BGR.
        let mat =
            Mat::new_rows_cols_with_default(4, 6, CV_8UC3, Scalar::new(255.0, 0.0, 0.0, 0.0))
                .unwrap();
        assert_eq!(mat.at_2d::<Vec3b>(0, 0).unwrap()[0], 255);

        let img = mat_to_dynamic_image(&mat).unwrap();
        assert_eq!((img.width(), img.height()), (6, 4));

        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 255]);
    }
}
