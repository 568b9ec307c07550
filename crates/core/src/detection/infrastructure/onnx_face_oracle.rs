//! Face oracle backed by two ONNX models: a YOLO face detector and an
//! ArcFace embedder run on a square crop around each detection.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;

use crate::detection::domain::face_oracle::{FaceDetection, FaceOracle};
use crate::detection::infrastructure::onnx_session::{open_session, square_input_size};
use crate::identity::domain::embedding::l2_normalize;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Fallback detector resolution when the model input is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

const NMS_IOU_THRESH: f64 = 0.45;

const EMBEDDING_INPUT_SIZE: u32 = 112;
const EMBEDDING_MEAN: f32 = 127.5;
const EMBEDDING_STD: f32 = 127.5;

/// YOLO letterbox padding value.
const PAD_GRAY: f32 = 114.0 / 255.0;

pub struct OnnxFaceOracle {
    detector: Session,
    embedder: Session,
    input_size: u32,
    confidence: f64,
}

impl OnnxFaceOracle {
    pub fn new(
        detector_path: &Path,
        embedder_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = open_session(detector_path)?;
        let input_size = square_input_size(&detector).unwrap_or(DEFAULT_INPUT_SIZE);
        let embedder = open_session(embedder_path)?;
        Ok(Self {
            detector,
            embedder,
            input_size,
            confidence,
        })
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (tensor, letterbox) = letterbox(frame, self.input_size);
        let input = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.detector.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("face detector produced no outputs".into());
        }
        let output = outputs[0].try_extract_array::<f32>()?;
        let data = output
            .as_slice()
            .ok_or("face detector output is not contiguous")?;
        let mut detections = decode_detections(data, output.shape(), self.confidence, &letterbox)?;
        Ok(nms(&mut detections, NMS_IOU_THRESH))
    }

    fn embed(&mut self, crop: &RgbImage) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let input = ort::value::Tensor::from_array(embedding_tensor(crop))?;
        let outputs = self.embedder.run(ort::inputs![input])?;
        let output = outputs[0].try_extract_array::<f32>()?;
        let mut embedding = output
            .as_slice()
            .ok_or("embedding output is not contiguous")?
            .to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl FaceOracle for OnnxFaceOracle {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        let image = frame.image();
        let mut faces = Vec::new();
        for det in self.detect(frame)? {
            let Some(crop) = square_crop(image, &det.bbox) else {
                log::debug!("Skipping face outside frame {}: {:?}", frame.index(), det.bbox);
                continue;
            };
            let embedding = self.embed(&crop)?;
            faces.push(FaceDetection {
                bbox: det.bbox,
                score: det.confidence,
                embedding,
            });
        }
        Ok(faces)
    }
}

/// Maps detector coordinates back to the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(&self, cx: f64, cy: f64, w: f64, h: f64) -> BoundingBox {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        BoundingBox::new(
            (cx - w / 2.0 - px) / self.scale,
            (cy - h / 2.0 - py) / self.scale,
            (cx + w / 2.0 - px) / self.scale,
            (cy + h / 2.0 - py) / self.scale,
        )
    }
}

/// Nearest-neighbour resize into a gray-padded `size` x `size` NCHW tensor.
fn letterbox(frame: &Frame, size: u32) -> (Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(size);
    let new_h = ((fh * scale).round() as u32).min(size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let mut tensor = Array4::<f32>::from_elem((1, 3, size as usize, size as usize), PAD_GRAY);
    let src = frame.image();
    for y in 0..new_h {
        let sy = ((y as f64 / scale) as u32).min(src.height() - 1);
        for x in 0..new_w {
            let sx = ((x as f64 / scale) as u32).min(src.width() - 1);
            let pixel = src.get_pixel(sx, sy);
            let (ty, tx) = ((pad_y + y) as usize, (pad_x + x) as usize);
            for (c, value) in pixel.0.iter().enumerate() {
                tensor[[0, c, ty, tx]] = *value as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

#[derive(Clone, Debug, PartialEq)]
struct RawDetection {
    bbox: BoundingBox,
    confidence: f64,
}

/// Parses YOLO rows `[cx, cy, w, h, conf, ...]`. The output may be laid out
/// as `[1, features, detections]` or `[1, detections, features]`.
fn decode_detections(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, String> {
    if shape.len() != 3 {
        return Err(format!("unexpected face detector output shape {shape:?}"));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(format!("face detector output too small for shape {shape:?}"));
    }

    let value = |det: usize, feat: usize| -> f64 {
        let i = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[i] as f64
    };

    let detections = (0..num_dets)
        .filter(|&i| value(i, 4) >= confidence)
        .map(|i| RawDetection {
            bbox: letterbox.to_frame(value(i, 0), value(i, 1), value(i, 2), value(i, 3)),
            confidence: value(i, 4),
        })
        .collect();
    Ok(detections)
}

/// Greedy NMS; the result is ordered by descending confidence.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

/// Square crop centred on the box with side `max(w, h)`, clipped to the image.
fn square_crop(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let cx = (bbox.x0 + bbox.x1) / 2.0;
    let cy = (bbox.y0 + bbox.y1) / 2.0;
    let half = bbox.size() / 2.0;
    let square = BoundingBox::new(cx - half, cy - half, cx + half, cy + half);
    let (x0, y0, x1, y1) = square.clamped(image.width(), image.height())?;
    Some(imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// ArcFace input: 112x112, `(v - 127.5) / 127.5`, NCHW.
fn embedding_tensor(crop: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(
        crop,
        EMBEDDING_INPUT_SIZE,
        EMBEDDING_INPUT_SIZE,
        FilterType::Triangle,
    );
    let side = EMBEDDING_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel.0[c] as f32 - EMBEDDING_MEAN) / EMBEDDING_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const IDENTITY: Letterbox = Letterbox {
        scale: 1.0,
        pad_x: 0,
        pad_y: 0,
    };

    fn raw(x0: f64, y0: f64, x1: f64, y1: f64, confidence: f64) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(x0, y0, x1, y1),
            confidence,
        }
    }

    #[test]
    fn test_letterbox_wide_frame_pads_vertically() {
        let frame = Frame::new(RgbImage::from_pixel(200, 100, image::Rgb([255; 3])), 0);
        let (tensor, lb) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 1e-9);
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));
        assert_relative_eq!(tensor[[0, 0, 0, 0]], PAD_GRAY);
        assert_relative_eq!(tensor[[0, 0, 161, 1]], 1.0);
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 100,
        };
        let b = lb.to_frame(100.0, 200.0, 40.0, 60.0);
        assert_eq!(b, BoundingBox::new(40.0, 35.0, 60.0, 65.0));
    }

    #[test]
    fn test_decode_row_major_layout() {
        // two detections x 5 features
        let data = [
            50.0, 50.0, 20.0, 20.0, 0.9, //
            10.0, 10.0, 4.0, 4.0, 0.1,
        ];
        let dets = decode_detections(&data, &[1, 2, 5], 0.5, &IDENTITY).unwrap();
        assert_eq!(dets, vec![raw(40.0, 40.0, 60.0, 60.0, 0.9f32 as f64)]);
    }

    #[test]
    fn test_decode_transposed_layout() {
        // 5 features x 8 detections, only the third passes
        let mut data = vec![0.0f32; 5 * 8];
        let det = 2;
        for (feat, v) in [30.0, 40.0, 10.0, 20.0, 0.75].into_iter().enumerate() {
            data[feat * 8 + det] = v;
        }
        let dets = decode_detections(&data, &[1, 5, 8], 0.5, &IDENTITY).unwrap();
        assert_eq!(dets, vec![raw(25.0, 30.0, 35.0, 50.0, 0.75)]);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_detections(&[0.0; 4], &[4], 0.5, &IDENTITY).is_err());
        assert!(decode_detections(&[0.0; 4], &[1, 1, 4], 0.5, &IDENTITY).is_err());
    }

    #[test]
    fn test_nms_keeps_highest_confidence_first() {
        let mut dets = vec![
            raw(200.0, 200.0, 250.0, 250.0, 0.6),
            raw(0.0, 0.0, 100.0, 100.0, 0.5),
            raw(2.0, 2.0, 102.0, 102.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.45);
        let scores: Vec<f64> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.6]);
    }

    #[test]
    fn test_square_crop_is_centred_and_clipped() {
        let image = RgbImage::new(100, 80);
        let crop = square_crop(&image, &BoundingBox::new(40.0, 30.0, 60.0, 70.0)).unwrap();
        assert_eq!(crop.dimensions(), (40, 40));

        let edge = square_crop(&image, &BoundingBox::new(-10.0, -10.0, 10.0, 10.0)).unwrap();
        assert_eq!(edge.dimensions(), (10, 10));

        assert!(square_crop(&image, &BoundingBox::new(200.0, 0.0, 220.0, 20.0)).is_none());
    }

    #[test]
    fn test_embedding_tensor_normalization() {
        let crop = RgbImage::from_pixel(30, 30, image::Rgb([255, 0, 127]));
        let tensor = embedding_tensor(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert_relative_eq!(tensor[[0, 0, 5, 5]], 1.0, epsilon = 1e-2);
        assert_relative_eq!(tensor[[0, 1, 5, 5]], -1.0, epsilon = 1e-2);
        assert_relative_eq!(tensor[[0, 2, 5, 5]], -0.5 / 127.5, epsilon = 1e-2);
    }
}
