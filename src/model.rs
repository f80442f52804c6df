use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use ndarray::prelude::*;
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::detection::{BoundingBox, DetectionBox};
use crate::errors::{RipenessError, Result};
use crate::preprocess::{to_nchw_tensor, TargetSize};
use crate::traits::{ModelLoader, ObjectDetector};

/// Confidence below which candidates are discarded (the detector's export default).
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
/// IoU above which a lower-scored box of the same class is suppressed.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
/// Upper bound on detections returned for one image.
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Box coordinates plus at least one class score per anchor.
const MIN_FEATURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

/// Session settings for `OnnxLoader`.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub device_id: i32,
    pub intra_threads: usize,
    /// Used when the graph declares dynamic spatial axes.
    pub fallback_input_size: TargetSize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            device_id: 0,
            intra_threads: 1,
            fallback_input_size: TargetSize::default(),
        }
    }
}

/// Loads YOLO detectors exported to ONNX.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader {
    options: DetectorOptions,
}

impl OnnxLoader {
    pub const fn new(options: DetectorOptions) -> Self {
        Self { options }
    }
}

impl ModelLoader for OnnxLoader {
    type Model = YoloDetector;

    fn load(&self, weights_path: &Path) -> Result<YoloDetector> {
        YoloDetector::new(weights_path, self.options)
    }
}

pub struct YoloDetector {
    input_size: TargetSize,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl YoloDetector {
    pub fn new(weights_path: &Path, options: DetectorOptions) -> Result<Self> {
        let started = Instant::now();
        let load_error = |operation: &str, e: ort::Error| {
            RipenessError::model_load(weights_path, operation, e)
        };

        if !weights_path.is_file() {
            return Err(RipenessError::model_load(
                weights_path,
                "weights file lookup",
                std::io::Error::new(std::io::ErrorKind::NotFound, "weights file does not exist"),
            ));
        }

        let mut session = SessionBuilder::new()
            .map_err(|e| load_error("session builder init", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
            ])
            .map_err(|e| load_error("execution provider setup", e))?
            .with_intra_threads(options.intra_threads.max(1))
            .map_err(|e| load_error("intra-op thread setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| load_error("memory pattern setup", e))?
            .commit_from_file(weights_path)
            .map_err(|e| load_error("weights file load", e))?;

        let input = session.inputs.first().ok_or_else(|| {
            RipenessError::model_load(weights_path, "input lookup", "model has no inputs")
        })?;
        let shape = input.input_type.tensor_shape().ok_or_else(|| {
            RipenessError::model_load(weights_path, "input shape lookup", "input is not a tensor")
        })?;
        if shape.len() != 4 || !(shape[1] == 3 || shape[1] < 0) {
            return Err(RipenessError::model_load(
                weights_path,
                "input shape check",
                format!("expected a [batch, 3, height, width] input, got {:?}", &shape[..]),
            ));
        }
        let input_size = match (shape[3], shape[2]) {
            (w, h) if w > 0 && h > 0 => TargetSize::new(w as u32, h as u32)?,
            _ => options.fallback_input_size,
        };
        let input_name = input.name.clone();

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| {
                RipenessError::model_load(weights_path, "output lookup", "model has no outputs")
            })?;

        // initialize model
        let data = Array4::<f32>::zeros((
            1,
            3,
            input_size.height() as usize,
            input_size.width() as usize,
        ));
        session
            .run(ort::inputs![
                input_name.as_str() => TensorRef::from_array_view(&data)
                    .map_err(|e| load_error("warm-up tensor creation", e))?
            ])
            .map_err(|e| load_error("warm-up run", e))?;

        info!(
            weights = %weights_path.display(),
            width = input_size.width(),
            height = input_size.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "detector loaded"
        );

        Ok(Self {
            input_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    /// Raw model output, `[1, 4 + classes, anchors]` or its transpose.
    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned())
    }
}

impl ObjectDetector for YoloDetector {
    fn input_size(&self) -> TargetSize {
        self.input_size
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionBox>> {
        if image.dimensions() != (self.input_size.width(), self.input_size.height()) {
            return Err(RipenessError::validation(
                "detector input",
                format!(
                    "is {}x{}, expected {}x{}",
                    image.width(),
                    image.height(),
                    self.input_size.width(),
                    self.input_size.height()
                ),
            ));
        }

        let tensor = to_nchw_tensor(image);
        let output = self.predict(tensor.view())?;
        let predictions = features_by_anchor(output)?;
        let detections = decode_predictions(
            predictions.view(),
            self.input_size,
            DecodeParams::default(),
        );
        debug!(detections = detections.len(), "detector finished");
        Ok(detections)
    }
}

/// Normalize a YOLO head output to `(features, anchors)`.
///
/// Exports emit `[1, features, anchors]`; some converters transpose to
/// `[1, anchors, features]`. Anchors always outnumber features.
pub fn features_by_anchor(output: ArrayD<f32>) -> Result<Array2<f32>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(RipenessError::inference(
            "output shape check",
            format!("expected [1, features, anchors], got {shape:?}"),
        ));
    }

    let output = output.into_dimensionality::<Ix3>()?.index_axis_move(Axis(0), 0);
    let output = if shape[1] <= shape[2] {
        output
    } else {
        output.reversed_axes().as_standard_layout().to_owned()
    };

    if output.nrows() < MIN_FEATURES {
        return Err(RipenessError::inference(
            "output shape check",
            format!("{} features per anchor is too few", output.nrows()),
        ));
    }
    Ok(output)
}

/// Turn `(features, anchors)` predictions into detections in input pixel space.
///
/// Rows 0..4 hold centre x, centre y, width and height; the remaining rows hold one
/// post-sigmoid score per class. Boxes are clamped to the input canvas and degenerate ones
/// dropped, then class-aware NMS is applied. The result is ordered by descending confidence.
pub fn decode_predictions(
    predictions: ArrayView2<f32>,
    input_size: TargetSize,
    params: DecodeParams,
) -> Vec<DetectionBox> {
    let (max_x, max_y) = (input_size.width() as f32, input_size.height() as f32);
    let mut candidates = Vec::new();

    for anchor in predictions.columns() {
        let (class_index, score) = anchor.iter().skip(4).enumerate().fold(
            (0usize, f32::NEG_INFINITY),
            |(best_idx, best_score), (idx, &score)| {
                if score > best_score {
                    (idx, score)
                } else {
                    (best_idx, best_score)
                }
            },
        );
        if !score.is_finite() || score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        let Ok(bbox) = BoundingBox::new(
            (cx - w / 2.0).clamp(0.0, max_x),
            (cy - h / 2.0).clamp(0.0, max_y),
            (cx + w / 2.0).clamp(0.0, max_x),
            (cy + h / 2.0).clamp(0.0, max_y),
        ) else {
            continue;
        };

        if let Ok(detection) = DetectionBox::new(bbox, score.min(1.0), class_index) {
            candidates.push(detection);
        }
    }

    candidates.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    non_max_suppression(candidates, params.iou_threshold, params.max_detections)
}

fn non_max_suppression(
    candidates: Vec<DetectionBox>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<DetectionBox> {
    let mut kept: Vec<DetectionBox> = Vec::with_capacity(candidates.len().min(max_detections));

    for candidate in candidates {
        if kept.len() == max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_index() == candidate.class_index()
                && k.coordinates().iou(candidate.coordinates()) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}
