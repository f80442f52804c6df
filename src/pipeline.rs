use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{LabelCounts, RipenessTally};
use crate::cache::ModelCache;
use crate::class_mapping::ClassMapping;
use crate::detection::DetectionBox;
use crate::errors::{RipenessError, Result};
use crate::loader::{decode_image, load_image};
use crate::preprocess::{resize_exact, ScaleFactors, TargetSize};
use crate::render::{encode_png, to_base64, Annotator};
use crate::traits::{ModelLoader, ObjectDetector};

/// Result of one inference call.
///
/// Serializes to the response object (`count`, `ripeness`, `dominant_ripeness`, `shelf_life`,
/// `predictions`). The annotated PNG travels separately.
#[derive(Debug, Clone, Serialize)]
pub struct RipenessSummary {
    #[serde(rename = "count")]
    detection_count: usize,
    #[serde(rename = "ripeness")]
    label_counts: LabelCounts,
    #[serde(rename = "dominant_ripeness", skip_serializing_if = "Option::is_none")]
    dominant_label: Option<String>,
    shelf_life: String,
    #[serde(rename = "predictions")]
    detections: Vec<DetectionBox>,
    #[serde(skip)]
    annotated_png: Vec<u8>,
}

impl RipenessSummary {
    pub const fn detection_count(&self) -> usize {
        self.detection_count
    }

    pub const fn label_counts(&self) -> &LabelCounts {
        &self.label_counts
    }

    pub fn dominant_label(&self) -> Option<&str> {
        self.dominant_label.as_deref()
    }

    pub fn shelf_life(&self) -> &str {
        &self.shelf_life
    }

    /// Detections in detector output order, in original-image pixels.
    pub fn detections(&self) -> &[DetectionBox] {
        &self.detections
    }

    pub fn annotated_png(&self) -> &[u8] {
        &self.annotated_png
    }

    pub fn annotated_base64(&self) -> String {
        to_base64(&self.annotated_png)
    }

    /// Body for the upload endpoint: raw predictions plus the annotated image.
    pub fn to_response(&self) -> InferenceResponse {
        InferenceResponse {
            predictions: self.detections.clone(),
            image_base64: self.annotated_base64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceResponse {
    pub predictions: Vec<DetectionBox>,
    pub image_base64: String,
}

/// Loader, preprocessor, detector, aggregator and renderer chained for single images.
///
/// The pipeline itself is stateless apart from the shared model cache, so one instance can
/// serve many threads.
pub struct RipenessPipeline<L: ModelLoader> {
    cache: Arc<ModelCache<L>>,
    target_size: TargetSize,
    annotator: Annotator,
}

impl<L: ModelLoader> RipenessPipeline<L> {
    pub fn new(cache: Arc<ModelCache<L>>, target_size: TargetSize) -> Result<Self> {
        Ok(Self::with_annotator(cache, target_size, Annotator::new()?))
    }

    pub fn with_annotator(
        cache: Arc<ModelCache<L>>,
        target_size: TargetSize,
        annotator: Annotator,
    ) -> Self {
        Self {
            cache,
            target_size,
            annotator,
        }
    }

    pub const fn cache(&self) -> &Arc<ModelCache<L>> {
        &self.cache
    }

    pub const fn target_size(&self) -> TargetSize {
        self.target_size
    }

    pub fn run_inference(
        &self,
        image_path: &Path,
        weights_path: &Path,
        mapping_path: &Path,
    ) -> Result<RipenessSummary> {
        self.run(weights_path, mapping_path, &image_path.display().to_string(), || {
            load_image(image_path)
        })
    }

    /// Same as [`run_inference`](Self::run_inference) for an in-memory upload. `identifier`
    /// names the upload in errors and logs.
    pub fn run_inference_bytes(
        &self,
        bytes: &[u8],
        identifier: &str,
        weights_path: &Path,
        mapping_path: &Path,
    ) -> Result<RipenessSummary> {
        self.run(weights_path, mapping_path, identifier, || {
            decode_image(bytes, identifier)
        })
    }

    fn run<F>(
        &self,
        weights_path: &Path,
        mapping_path: &Path,
        identifier: &str,
        decode: F,
    ) -> Result<RipenessSummary>
    where
        F: FnOnce() -> Result<RgbImage>,
    {
        let started = Instant::now();

        let model = self.cache.get_or_load(weights_path)?;
        if model.input_size() != self.target_size {
            return Err(RipenessError::validation(
                "target size",
                format!(
                    "{}x{} does not match the model input {}x{}",
                    self.target_size.width(),
                    self.target_size.height(),
                    model.input_size().width(),
                    model.input_size().height()
                ),
            ));
        }
        let mapping = ClassMapping::from_path(mapping_path)?;
        let image = decode()?;

        let summary = self.summarize(model.as_ref(), &mapping, &image)?;
        info!(
            image = identifier,
            count = summary.detection_count,
            dominant = summary.dominant_label.as_deref().unwrap_or("-"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inference complete"
        );
        Ok(summary)
    }

    fn summarize(
        &self,
        model: &L::Model,
        mapping: &ClassMapping,
        image: &RgbImage,
    ) -> Result<RipenessSummary> {
        let resized = resize_exact(image, self.target_size)?;
        let detections = model.detect(&resized)?;
        drop(resized);

        let factors = ScaleFactors::between(image.dimensions(), self.target_size);
        let detections = if factors.is_identity() {
            detections
        } else {
            detections
                .iter()
                .map(|detection| detection.rescale(factors))
                .collect::<Result<Vec<_>>>()?
        };
        debug!(detections = detections.len(), ?factors, "detections in original resolution");

        let tally = RipenessTally::from_detections(&detections, mapping);
        let dominant_label = tally.dominant().map(str::to_string);
        let shelf_life = tally.shelf_life().to_string();

        let annotated = self.annotator.annotate(image, &detections);
        let annotated_png = encode_png(&annotated)?;

        Ok(RipenessSummary {
            detection_count: detections.len(),
            label_counts: tally.into_counts(),
            dominant_label,
            shelf_life,
            detections,
            annotated_png,
        })
    }
}
