use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use image::RgbImage;

use crate::detection::{BoundingBox, DetectionBox};
use crate::errors::{RipenessError, Result};
use crate::preprocess::TargetSize;
use crate::traits::{ModelLoader, ObjectDetector};

/// Build a detection from `[x1, y1, x2, y2]` corners.
pub fn detection(class_index: usize, confidence: f32, corners: [f32; 4]) -> Result<DetectionBox> {
    let [x1, y1, x2, y2] = corners;
    DetectionBox::new(BoundingBox::new(x1, y1, x2, y2)?, confidence, class_index)
}

/// Detector returning a fixed list of detections for every image.
#[derive(Debug)]
pub struct ScriptedDetector {
    input_size: TargetSize,
    detections: Vec<DetectionBox>,
    fail_inference: bool,
    detect_calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(detections: Vec<DetectionBox>) -> Self {
        Self {
            input_size: TargetSize::default(),
            detections,
            fail_inference: false,
            detect_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_input_size(mut self, input_size: TargetSize) -> Self {
        self.input_size = input_size;
        self
    }

    /// Every `detect` call fails with an inference error.
    pub fn failing(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

impl ObjectDetector for ScriptedDetector {
    fn input_size(&self) -> TargetSize {
        self.input_size
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionBox>> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if image.dimensions() != (self.input_size.width(), self.input_size.height()) {
            return Err(RipenessError::validation(
                "detector input",
                format!("is {}x{}, not preprocessed", image.width(), image.height()),
            ));
        }
        if self.fail_inference {
            return Err(RipenessError::inference(
                "scripted detection",
                "detector configured to fail",
            ));
        }
        Ok(self.detections.clone())
    }
}

/// Loader that counts how often the expensive load step runs.
#[derive(Debug)]
pub struct CountingLoader {
    detections: Vec<DetectionBox>,
    input_size: TargetSize,
    load_delay: Duration,
    fail_next: AtomicBool,
    fail_inference: bool,
    loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(detections: Vec<DetectionBox>) -> Self {
        Self {
            detections,
            input_size: TargetSize::default(),
            load_delay: Duration::ZERO,
            fail_next: AtomicBool::new(false),
            fail_inference: false,
            loads: AtomicUsize::new(0),
        }
    }

    /// Sleep inside `load` to widen the window for racing callers.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_input_size(mut self, input_size: TargetSize) -> Self {
        self.input_size = input_size;
        self
    }

    /// The next load fails with a model load error; later loads succeed.
    pub fn failing_once(self) -> Self {
        self.fail_next.store(true, Ordering::SeqCst);
        self
    }

    /// Loaded detectors fail every inference.
    pub fn with_failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for CountingLoader {
    type Model = ScriptedDetector;

    fn load(&self, weights_path: &Path) -> Result<ScriptedDetector> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RipenessError::model_load(
                weights_path,
                "scripted load",
                "loader configured to fail",
            ));
        }

        let detector =
            ScriptedDetector::new(self.detections.clone()).with_input_size(self.input_size);
        Ok(if self.fail_inference {
            detector.failing()
        } else {
            detector
        })
    }
}
