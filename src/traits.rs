use std::path::Path;

use image::RgbImage;

use crate::detection::DetectionBox;
use crate::errors::Result;
use crate::preprocess::TargetSize;

/// Object detector over preprocessed images.
///
/// Implementations must be safe to call from several threads at once. If the backend cannot
/// run concurrent inference on one instance it has to serialize calls internally.
pub trait ObjectDetector: Send + Sync {
    /// Resolution the detector expects its input resized to.
    fn input_size(&self) -> TargetSize;

    /// Detect objects in an image already resized to `input_size()`.
    ///
    /// Boxes are in the coordinate space of `image` and in detector output order.
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionBox>>;
}

/// Builds a detector from a weights file. The expensive step a `ModelCache` guards.
pub trait ModelLoader: Send + Sync {
    type Model: ObjectDetector;

    fn load(&self, weights_path: &Path) -> Result<Self::Model>;
}
