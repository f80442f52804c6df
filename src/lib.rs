pub mod aggregate;
pub mod cache;
pub mod class_mapping;
pub mod config;
pub mod detection;
pub mod errors;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod service;
pub mod shelf_life;
pub mod traits;

pub mod mocks;

use std::path::{Path, PathBuf};

use image::ImageFormat;
use walkdir::WalkDir;

pub use aggregate::{LabelCounts, RipenessTally};
pub use cache::ModelCache;
pub use class_mapping::{ClassMapping, UNKNOWN_LABEL};
pub use config::Config;
pub use detection::{BoundingBox, DetectionBox};
pub use errors::{ErrorKind, Result, RipenessError};
pub use model::{DetectorOptions, OnnxLoader, YoloDetector};
pub use pipeline::{InferenceResponse, RipenessPipeline, RipenessSummary};
pub use preprocess::TargetSize;
pub use service::{ImageSource, PredictRequest, RipenessService};
pub use shelf_life::shelf_life_for;
pub use traits::*;

/// Image files under `input`, or `input` itself when it is a file. Directories are walked
/// recursively and entries are kept when their extension names a known image format.
pub fn collect_image_paths(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file() && is_supported_image_format(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    paths.sort();
    paths
}

pub fn is_supported_image_format(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
}
