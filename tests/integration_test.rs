use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use banana_ripeness::mocks::{detection, CountingLoader};
use banana_ripeness::{
    DetectionBox, ErrorKind, ModelCache, Result, RipenessPipeline, TargetSize, UNKNOWN_LABEL,
};

const DATA_YAML: &str = "\
path: ../datasets/bananas
train: train/images
val: valid/images
nc: 6
names: ['freshripe', 'freshunripe', 'overripe', 'ripe', 'rotten', 'unripe']
";

struct Workspace {
    dir: TempDir,
    weights: PathBuf,
    mapping: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mapping = dir.path().join("data.yaml");
        fs::write(&mapping, DATA_YAML).unwrap();
        Self {
            weights: dir.path().join("best.onnx"),
            mapping,
            dir,
        }
    }

    fn image(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.dir.path().join(name);
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        });
        image.save(&path).unwrap();
        path
    }
}

fn pipeline(detections: Vec<DetectionBox>) -> RipenessPipeline<CountingLoader> {
    let cache = Arc::new(ModelCache::new(CountingLoader::new(detections)));
    RipenessPipeline::new(cache, TargetSize::default()).unwrap()
}

fn mixed_detections() -> Result<Vec<DetectionBox>> {
    Ok(vec![
        detection(3, 0.93, [12.0, 40.0, 180.0, 210.0])?,
        detection(0, 0.88, [200.0, 40.0, 360.0, 230.0])?,
        detection(3, 0.71, [380.0, 60.0, 520.0, 260.0])?,
        detection(4, 0.42, [30.0, 300.0, 190.0, 470.0])?,
        detection(3, 0.30, [220.0, 310.0, 400.0, 500.0])?,
    ])
}

#[test]
fn test_counts_match_predictions() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("ban3.png", 1280, 960);

    let summary = pipeline(mixed_detections()?).run_inference(&image, &ws.weights, &ws.mapping)?;

    let total: usize = summary.label_counts().iter().map(|(_, count)| count).sum();
    assert_eq!(total, summary.detection_count());
    assert_eq!(summary.detection_count(), summary.detections().len());
    assert_eq!(summary.dominant_label(), Some("ripe"));
    assert_eq!(summary.shelf_life(), "2-4 days");
    Ok(())
}

#[test]
fn test_predictions_are_well_formed() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("ban3.png", 500, 375);

    let summary = pipeline(mixed_detections()?).run_inference(&image, &ws.weights, &ws.mapping)?;

    for prediction in summary.detections() {
        let [x1, y1, x2, y2] = prediction.coordinates().corners();
        assert!((0.0..=1.0).contains(&prediction.confidence()));
        assert!(x1 < x2 && y1 < y2);
        assert!(x2 <= 500.0 && y2 <= 375.0);
    }
    Ok(())
}

#[test]
fn test_repeated_calls_are_deterministic() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("ban3.png", 640, 480);
    let pipeline = pipeline(mixed_detections()?);

    let first = pipeline.run_inference(&image, &ws.weights, &ws.mapping)?;
    let second = pipeline.run_inference(&image, &ws.weights, &ws.mapping)?;

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.annotated_png(), second.annotated_png());
    Ok(())
}

#[test]
fn test_tie_goes_to_first_detection() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("tie.png", 640, 640);

    let ripe_first = pipeline(vec![
        detection(3, 0.6, [10.0, 10.0, 50.0, 50.0])?,
        detection(2, 0.9, [60.0, 10.0, 100.0, 50.0])?,
    ])
    .run_inference(&image, &ws.weights, &ws.mapping)?;
    assert_eq!(ripe_first.dominant_label(), Some("ripe"));
    assert_eq!(ripe_first.shelf_life(), "2-4 days");

    let overripe_first = pipeline(vec![
        detection(2, 0.9, [60.0, 10.0, 100.0, 50.0])?,
        detection(3, 0.6, [10.0, 10.0, 50.0, 50.0])?,
    ])
    .run_inference(&image, &ws.weights, &ws.mapping)?;
    assert_eq!(overripe_first.dominant_label(), Some("overripe"));
    assert_eq!(overripe_first.shelf_life(), "1-2 days");
    Ok(())
}

#[test]
fn test_empty_detections() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("empty.png", 320, 200);

    let summary = pipeline(Vec::new()).run_inference(&image, &ws.weights, &ws.mapping)?;

    assert_eq!(summary.detection_count(), 0);
    assert!(summary.label_counts().is_empty());
    assert_eq!(summary.dominant_label(), None);
    assert_eq!(summary.shelf_life(), "Unknown");

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "count": 0,
            "ripeness": {},
            "shelf_life": "Unknown",
            "predictions": []
        })
    );

    let annotated = image::load_from_memory(summary.annotated_png())
        .unwrap()
        .into_rgb8();
    assert_eq!(annotated, image::open(&image).unwrap().into_rgb8());
    Ok(())
}

#[test]
fn test_unknown_class_index() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("odd.png", 640, 640);

    let summary = pipeline(vec![
        detection(17, 0.8, [10.0, 10.0, 50.0, 50.0])?,
        detection(17, 0.7, [60.0, 10.0, 100.0, 50.0])?,
        detection(5, 0.9, [110.0, 10.0, 150.0, 50.0])?,
    ])
    .run_inference(&image, &ws.weights, &ws.mapping)?;

    assert_eq!(summary.label_counts().get(UNKNOWN_LABEL), Some(2));
    assert_eq!(summary.label_counts().get("unripe"), Some(1));
    assert_eq!(summary.dominant_label(), Some(UNKNOWN_LABEL));
    assert_eq!(summary.shelf_life(), "Unknown");
    Ok(())
}

#[test]
fn test_decode_failures() {
    let ws = Workspace::new();
    let pipeline = pipeline(Vec::new());

    let zero_byte = ws.dir.path().join("zero.jpg");
    fs::write(&zero_byte, b"").unwrap();
    let not_an_image = ws.dir.path().join("manifest.png");
    fs::write(&not_an_image, b"shipment 42: 300 crates").unwrap();

    for path in [zero_byte, not_an_image] {
        let err = pipeline
            .run_inference(&path, &ws.weights, &ws.mapping)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageDecode, "{}", path.display());
        assert!(err.to_string().contains(&*path.to_string_lossy()));
    }
}

#[test]
fn test_missing_mapping() {
    let ws = Workspace::new();
    let image = ws.image("ban3.png", 64, 64);

    let err = pipeline(Vec::new())
        .run_inference(&image, &ws.weights, &ws.dir.path().join("missing.yaml"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClassMapping);
    assert!(err.is_client_error());
}

#[test]
fn test_model_load_failure_is_retried() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("ban3.png", 64, 64);
    let cache = Arc::new(ModelCache::new(CountingLoader::new(Vec::new()).failing_once()));
    let pipeline = RipenessPipeline::new(Arc::clone(&cache), TargetSize::default())?;

    let err = pipeline
        .run_inference(&image, &ws.weights, &ws.mapping)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelLoad);
    assert!(!err.is_client_error());
    assert!(cache.cached_path().is_none());

    pipeline.run_inference(&image, &ws.weights, &ws.mapping)?;
    assert_eq!(cache.loader().load_count(), 2);
    Ok(())
}

#[test]
fn test_cache_reuses_and_replaces_models() -> Result<()> {
    let ws = Workspace::new();
    let image = ws.image("ban3.png", 64, 64);
    let other_weights = ws.dir.path().join("last.onnx");
    let pipeline = pipeline(Vec::new());

    pipeline.run_inference(&image, &ws.weights, &ws.mapping)?;
    pipeline.run_inference(&image, &ws.weights, &ws.mapping)?;
    assert_eq!(pipeline.cache().loader().load_count(), 1);

    pipeline.run_inference(&image, &other_weights, &ws.mapping)?;
    assert_eq!(pipeline.cache().loader().load_count(), 2);
    assert_eq!(pipeline.cache().cached_path(), Some(other_weights));
    Ok(())
}
