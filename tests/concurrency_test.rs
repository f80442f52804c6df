use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use banana_ripeness::mocks::{detection, CountingLoader};
use banana_ripeness::{
    ModelCache, PredictRequest, Result, RipenessPipeline, RipenessService, TargetSize,
};

fn fixtures(dir: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
    let image = dir.path().join("pallet.png");
    RgbImage::from_pixel(320, 320, Rgb([220, 200, 60]))
        .save(&image)
        .unwrap();
    let mapping = dir.path().join("data.yaml");
    fs::write(
        &mapping,
        "names:\n  0: freshripe\n  1: freshunripe\n  2: overripe\n  3: ripe\n  4: rotten\n  5: unripe\n",
    )
    .unwrap();
    (image, dir.path().join("best.onnx"), mapping)
}

fn slow_loader() -> Result<CountingLoader> {
    Ok(CountingLoader::new(vec![
        detection(1, 0.9, [0.0, 0.0, 320.0, 320.0])?,
        detection(1, 0.8, [320.0, 320.0, 640.0, 640.0])?,
    ])
    .with_load_delay(Duration::from_millis(100)))
}

#[test]
fn test_threads_racing_on_cold_cache_load_once() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (image, weights, mapping) = fixtures(&dir);
    let pipeline = RipenessPipeline::new(
        Arc::new(ModelCache::new(slow_loader()?)),
        TargetSize::default(),
    )?;

    let summaries = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| pipeline.run_inference(&image, &weights, &mapping)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Result<Vec<_>>>()
    })?;

    assert_eq!(summaries.len(), 16);
    for summary in &summaries {
        assert_eq!(summary.detection_count(), 2);
        assert_eq!(summary.dominant_label(), Some("freshunripe"));
        assert_eq!(summary.shelf_life(), "8-10 days");
        assert_eq!(
            summary.detections()[1].coordinates().corners(),
            [160.0, 160.0, 320.0, 320.0]
        );
    }
    assert_eq!(pipeline.cache().loader().load_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_service_requests_on_cold_cache_load_once() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (image, weights, mapping) = fixtures(&dir);
    let bytes = fs::read(&image).unwrap();
    let pipeline = RipenessPipeline::new(
        Arc::new(ModelCache::new(slow_loader()?)),
        TargetSize::default(),
    )?;
    let service = RipenessService::new(pipeline, 3)?;

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        let request = if i % 2 == 0 {
            PredictRequest::from_path(&image, &weights, &mapping)
        } else {
            PredictRequest::from_bytes(bytes.clone(), format!("upload-{i}"), &weights, &mapping)
        };
        handles.push(tokio::spawn(async move { service.predict(request).await }));
    }

    for handle in handles {
        let summary = handle.await.unwrap()?;
        assert_eq!(summary.detection_count(), 2);
        assert_eq!(summary.label_counts().get("freshunripe"), Some(2));
    }
    assert_eq!(service.pipeline().cache().loader().load_count(), 1);
    assert_eq!(service.available_permits(), service.max_concurrent());
    Ok(())
}
