use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{ensure, Context, Result};
use banana_ripeness::{
    collect_image_paths, Config, ModelCache, OnnxLoader, RipenessPipeline, RipenessSummary,
};
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::{prelude::*, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// One output line: the image path followed by its summary fields.
#[derive(Serialize)]
struct ImageRecord<'a> {
    image: &'a Path,
    #[serde(flatten)]
    summary: &'a RipenessSummary,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::parse();

    ensure!(
        config.input.exists(),
        "Input path does not exist: {}",
        config.input.display()
    );
    ensure!(
        config.mapping.is_file(),
        "Mapping file does not exist: {}",
        config.mapping.display()
    );

    let cache = Arc::new(ModelCache::new(OnnxLoader::new(config.detector_options()?)));
    // fail on bad weights before touching any image
    cache
        .get_or_load(&config.weights)
        .with_context(|| format!("Failed to load weights: {}", config.weights.display()))?;
    let pipeline = RipenessPipeline::new(cache, config.target_size()?)?;

    let image_paths = collect_image_paths(&config.input);
    ensure!(
        !image_paths.is_empty(),
        "No images found under {}",
        config.input.display()
    );
    if let Some(output_dir) = &config.output_dir {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    }

    ThreadPoolBuilder::new()
        .num_threads(config.max_concurrent)
        .build_global()?;

    let progress_bar = if image_paths.len() > 1 {
        let bar = ProgressBar::new(image_paths.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
            )?
            .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let failures = AtomicUsize::new(0);
    image_paths
        .par_iter()
        .progress_with(progress_bar.clone())
        .for_each(|path| match process_image(&pipeline, path, &config) {
            Ok(line) => progress_bar.suspend(|| println!("{line}")),
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                error!(image = %path.display(), error = ?e, "image failed");
            }
        });
    progress_bar.finish();

    let failed = failures.into_inner();
    info!(images = image_paths.len(), failed, "run complete");
    ensure!(
        failed == 0,
        "{failed} of {} images failed",
        image_paths.len()
    );
    Ok(())
}

fn process_image(
    pipeline: &RipenessPipeline<OnnxLoader>,
    path: &Path,
    config: &Config,
) -> Result<String> {
    let summary = pipeline
        .run_inference(path, &config.weights, &config.mapping)
        .with_context(|| format!("Inference failed for {}", path.display()))?;

    if let Some(output_dir) = &config.output_dir {
        let output_path = annotated_output_path(path, &config.input, output_dir);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output_path, summary.annotated_png())
            .with_context(|| format!("Failed to save image: {}", output_path.display()))?;
    }

    let record = ImageRecord {
        image: path,
        summary: &summary,
    };
    let line = if config.pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    Ok(line)
}

/// Mirror `path`'s position under `input_root` inside `output_dir`, as a PNG.
fn annotated_output_path(path: &Path, input_root: &Path, output_dir: &Path) -> PathBuf {
    let relative = path
        .strip_prefix(input_root)
        .ok()
        .filter(|relative| !relative.as_os_str().is_empty())
        .or_else(|| path.file_name().map(Path::new))
        .unwrap_or(path);
    output_dir.join(relative).with_extension("png")
}
