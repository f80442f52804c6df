use std::path::PathBuf;

use clap::Parser;

use crate::errors::Result;
use crate::model::DetectorOptions;
use crate::preprocess::{TargetSize, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH};

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image file, or directory searched recursively for images
    pub input: PathBuf,

    /// YOLO weights exported to ONNX
    #[arg(short, long)]
    pub weights: PathBuf,

    /// Dataset YAML with a `names` list
    #[arg(short, long)]
    pub mapping: PathBuf,

    #[arg(long, default_value_t = DEFAULT_INPUT_WIDTH, value_parser = check_dimension)]
    pub target_width: u32,

    #[arg(long, default_value_t = DEFAULT_INPUT_HEIGHT, value_parser = check_dimension)]
    pub target_height: u32,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// ONNX Runtime intra-op threads per inference
    #[arg(short = 'j', long, default_value_t = default_threads())]
    pub threads: usize,

    /// Write annotated PNGs here, one per input image
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Images processed in parallel (also the async service's permit count)
    #[arg(long, default_value_t = 4, value_parser = check_positive)]
    pub max_concurrent: usize,

    /// Indent the JSON output
    #[arg(long)]
    pub pretty: bool,
}

impl Config {
    pub fn target_size(&self) -> Result<TargetSize> {
        TargetSize::new(self.target_width, self.target_height)
    }

    pub fn detector_options(&self) -> Result<DetectorOptions> {
        Ok(DetectorOptions {
            device_id: self.device_id,
            intra_threads: self.threads,
            fallback_input_size: self.target_size()?,
        })
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn check_dimension(s: &str) -> std::result::Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a valid pixel dimension"))?;
    if value == 0 {
        return Err("dimension must be a positive integer".to_string());
    }
    Ok(value)
}

fn check_positive(s: &str) -> std::result::Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("`{s}` is not a positive integer")),
    }
}
