use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::errors::{RipenessError, Result};
use crate::pipeline::{RipenessPipeline, RipenessSummary};
use crate::traits::ModelLoader;

/// Where the image for a request comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { data: Vec<u8>, identifier: String },
}

/// One upload: the image plus the weights and mapping it should be evaluated with.
#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub image: ImageSource,
    pub weights_path: PathBuf,
    pub mapping_path: PathBuf,
}

impl PredictRequest {
    pub fn from_path(
        image: impl Into<PathBuf>,
        weights_path: impl Into<PathBuf>,
        mapping_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image: ImageSource::Path(image.into()),
            weights_path: weights_path.into(),
            mapping_path: mapping_path.into(),
        }
    }

    pub fn from_bytes(
        data: Vec<u8>,
        identifier: impl Into<String>,
        weights_path: impl Into<PathBuf>,
        mapping_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image: ImageSource::Bytes {
                data,
                identifier: identifier.into(),
            },
            weights_path: weights_path.into(),
            mapping_path: mapping_path.into(),
        }
    }
}

/// Async entry point for request handlers.
///
/// Inference runs on the blocking thread pool, and at most `max_concurrent` calls are in
/// flight at once; further callers wait for a permit.
pub struct RipenessService<L: ModelLoader + 'static> {
    pipeline: Arc<RipenessPipeline<L>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl<L: ModelLoader + 'static> Clone for RipenessService<L> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            permits: Arc::clone(&self.permits),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl<L: ModelLoader + 'static> RipenessService<L> {
    pub fn new(pipeline: RipenessPipeline<L>, max_concurrent: usize) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(RipenessError::validation(
                "max concurrent",
                "must be at least 1",
            ));
        }
        Ok(Self {
            pipeline: Arc::new(pipeline),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        })
    }

    pub fn pipeline(&self) -> &RipenessPipeline<L> {
        &self.pipeline
    }

    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn predict(&self, request: PredictRequest) -> Result<RipenessSummary> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RipenessError::inference("acquire inference permit", e))?;
        debug!(available = self.permits.available_permits(), "inference permit acquired");

        let pipeline = Arc::clone(&self.pipeline);
        let result = tokio::task::spawn_blocking(move || {
            let PredictRequest {
                image,
                weights_path,
                mapping_path,
            } = request;
            match image {
                ImageSource::Path(path) => {
                    pipeline.run_inference(&path, &weights_path, &mapping_path)
                }
                ImageSource::Bytes { data, identifier } => {
                    pipeline.run_inference_bytes(&data, &identifier, &weights_path, &mapping_path)
                }
            }
        })
        .await
        .map_err(|e| RipenessError::inference("blocking inference task", e))?;

        if let Err(e) = &result {
            error!(kind = ?e.kind(), client_error = e.is_client_error(), error = %e, "prediction failed");
        }
        result
    }
}
