use std::path::PathBuf;
use thiserror::Error;

pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the ripeness inference pipeline.
///
/// Each variant carries the context of the stage that failed (image decode, model loading,
/// class mapping, inference). Sources are `Send + Sync` so errors can cross worker threads.
#[derive(Error, Debug)]
pub enum RipenessError {
    #[error("Image decode error: could not decode {path:?}")]
    ImageDecode {
        path: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Model load error: {operation} failed for {path:?}")]
    ModelLoad {
        path: PathBuf,
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Class mapping error: {reason} ({path:?})")]
    ClassMapping {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Inference error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Encode error: {operation} failed")]
    Encode {
        operation: String,
        #[source]
        source: BoxedSource,
    },
}

pub type Result<T> = std::result::Result<T, RipenessError>;

/// Coarse failure category, independent of the context a variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ImageDecode,
    ModelLoad,
    ClassMapping,
    Inference,
    Validation,
    Encode,
}

impl RipenessError {
    pub(crate) fn image_decode(
        path: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::ImageDecode {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn model_load(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::ModelLoad {
            path: path.into(),
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub(crate) fn inference(operation: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Inference {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageDecode { .. } => ErrorKind::ImageDecode,
            Self::ModelLoad { .. } => ErrorKind::ModelLoad,
            Self::ClassMapping { .. } => ErrorKind::ClassMapping,
            Self::Inference { .. } => ErrorKind::Inference,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Encode { .. } => ErrorKind::Encode,
        }
    }

    /// Whether the failure was caused by the caller's input rather than the infrastructure.
    ///
    /// Undecodable images, malformed mapping files and out-of-range parameters are the
    /// client's to fix. Model loading, inference and encoding failures are not.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ImageDecode | ErrorKind::ClassMapping | ErrorKind::Validation
        )
    }
}

/// Convert ONNX Runtime errors to inference errors.
///
/// Session construction wraps its ort errors explicitly as `ModelLoad` with the weights path,
/// so any ort error that reaches `?` without context comes from running the graph.
impl From<ort::Error> for RipenessError {
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to inference errors.
impl From<ndarray::ShapeError> for RipenessError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Inference {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
