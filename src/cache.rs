use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::traits::ModelLoader;

struct CachedModel<M> {
    weights_path: PathBuf,
    model: Arc<M>,
}

/// Holds the most recently loaded detector, keyed by its weights path.
///
/// The check-then-load sequence runs under one lock, so concurrent first callers for a path
/// block until the single load finishes and then share its result. Requesting another path
/// replaces the entry; callers still holding the previous `Arc` keep using it. Failed loads
/// leave the cache untouched, so the next call retries.
pub struct ModelCache<L: ModelLoader> {
    loader: L,
    slot: Mutex<Option<CachedModel<L::Model>>>,
}

impl<L: ModelLoader> ModelCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_load(&self, weights_path: &Path) -> Result<Arc<L::Model>> {
        let mut slot = self.slot.lock();

        if let Some(cached) = slot.as_ref() {
            if cached.weights_path == weights_path {
                debug!(weights = %weights_path.display(), "model cache hit");
                return Ok(Arc::clone(&cached.model));
            }
            info!(
                previous = %cached.weights_path.display(),
                weights = %weights_path.display(),
                "weights path changed, replacing cached model"
            );
        }

        let model = match self.loader.load(weights_path) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                warn!(weights = %weights_path.display(), error = %e, "model load failed");
                return Err(e);
            }
        };

        *slot = Some(CachedModel {
            weights_path: weights_path.to_path_buf(),
            model: Arc::clone(&model),
        });
        Ok(model)
    }

    pub fn cached_path(&self) -> Option<PathBuf> {
        self.slot
            .lock()
            .as_ref()
            .map(|cached| cached.weights_path.clone())
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    pub const fn loader(&self) -> &L {
        &self.loader
    }
}
