use super::SegmentationBackend;
use crate::error::{Result, TilingError};
use std::sync::{Arc, PoisonError, RwLock};

type SharedBackend = Arc<dyn SegmentationBackend>;

/// Owned handle to the process-wide model.
///
/// Load before serving, hand clones to request handlers, call [`ModelHandle::shutdown`]
/// once at exit. Requests only ever see a shared read-only `Arc` of the backend.
#[derive(Clone, Default)]
pub struct ModelHandle {
    slot: Arc<RwLock<Option<SharedBackend>>>,
}

impl ModelHandle {
    pub fn new(backend: impl SegmentationBackend + 'static) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    pub fn from_shared(backend: SharedBackend) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(backend))),
        }
    }

    /// A handle with no model; every acquire reports the model as unavailable.
    pub fn unloaded() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn acquire(&self) -> Result<SharedBackend> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TilingError::ModelUnavailable("model not loaded".to_string()))
    }

    /// Drop the model. In-flight requests keep their `Arc` until they finish.
    pub fn shutdown(&self) {
        let previous = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::info!("Model unloaded");
        }
    }
}
