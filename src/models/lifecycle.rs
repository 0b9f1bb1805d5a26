//! On-demand model cache with explicit eviction.
//!
//! Each model kind has a single slot guarded by its own mutex. The mutex is
//! held across a load, so concurrent acquirers of the same kind wait for the
//! in-flight load and reuse its result instead of loading twice. Handles are
//! reference counted: evicting a slot only drops the cache's reference, and a
//! caller that already holds a handle keeps a working model until it is done.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    Classifier, LoadFailure, ModelDescriptor, ModelInfo, ModelKind, ModelLoader, Segmenter,
    panic_message,
};

/// Read-only view of which models are resident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub classifier_loaded: bool,
    pub segmenter_loaded: bool,
}

/// Metadata for resident models; `None` when not loaded or busy loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentModels {
    pub classifier: Option<ModelDescriptor>,
    pub segmenter: Option<ModelDescriptor>,
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Slots that held a model before the call.
    pub released: usize,
    /// Released handles still referenced by in-flight requests.
    pub still_in_use: usize,
}

struct ModelSlot<M: ?Sized> {
    kind: ModelKind,
    handle: Mutex<Option<Arc<M>>>,
    loaded: AtomicBool,
}

impl<M: ModelInfo + ?Sized> ModelSlot<M> {
    fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            handle: Mutex::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<M>>> {
        // Loads run under catch_unwind, so a poisoned slot still holds a consistent Option.
        self.handle.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn acquire(
        &self,
        load: impl FnOnce() -> Result<Box<M>, LoadFailure>,
    ) -> Result<Arc<M>, LoadFailure> {
        let mut guard = self.lock();
        if let Some(handle) = guard.as_ref() {
            if handle.is_ready() {
                return Ok(Arc::clone(handle));
            }
            warn!("Cached {} reports not ready; reloading", self.kind);
            *guard = None;
            self.loaded.store(false, Ordering::Release);
        }

        let kind = self.kind;
        let started = Instant::now();
        debug!("Loading {kind}");
        let outcome = catch_unwind(AssertUnwindSafe(load)).unwrap_or_else(|payload| {
            Err(LoadFailure::Panicked {
                kind,
                message: panic_message(payload),
            })
        });
        let handle: Arc<M> = match outcome {
            Ok(model) => Arc::from(model),
            Err(failure) => {
                warn!("Failed to load {kind}: {failure}");
                return Err(failure);
            }
        };
        if !handle.is_ready() {
            let failure = LoadFailure::Runtime {
                kind,
                message: "model reported not ready after load".to_string(),
            };
            warn!("Failed to load {kind}: {failure}");
            return Err(failure);
        }

        *guard = Some(Arc::clone(&handle));
        self.loaded.store(true, Ordering::Release);
        info!(
            "Loaded {kind} '{}' in {} ms",
            handle.describe().name,
            started.elapsed().as_millis()
        );
        Ok(handle)
    }

    fn release(&self) -> Option<usize> {
        let handle = self.lock().take();
        self.loaded.store(false, Ordering::Release);
        handle.map(|handle| Arc::strong_count(&handle) - 1)
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn describe(&self) -> Option<ModelDescriptor> {
        // Never wait behind an in-flight load just to report metadata.
        let guard = self.handle.try_lock().ok()?;
        guard.as_ref().map(|handle| handle.describe())
    }
}

/// Owns at most one live classifier and one live segmenter.
pub struct ModelManager {
    loader: Box<dyn ModelLoader>,
    classifier: ModelSlot<dyn Classifier>,
    segmenter: ModelSlot<dyn Segmenter>,
}

impl ModelManager {
    /// Create a manager with both slots unloaded.
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            classifier: ModelSlot::new(ModelKind::Classifier),
            segmenter: ModelSlot::new(ModelKind::Segmenter),
        }
    }

    /// Return the cached classifier, loading it on first use.
    pub fn acquire_classifier(&self) -> Result<Arc<dyn Classifier>, LoadFailure> {
        self.classifier.acquire(|| self.loader.load_classifier())
    }

    /// Return the cached segmenter, loading it on first use.
    pub fn acquire_segmenter(&self) -> Result<Arc<dyn Segmenter>, LoadFailure> {
        self.segmenter.acquire(|| self.loader.load_segmenter())
    }

    /// Drop both cached models. Idempotent.
    pub fn release_all(&self) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        for outstanding in [self.classifier.release(), self.segmenter.release()]
            .into_iter()
            .flatten()
        {
            summary.released += 1;
            if outstanding > 0 {
                summary.still_in_use += 1;
            }
        }
        if summary.released == 0 {
            debug!("Release requested with no models loaded");
            return summary;
        }
        self.loader.reclaim();
        info!(
            "Released {} model(s); {} still held by in-flight requests",
            summary.released, summary.still_in_use
        );
        summary
    }

    /// Which models are resident. Never loads and never blocks on a load.
    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            classifier_loaded: self.classifier.is_loaded(),
            segmenter_loaded: self.segmenter.is_loaded(),
        }
    }

    /// Metadata for resident models.
    pub fn resident_models(&self) -> ResidentModels {
        ResidentModels {
            classifier: self.classifier.describe(),
            segmenter: self.segmenter.describe(),
        }
    }
}

impl Drop for ModelManager {
    fn drop(&mut self) {
        let status = self.status();
        if status.classifier_loaded || status.segmenter_loaded {
            self.release_all();
        }
    }
}
