//! Request orchestration: acquire the classifier, decode, classify, optionally
//! segment, fuse.
//!
//! Classification is mandatory and any failure there ends the request. The
//! classifier is acquired before the image is read, so an unavailable model is
//! reported even when the upload is also bad.
//! Segmentation is best effort: load failures, model errors and panics are
//! folded into a degraded report instead of an error.

mod error;
mod report;

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, ImageReader};
use tracing::{debug, info, info_span, warn};

use crate::analysis::mask::{MaskAnalysisConfig, analyze_mask};
use crate::analysis::risk::{self, ClassificationResult};
use crate::config::{ConfigError, ServiceConfig};
use crate::models::lifecycle::ReleaseSummary;
use crate::models::onnx::OnnxModelLoader;
use crate::models::{Classifier, ModelError, ModelManager, ModelStatus, panic_message};

pub use error::{AnalysisError, SegmentationFailure};
pub use report::{
    AnalysisReport, REGION_NOT_AVAILABLE, SegmentationOutcome, SegmentationReport, ServiceHealth,
};

const SERVICE_NAME: &str = "prostascan";

/// Progress of one request; `Failed` is reachable only before classification completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ClassifierAcquired,
    Classified,
    SegmenterAttempted,
    Fused,
    Done,
    Failed,
}

/// Per-request bookkeeping; logs how far the request got when dropped.
struct RequestTrace {
    stage: Stage,
    started: Instant,
}

impl RequestTrace {
    fn new() -> Self {
        Self {
            stage: Stage::Start,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!("Stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, err: &AnalysisError) {
        warn!("Analysis failed in stage {:?}: {err}", self.stage);
        self.stage = Stage::Failed;
    }
}

impl Drop for RequestTrace {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_millis();
        match self.stage {
            Stage::Done => info!("Analysis finished in {elapsed} ms"),
            Stage::Failed => debug!("Analysis aborted after {elapsed} ms"),
            stage => warn!("Analysis abandoned in stage {stage:?} after {elapsed} ms"),
        }
    }
}

/// Where the request image comes from; files are decoded only once the
/// classifier is in hand.
#[derive(Clone, Copy)]
enum ImageSource<'a> {
    File(&'a Path),
    Decoded(&'a DynamicImage),
}

impl<'a> ImageSource<'a> {
    fn load(self) -> Result<Cow<'a, DynamicImage>, AnalysisError> {
        match self {
            Self::File(path) => decode_image(path).map(Cow::Owned),
            Self::Decoded(image) => Ok(Cow::Borrowed(image)),
        }
    }
}

/// Dual-model analysis service.
pub struct Pipeline {
    models: ModelManager,
    mask_config: MaskAnalysisConfig,
}

impl Pipeline {
    pub fn new(models: ModelManager, mask_config: MaskAnalysisConfig) -> Self {
        Self {
            models,
            mask_config,
        }
    }

    /// Build a pipeline backed by the ONNX models named in `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let mask_config = config.mask_analysis();
        let paths = config.model_paths()?;
        info!(
            "Model paths: classifier {}, segmenter {}",
            paths.classifier.display(),
            paths.segmenter.display()
        );
        let loader = OnnxModelLoader::new(paths, mask_config.threshold);
        Ok(Self::new(ModelManager::new(loader), mask_config))
    }

    /// Analyse the image stored at `path`.
    pub fn analyze(&self, path: &Path) -> Result<AnalysisReport, AnalysisError> {
        let span = info_span!("analyze", image = %path.display());
        let _entered = span.enter();
        let mut trace = RequestTrace::new();
        let result = self.run(ImageSource::File(path), &mut trace);
        if let Err(err) = &result {
            trace.fail(err);
        }
        result
    }

    /// Analyse an already decoded image.
    pub fn analyze_image(&self, image: &DynamicImage) -> Result<AnalysisReport, AnalysisError> {
        let span = info_span!("analyze", width = image.width(), height = image.height());
        let _entered = span.enter();
        let mut trace = RequestTrace::new();
        let result = self.run(ImageSource::Decoded(image), &mut trace);
        if let Err(err) = &result {
            trace.fail(err);
        }
        result
    }

    fn run(
        &self,
        source: ImageSource<'_>,
        trace: &mut RequestTrace,
    ) -> Result<AnalysisReport, AnalysisError> {
        let classifier = self.models.acquire_classifier()?;
        trace.advance(Stage::ClassifierAcquired);
        let image = source.load()?;
        let classification = classify(classifier.as_ref(), &image)?;
        drop(classifier);
        trace.advance(Stage::Classified);

        let outcome = self.segment(&image);
        trace.advance(Stage::SegmenterAttempted);

        let report = AnalysisReport::fuse(classification, outcome);
        trace.advance(Stage::Fused);
        info!(
            "{} ({}%), region: {}, segmentation available: {}",
            report.classification.risk_label,
            report.classification.probability_percent,
            report.effective_region,
            report.segmentation_available
        );
        trace.advance(Stage::Done);
        Ok(report)
    }

    fn segment(&self, image: &DynamicImage) -> SegmentationOutcome {
        let segmenter = match self.models.acquire_segmenter() {
            Ok(segmenter) => segmenter,
            Err(failure) => {
                warn!("Continuing without segmentation: {failure}");
                return SegmentationOutcome::Failed(failure.into());
            }
        };
        let mask = match catch_unwind(AssertUnwindSafe(|| segmenter.predict(image))) {
            Ok(Ok(mask)) => mask,
            Ok(Err(err)) => {
                warn!("Continuing without segmentation: {err}");
                return SegmentationOutcome::Failed(err.into());
            }
            Err(payload) => {
                let err = ModelError::Panicked(panic_message(payload));
                warn!("Continuing without segmentation: {err}");
                return SegmentationOutcome::Failed(err.into());
            }
        };
        drop(segmenter);

        let config = self.mask_config;
        match catch_unwind(AssertUnwindSafe(|| analyze_mask(mask.view(), &config))) {
            Ok(metrics) if metrics.is_usable() => SegmentationOutcome::Located(metrics),
            Ok(metrics) => {
                debug!("Segmentation inconclusive: {}", metrics.region_label);
                SegmentationOutcome::Inconclusive(metrics)
            }
            Err(payload) => {
                let message = panic_message(payload);
                warn!("Mask analysis panicked: {message}");
                SegmentationOutcome::Failed(SegmentationFailure::Analysis(message))
            }
        }
    }

    /// Drop cached models; in-flight requests keep the handles they hold.
    pub fn release_models(&self) -> ReleaseSummary {
        self.models.release_all()
    }

    /// Which models are resident.
    pub fn status(&self) -> ModelStatus {
        self.models.status()
    }

    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            status: "OK",
            models: self.models.status(),
            resident: self.models.resident_models(),
        }
    }
}

fn decode_image(path: &Path) -> Result<DynamicImage, AnalysisError> {
    let invalid = |reason: String| AnalysisError::InvalidInput {
        path: path.to_path_buf(),
        reason,
    };
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| invalid(err.to_string()))?;
    match catch_unwind(AssertUnwindSafe(|| reader.decode())) {
        Ok(Ok(image)) => Ok(image),
        Ok(Err(err)) => Err(invalid(err.to_string())),
        Err(payload) => Err(invalid(format!("decoder panicked: {}", panic_message(payload)))),
    }
}

fn classify(
    classifier: &dyn Classifier,
    image: &DynamicImage,
) -> Result<ClassificationResult, AnalysisError> {
    let output = catch_unwind(AssertUnwindSafe(|| classifier.predict(image)))
        .unwrap_or_else(|payload| Err(ModelError::Panicked(panic_message(payload))))?;
    let probability = output.positive_probability().ok_or_else(|| {
        ModelError::Output(format!(
            "no usable positive-class probability in {:?}",
            output.probabilities
        ))
    })?;
    debug!(
        "Classifier: {} ({:.3}), p(pos) = {probability:.4}",
        output.predicted_class, output.confidence
    );
    Ok(risk::interpret(probability, &output))
}
