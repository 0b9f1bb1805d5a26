//! Model capability traits shared by the lifecycle manager and the pipeline.
//!
//! Both model kinds implement [`ModelInfo`] so callers can query readiness
//! and metadata uniformly. Concrete ONNX backends live in [`onnx`]; tests
//! substitute their own implementations through [`ModelLoader`].

pub mod lifecycle;
pub mod onnx;
pub(crate) mod preprocess;

use std::path::PathBuf;

use image::DynamicImage;
use ndarray::Array2;
use serde::Serialize;
use thiserror::Error;

pub use lifecycle::{ModelManager, ModelStatus};

/// Class names emitted by the two-class classifier, in output order.
pub const CLASS_NAMES: [&str; 2] = ["neg", "pos"];
/// Index of the positive (anomaly) class in the probability vector.
pub const POSITIVE_CLASS_INDEX: usize = 1;

/// Which of the two models an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Classifier,
    Segmenter,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Classifier => "classifier",
            ModelKind::Segmenter => "segmenter",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a model could not be brought up.
#[derive(Debug, Clone, Error)]
pub enum LoadFailure {
    /// The weights file does not exist.
    #[error("{kind} weights not found at {}", path.display())]
    MissingWeights { kind: ModelKind, path: PathBuf },
    /// The runtime rejected the model.
    #[error("{kind} runtime failed to load model: {message}")]
    Runtime { kind: ModelKind, message: String },
    /// The loader panicked; the payload message is preserved.
    #[error("{kind} loader panicked: {message}")]
    Panicked { kind: ModelKind, message: String },
}

impl LoadFailure {
    pub fn kind(&self) -> ModelKind {
        match self {
            LoadFailure::MissingWeights { kind, .. }
            | LoadFailure::Runtime { kind, .. }
            | LoadFailure::Panicked { kind, .. } => *kind,
        }
    }
}

/// Failures raised by a loaded model while predicting.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Input could not be converted into the model's tensor layout.
    #[error("failed to prepare model input: {0}")]
    Preprocess(String),
    /// The runtime failed while running the graph.
    #[error("inference failed: {0}")]
    Inference(String),
    /// The graph ran but its output has an unexpected shape or content.
    #[error("unexpected model output: {0}")]
    Output(String),
    /// Model code panicked.
    #[error("model panicked: {0}")]
    Panicked(String),
}

/// Descriptive metadata reported by a model wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    pub device: String,
    pub input_size: (u32, u32),
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

/// Capability every model wrapper exposes, replacing ad-hoc attribute probing.
pub trait ModelInfo: Send + Sync {
    /// Whether the wrapper holds a usable model.
    fn is_ready(&self) -> bool {
        true
    }

    /// Identifying metadata for status endpoints.
    fn describe(&self) -> ModelDescriptor;
}

/// Raw classifier prediction for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOutput {
    pub predicted_class: String,
    pub confidence: f32,
    /// Softmax probabilities in [`CLASS_NAMES`] order.
    pub probabilities: Vec<f32>,
    /// Optional coarse location the classifier can offer when segmentation is missing.
    pub region_hint: Option<String>,
}

impl ClassifierOutput {
    /// Build an output from a probability vector, deriving the arg-max class.
    pub fn from_probabilities(probabilities: Vec<f32>, region_hint: Option<String>) -> Self {
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (idx, value)| {
                if value > best.1 { (idx, value) } else { best }
            });
        let predicted_class = CLASS_NAMES
            .get(index)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("class_{index}"));
        Self {
            predicted_class,
            confidence: if confidence.is_finite() { confidence } else { 0.0 },
            probabilities,
            region_hint,
        }
    }

    /// Probability of the positive class, if present and finite.
    pub fn positive_probability(&self) -> Option<f64> {
        self.probabilities
            .get(POSITIVE_CLASS_INDEX)
            .copied()
            .filter(|p| p.is_finite())
            .map(f64::from)
    }
}

/// Image classifier producing class probabilities.
pub trait Classifier: ModelInfo {
    fn predict(&self, image: &DynamicImage) -> Result<ClassifierOutput, ModelError>;
}

/// Image segmenter producing a per-pixel probability mask (rows = height).
pub trait Segmenter: ModelInfo {
    fn predict(&self, image: &DynamicImage) -> Result<Array2<f32>, ModelError>;
}

/// Factory the lifecycle manager calls to bring models up on demand.
pub trait ModelLoader: Send + Sync {
    fn load_classifier(&self) -> Result<Box<dyn Classifier>, LoadFailure>;

    fn load_segmenter(&self) -> Result<Box<dyn Segmenter>, LoadFailure>;

    /// Hint that cached models were dropped and memory can be returned.
    fn reclaim(&self) {}
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
