//! ONNX Runtime backends for the prostate classifier and segmenter.
//!
//! The classifier is a two-class DenseNet-121 exported to ONNX; the segmenter
//! is an Attention U-Net producing a sigmoid mask. Both graphs are treated as
//! opaque: this module only prepares inputs and reads back outputs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::DynamicImage;
use ndarray::Array2;
use ort::session::Session;
use ort::session::output::SessionOutputs;
use ort::value::Tensor;

use super::preprocess::{classifier_tensor, segmenter_tensor, softmax};
use super::{
    CLASS_NAMES, Classifier, ClassifierOutput, LoadFailure, ModelDescriptor, ModelError,
    ModelInfo, ModelKind, ModelLoader, Segmenter,
};

/// Square input resolution expected by the classifier.
pub const CLASSIFIER_INPUT_SIZE: u32 = 128;
/// Square input resolution expected by the segmenter.
pub const SEGMENTER_INPUT_SIZE: u32 = 128;
const DEVICE_LABEL: &str = "cpu";

/// Resolved locations of the two model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub classifier: PathBuf,
    pub segmenter: PathBuf,
    /// Intra-op threads per session.
    pub intra_threads: usize,
}

/// Loads both models from ONNX files on demand.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    paths: ModelPaths,
    mask_threshold: f32,
}

impl OnnxModelLoader {
    pub fn new(paths: ModelPaths, mask_threshold: f32) -> Self {
        Self {
            paths,
            mask_threshold,
        }
    }

    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load_classifier(&self) -> Result<Box<dyn Classifier>, LoadFailure> {
        let session = open_session(
            ModelKind::Classifier,
            &self.paths.classifier,
            self.paths.intra_threads,
        )?;
        Ok(Box::new(OnnxClassifier {
            session: Mutex::new(session),
        }))
    }

    fn load_segmenter(&self) -> Result<Box<dyn Segmenter>, LoadFailure> {
        let session = open_session(
            ModelKind::Segmenter,
            &self.paths.segmenter,
            self.paths.intra_threads,
        )?;
        Ok(Box::new(OnnxSegmenter {
            session: Mutex::new(session),
            threshold: self.mask_threshold,
        }))
    }
}

fn open_session(kind: ModelKind, path: &Path, threads: usize) -> Result<Session, LoadFailure> {
    if !path.is_file() {
        return Err(LoadFailure::MissingWeights {
            kind,
            path: path.to_path_buf(),
        });
    }
    Session::builder()
        .map_err(|err| runtime_failure(kind, err))?
        .with_intra_threads(threads.max(1))
        .map_err(|err| runtime_failure(kind, err))?
        .commit_from_file(path)
        .map_err(|err| runtime_failure(kind, err))
}

fn runtime_failure(kind: ModelKind, err: impl std::fmt::Display) -> LoadFailure {
    LoadFailure::Runtime {
        kind,
        message: err.to_string(),
    }
}

/// A session whose lock was poisoned by a panic mid-run can no longer be used.
fn session_usable<S>(session: &Mutex<S>) -> bool {
    !session.is_poisoned()
}

/// Run a single-input graph and hand the outputs to `read`.
fn run_single<T>(
    session: &Mutex<Session>,
    input: ndarray::Array4<f32>,
    read: impl FnOnce(&SessionOutputs) -> Result<T, ModelError>,
) -> Result<T, ModelError> {
    let input = Tensor::from_array(input)
        .map_err(|err| ModelError::Preprocess(format!("failed to build input tensor: {err}")))?;
    let mut session = session
        .lock()
        .map_err(|_| ModelError::Inference("session lock poisoned".to_string()))?;
    let outputs = session
        .run(ort::inputs![input])
        .map_err(|err| ModelError::Inference(err.to_string()))?;
    read(&outputs)
}

fn first_output(outputs: &SessionOutputs) -> Result<(Vec<usize>, Vec<f32>), ModelError> {
    let value = outputs
        .values()
        .next()
        .ok_or_else(|| ModelError::Output("graph produced no outputs".to_string()))?;
    let array = value
        .try_extract_array::<f32>()
        .map_err(|err| ModelError::Output(format!("failed to read output tensor: {err}")))?;
    Ok((array.shape().to_vec(), array.iter().copied().collect()))
}

/// DenseNet-121 classifier session.
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl ModelInfo for OnnxClassifier {
    fn is_ready(&self) -> bool {
        session_usable(&self.session)
    }

    fn describe(&self) -> ModelDescriptor {
        ModelDescriptor {
            name: "DenseNet121".to_string(),
            device: DEVICE_LABEL.to_string(),
            input_size: (CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE),
            classes: CLASS_NAMES.iter().map(|name| name.to_string()).collect(),
            threshold: None,
        }
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, image: &DynamicImage) -> Result<ClassifierOutput, ModelError> {
        let input = classifier_tensor(image, CLASSIFIER_INPUT_SIZE)?;
        let (_, logits) = run_single(&self.session, input, first_output)?;
        if logits.len() != CLASS_NAMES.len() {
            return Err(ModelError::Output(format!(
                "expected {} logits, got {}",
                CLASS_NAMES.len(),
                logits.len()
            )));
        }
        Ok(ClassifierOutput::from_probabilities(softmax(&logits), None))
    }
}

/// Attention U-Net segmenter session.
pub struct OnnxSegmenter {
    session: Mutex<Session>,
    threshold: f32,
}

impl ModelInfo for OnnxSegmenter {
    fn is_ready(&self) -> bool {
        session_usable(&self.session)
    }

    fn describe(&self) -> ModelDescriptor {
        ModelDescriptor {
            name: "Attention U-Net".to_string(),
            device: DEVICE_LABEL.to_string(),
            input_size: (SEGMENTER_INPUT_SIZE, SEGMENTER_INPUT_SIZE),
            classes: Vec::new(),
            threshold: Some(self.threshold),
        }
    }
}

impl Segmenter for OnnxSegmenter {
    fn predict(&self, image: &DynamicImage) -> Result<Array2<f32>, ModelError> {
        let input = segmenter_tensor(image, SEGMENTER_INPUT_SIZE)?;
        let (shape, values) = run_single(&self.session, input, first_output)?;
        mask_from_output(&shape, values)
    }
}

/// Collapse singleton batch/channel axes so only `(height, width)` remains.
fn mask_from_output(shape: &[usize], values: Vec<f32>) -> Result<Array2<f32>, ModelError> {
    let spatial: Vec<usize> = shape.iter().copied().filter(|&dim| dim != 1).collect();
    let (height, width) = match spatial.as_slice() {
        [height, width] => (*height, *width),
        _ => {
            return Err(ModelError::Output(format!(
                "expected a single-channel 2-D mask, got shape {shape:?}"
            )));
        }
    };
    Array2::from_shape_vec((height, width), values)
        .map_err(|err| ModelError::Output(format!("mask reshape failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use tempfile::tempdir;

    #[test]
    fn panicking_run_makes_the_session_unusable() {
        let session = Mutex::new(0_u32);
        assert!(session_usable(&session));
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = session.lock().unwrap();
            panic!("inference blew up");
        }));
        assert!(result.is_err());
        assert!(!session_usable(&session));
    }

    #[test]
    fn missing_weights_are_reported_without_touching_the_runtime() {
        let dir = tempdir().unwrap();
        let loader = OnnxModelLoader::new(
            ModelPaths {
                classifier: dir.path().join("cls.onnx"),
                segmenter: dir.path().join("seg.onnx"),
                intra_threads: 1,
            },
            0.3,
        );
        match loader.load_classifier() {
            Err(LoadFailure::MissingWeights { kind, path }) => {
                assert_eq!(kind, ModelKind::Classifier);
                assert_eq!(path, dir.path().join("cls.onnx"));
            }
            Err(other) => panic!("unexpected failure: {other}"),
            Ok(_) => panic!("load should fail"),
        }
        assert!(matches!(
            loader.load_segmenter(),
            Err(LoadFailure::MissingWeights {
                kind: ModelKind::Segmenter,
                ..
            })
        ));
    }

    #[test]
    fn nhwc_and_nchw_masks_collapse_to_two_dimensions() {
        let mask = mask_from_output(&[1, 4, 3, 1], vec![0.0; 12]).unwrap();
        assert_eq!(mask.dim(), (4, 3));
        let mask = mask_from_output(&[1, 1, 2, 5], vec![0.5; 10]).unwrap();
        assert_eq!(mask.dim(), (2, 5));
    }

    #[test]
    fn multi_channel_masks_are_rejected() {
        assert!(matches!(
            mask_from_output(&[1, 4, 4, 2], vec![0.0; 32]),
            Err(ModelError::Output(_))
        ));
    }
}
