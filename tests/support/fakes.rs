use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::DynamicImage;
use ndarray::Array2;
use prostascan::models::{
    Classifier, ClassifierOutput, LoadFailure, ModelDescriptor, ModelError, ModelInfo, ModelKind,
    ModelLoader, Segmenter,
};

fn descriptor(name: &str) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        device: "cpu".to_string(),
        input_size: (32, 32),
        classes: vec!["neg".to_string(), "pos".to_string()],
        threshold: None,
    }
}

#[derive(Clone)]
pub enum ClassifierBehavior {
    Predicts {
        probabilities: Vec<f32>,
        region_hint: Option<String>,
    },
    Fails,
    Missing,
}

#[derive(Clone)]
pub enum SegmenterBehavior {
    Mask(Array2<f32>),
    Fails,
    Panics,
    Missing,
}

/// Loader handing out scripted models and counting load attempts.
#[derive(Clone)]
pub struct FakeLoader {
    pub classifier: ClassifierBehavior,
    pub segmenter: SegmenterBehavior,
    pub load_delay: Duration,
    pub classifier_loads: Arc<AtomicUsize>,
    pub segmenter_loads: Arc<AtomicUsize>,
    pub reclaims: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(classifier: ClassifierBehavior, segmenter: SegmenterBehavior) -> Self {
        Self {
            classifier,
            segmenter,
            load_delay: Duration::ZERO,
            classifier_loads: Arc::new(AtomicUsize::new(0)),
            segmenter_loads: Arc::new(AtomicUsize::new(0)),
            reclaims: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn classifier_loads(&self) -> usize {
        self.classifier_loads.load(Ordering::SeqCst)
    }

    pub fn segmenter_loads(&self) -> usize {
        self.segmenter_loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for FakeLoader {
    fn load_classifier(&self) -> Result<Box<dyn Classifier>, LoadFailure> {
        self.classifier_loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        if matches!(self.classifier, ClassifierBehavior::Missing) {
            return Err(LoadFailure::MissingWeights {
                kind: ModelKind::Classifier,
                path: "densenet121_prostate.onnx".into(),
            });
        }
        Ok(Box::new(FakeClassifier(self.classifier.clone())))
    }

    fn load_segmenter(&self) -> Result<Box<dyn Segmenter>, LoadFailure> {
        self.segmenter_loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        if matches!(self.segmenter, SegmenterBehavior::Missing) {
            return Err(LoadFailure::MissingWeights {
                kind: ModelKind::Segmenter,
                path: "attention_unet_prostate.onnx".into(),
            });
        }
        Ok(Box::new(FakeSegmenter(self.segmenter.clone())))
    }

    fn reclaim(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeClassifier(ClassifierBehavior);

impl ModelInfo for FakeClassifier {
    fn describe(&self) -> ModelDescriptor {
        descriptor("fake-classifier")
    }
}

impl Classifier for FakeClassifier {
    fn predict(&self, _image: &DynamicImage) -> Result<ClassifierOutput, ModelError> {
        match &self.0 {
            ClassifierBehavior::Predicts {
                probabilities,
                region_hint,
            } => Ok(ClassifierOutput::from_probabilities(
                probabilities.clone(),
                region_hint.clone(),
            )),
            ClassifierBehavior::Fails => Err(ModelError::Inference("fake classifier failure".into())),
            ClassifierBehavior::Missing => unreachable!("missing classifiers are never loaded"),
        }
    }
}

pub struct FakeSegmenter(SegmenterBehavior);

impl ModelInfo for FakeSegmenter {
    fn describe(&self) -> ModelDescriptor {
        ModelDescriptor {
            threshold: Some(0.3),
            classes: Vec::new(),
            ..descriptor("fake-segmenter")
        }
    }
}

impl Segmenter for FakeSegmenter {
    fn predict(&self, _image: &DynamicImage) -> Result<Array2<f32>, ModelError> {
        match &self.0 {
            SegmenterBehavior::Mask(mask) => Ok(mask.clone()),
            SegmenterBehavior::Fails => Err(ModelError::Inference("fake segmenter failure".into())),
            SegmenterBehavior::Panics => panic!("fake segmenter exploded"),
            SegmenterBehavior::Missing => unreachable!("missing segmenters are never loaded"),
        }
    }
}

pub fn predicts(positive: f32) -> ClassifierBehavior {
    ClassifierBehavior::Predicts {
        probabilities: vec![1.0 - positive, positive],
        region_hint: None,
    }
}

/// 128x128 mask with a filled square centred on `(cx, cy)` pixels.
pub fn square_mask(cx: usize, cy: usize, half: usize) -> Array2<f32> {
    let mut mask = Array2::zeros((128, 128));
    for y in cy - half..cy + half {
        for x in cx - half..cx + half {
            mask[[y, x]] = 0.9;
        }
    }
    mask
}
