//! Service configuration loaded from `config.toml` in the app root.
//!
//! Config keys (TOML): `[models]` `classifier_path`, `segmenter_path`,
//! `intra_threads`; `[segmentation]` `mask_threshold`; `[intake]`
//! `upload_dir`. Every key is optional and a missing file yields defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::mask::{DEFAULT_MASK_THRESHOLD, MaskAnalysisConfig};
use crate::app_dirs::{self, AppDirError};
use crate::models::onnx::ModelPaths;

/// Default filename used to store the service configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment override for the classifier weights.
pub const CLASSIFIER_PATH_ENV: &str = "PROSTASCAN_CLASSIFIER_PATH";
/// Environment override for the segmenter weights.
pub const SEGMENTER_PATH_ENV: &str = "PROSTASCAN_SEGMENTER_PATH";

const CLASSIFIER_FILE_NAME: &str = "densenet121_prostate.onnx";
const SEGMENTER_FILE_NAME: &str = "attention_unet_prostate.onnx";
const MAX_INTRA_THREADS: usize = 64;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The app root could not be resolved.
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    /// Failed to read the config file.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the TOML contents.
    #[error("Invalid config file {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Full service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub models: ModelSettings,
    #[serde(default)]
    pub segmentation: SegmentationSettings,
    #[serde(default)]
    pub intake: IntakeSettings,
}

/// Where model weights live and how inference sessions are sized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Classifier ONNX file; defaults to `<app root>/models/densenet121_prostate.onnx`.
    #[serde(default)]
    pub classifier_path: Option<PathBuf>,
    /// Segmenter ONNX file; defaults to `<app root>/models/attention_unet_prostate.onnx`.
    #[serde(default)]
    pub segmenter_path: Option<PathBuf>,
    /// Intra-op thread count for ONNX Runtime (0 = auto).
    #[serde(default)]
    pub intra_threads: usize,
}

/// Mask post-processing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationSettings {
    /// Probability above which a mask pixel counts as foreground.
    #[serde(default = "default_mask_threshold")]
    pub mask_threshold: f32,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            mask_threshold: default_mask_threshold(),
        }
    }
}

/// Upload staging options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeSettings {
    /// Directory for staged uploads; defaults to `<app root>/uploads`.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

fn default_mask_threshold() -> f32 {
    DEFAULT_MASK_THRESHOLD
}

impl ServiceConfig {
    /// Clamp out-of-range values back into something usable.
    pub fn normalized(mut self) -> Self {
        let threshold = self.segmentation.mask_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold >= 1.0 {
            tracing::warn!(
                "mask_threshold {threshold} outside (0, 1); using {DEFAULT_MASK_THRESHOLD}"
            );
            self.segmentation.mask_threshold = DEFAULT_MASK_THRESHOLD;
        }
        self.models.intra_threads = self.models.intra_threads.min(MAX_INTRA_THREADS);
        self
    }

    /// Mask analysis options derived from this config.
    pub fn mask_analysis(&self) -> MaskAnalysisConfig {
        MaskAnalysisConfig {
            threshold: self.segmentation.mask_threshold,
        }
    }

    /// Resolve model locations, applying env overrides and app-root defaults.
    pub fn model_paths(&self) -> Result<ModelPaths, ConfigError> {
        Ok(ModelPaths {
            classifier: resolve_model_path(
                CLASSIFIER_PATH_ENV,
                self.models.classifier_path.as_ref(),
                CLASSIFIER_FILE_NAME,
            )?,
            segmenter: resolve_model_path(
                SEGMENTER_PATH_ENV,
                self.models.segmenter_path.as_ref(),
                SEGMENTER_FILE_NAME,
            )?,
            intra_threads: resolve_intra_threads(self.models.intra_threads),
        })
    }

    /// Resolve the upload staging directory.
    pub fn upload_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.intake.upload_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(app_dirs::uploads_dir()?),
        }
    }
}

/// Resolve the configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app root, returning defaults if missing.
pub fn load_or_default() -> Result<ServiceConfig, ConfigError> {
    load_from_path(&config_path()?)
}

/// Load configuration from an explicit path, returning defaults if missing.
pub fn load_from_path(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        return Ok(ServiceConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ServiceConfig>(&text)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
        .map(ServiceConfig::normalized)
}

fn resolve_model_path(
    env_key: &str,
    configured: Option<&PathBuf>,
    file_name: &str,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_path(env_key).or_else(|| configured.cloned()) {
        return Ok(path);
    }
    Ok(app_dirs::models_dir()?.join(file_name))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn resolve_intra_threads(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}
