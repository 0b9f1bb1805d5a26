//! Library exports for reuse in the CLI, benchmarks and tests.
/// Mask analysis and risk interpretation.
pub mod analysis;
/// Application directory helpers.
pub mod app_dirs;
/// Service configuration loading.
pub mod config;
/// Upload validation and staging.
pub mod intake;
/// Logging setup.
pub mod logging;
/// Model traits, backends and lifecycle management.
pub mod models;
/// Request orchestration and report fusion.
pub mod pipeline;

pub use analysis::mask::{MaskAnalysisConfig, SegmentationMetrics, analyze_mask};
pub use analysis::risk::{ClassificationResult, RiskTier};
pub use models::{ModelManager, ModelStatus};
pub use pipeline::{AnalysisError, AnalysisReport, Pipeline};
