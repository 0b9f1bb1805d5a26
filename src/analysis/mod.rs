//! Pure analysis steps applied to model outputs.

/// Probability mask to location and quality metrics.
pub mod mask;
/// Classifier probability to clinical risk report.
pub mod risk;
