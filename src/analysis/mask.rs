//! Segmentation mask analysis: turns a probability mask into location and
//! quality metrics.
//!
//! The mask is binarised at a threshold, 4-connected components are labelled,
//! and the largest component is treated as the finding. Its centroid selects
//! one of nine anatomical regions, its bounding box yields a symmetry estimate,
//! and its share of the frame sets the quality tier. The input is never
//! modified.

mod components;
mod region;

use ndarray::ArrayView2;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use components::{Component, label_components, largest};
pub use region::AnatomicalRegion;

/// Probability above which a mask pixel counts as foreground.
pub const DEFAULT_MASK_THRESHOLD: f32 = 0.3;
/// Region label reported when the mask has no foreground.
pub const NOT_DETECTED_REGION: &str = "NotDetected";
/// Region label reported when the metrics could not be computed.
pub const ANALYSIS_ERROR_REGION: &str = "Analysis error";

const DEGENERATE_SYMMETRY: f64 = 0.8;
const MIN_SYMMETRY: f64 = 0.5;

/// Mask analysis options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskAnalysisConfig {
    pub threshold: f32,
}

impl Default for MaskAnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MASK_THRESHOLD,
        }
    }
}

/// Coarse confidence in the segmentation based on covered area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityTier {
    Low,
    Moderate,
    Good,
    Excellent,
    Error,
}

impl QualityTier {
    /// `> 10%` Excellent, `> 5%` Good, `> 0%` Moderate, otherwise Low.
    pub fn from_area_percent(percent: f64) -> Self {
        if percent > 10.0 {
            QualityTier::Excellent
        } else if percent > 5.0 {
            QualityTier::Good
        } else if percent > 0.0 {
            QualityTier::Moderate
        } else {
            QualityTier::Low
        }
    }
}

/// Centroid normalised by mask width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

/// Structured result of analysing one mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationMetrics {
    pub region_label: String,
    pub area_percent: f64,
    pub area_pixels: usize,
    pub symmetry_score: f64,
    pub quality_tier: QualityTier,
    pub normalized_centroid: Option<NormalizedPoint>,
    pub dimensions: Dimensions,
}

impl SegmentationMetrics {
    fn not_detected(dimensions: Dimensions) -> Self {
        Self {
            region_label: NOT_DETECTED_REGION.to_string(),
            area_percent: 0.0,
            area_pixels: 0,
            symmetry_score: 0.0,
            quality_tier: QualityTier::Low,
            normalized_centroid: None,
            dimensions,
        }
    }

    fn analysis_error(dimensions: Dimensions) -> Self {
        Self {
            region_label: ANALYSIS_ERROR_REGION.to_string(),
            area_percent: 0.0,
            area_pixels: 0,
            symmetry_score: 0.0,
            quality_tier: QualityTier::Error,
            normalized_centroid: None,
            dimensions,
        }
    }

    /// True when a region was located and the metrics are trustworthy.
    pub fn is_usable(&self) -> bool {
        self.quality_tier != QualityTier::Error && self.normalized_centroid.is_some()
    }
}

#[derive(Debug, Error)]
enum MaskAnalysisError {
    #[error("centroid ({x}, {y}) is not a finite point inside the frame")]
    BadCentroid { x: f64, y: f64 },
    #[error("area percentage {0} is not finite")]
    BadArea(f64),
}

/// Analyse a probability mask (rows = height, columns = width).
pub fn analyze_mask(mask: ArrayView2<'_, f32>, config: &MaskAnalysisConfig) -> SegmentationMetrics {
    let (height, width) = mask.dim();
    let dimensions = Dimensions { width, height };
    let foreground: Vec<bool> = mask.iter().map(|&value| value > config.threshold).collect();
    let components = label_components(&foreground, width, height);
    let Some(component) = largest(&components) else {
        debug!("Mask {width}x{height} has no foreground above {}", config.threshold);
        return SegmentationMetrics::not_detected(dimensions);
    };
    debug!(
        "Mask {width}x{height}: {} component(s), largest {} px",
        components.len(),
        component.pixels
    );
    match metrics_for_component(component, dimensions) {
        Ok(metrics) => metrics,
        Err(err) => {
            warn!("Mask analysis failed: {err}");
            SegmentationMetrics::analysis_error(dimensions)
        }
    }
}

fn metrics_for_component(
    component: &Component,
    dimensions: Dimensions,
) -> Result<SegmentationMetrics, MaskAnalysisError> {
    let total = (dimensions.width * dimensions.height) as f64;
    let area_percent = component.pixels as f64 / total * 100.0;
    if !area_percent.is_finite() {
        return Err(MaskAnalysisError::BadArea(area_percent));
    }

    let (cx, cy) = component.centroid();
    let x = cx / dimensions.width as f64;
    let y = cy / dimensions.height as f64;
    let inside = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
    if !inside(x) || !inside(y) {
        return Err(MaskAnalysisError::BadCentroid { x, y });
    }

    Ok(SegmentationMetrics {
        region_label: AnatomicalRegion::from_centroid(x, y).label().to_string(),
        area_percent,
        area_pixels: component.pixels,
        symmetry_score: symmetry_score(component),
        quality_tier: QualityTier::from_area_percent(area_percent),
        normalized_centroid: Some(NormalizedPoint { x, y }),
        dimensions,
    })
}

/// `1 - min(|h/w - 1|, 0.5)` over the bounding box; 0.8 when the box has no width.
fn symmetry_score(component: &Component) -> f64 {
    let (width, height) = component.extent();
    if width == 0 {
        return DEGENERATE_SYMMETRY;
    }
    let aspect = height as f64 / width as f64;
    (1.0 - (aspect - 1.0).abs().min(0.5)).clamp(MIN_SYMMETRY, 1.0)
}
