//! Fused per-request report and the service health snapshot.

use serde::Serialize;

use super::error::SegmentationFailure;
use crate::analysis::mask::SegmentationMetrics;
use crate::analysis::risk::ClassificationResult;
use crate::models::ModelStatus;
use crate::models::lifecycle::ResidentModels;

/// Region reported when neither segmentation nor the classifier can place the finding.
pub const REGION_NOT_AVAILABLE: &str = "Not available";

/// What the optional segmentation branch produced for one request.
#[derive(Debug, Clone)]
pub enum SegmentationOutcome {
    /// A region was located.
    Located(SegmentationMetrics),
    /// The mask was analysed but nothing usable came out of it.
    Inconclusive(SegmentationMetrics),
    /// The segmenter could not be loaded or failed to run.
    Failed(SegmentationFailure),
}

/// Segmentation section of a report; absence is explicit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SegmentationReport {
    Available {
        metrics: SegmentationMetrics,
    },
    Degraded {
        reason: String,
        metrics: Option<SegmentationMetrics>,
    },
}

/// Result of one analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub classification: ClassificationResult,
    /// Best available location; never empty.
    pub effective_region: String,
    pub segmentation: SegmentationReport,
    pub segmentation_available: bool,
}

impl AnalysisReport {
    /// Combine a classification with whatever segmentation produced.
    pub fn fuse(classification: ClassificationResult, outcome: SegmentationOutcome) -> Self {
        let fallback = classification
            .fallback_region
            .clone()
            .filter(|region| !region.trim().is_empty())
            .unwrap_or_else(|| REGION_NOT_AVAILABLE.to_string());
        match outcome {
            SegmentationOutcome::Located(metrics) if !metrics.region_label.is_empty() => Self {
                classification,
                effective_region: metrics.region_label.clone(),
                segmentation: SegmentationReport::Available { metrics },
                segmentation_available: true,
            },
            SegmentationOutcome::Located(metrics) | SegmentationOutcome::Inconclusive(metrics) => {
                Self {
                    classification,
                    effective_region: fallback,
                    segmentation: SegmentationReport::Degraded {
                        reason: format!("Segmentation inconclusive: {}", metrics.region_label),
                        metrics: Some(metrics),
                    },
                    segmentation_available: false,
                }
            }
            SegmentationOutcome::Failed(failure) => Self {
                classification,
                effective_region: fallback,
                segmentation: SegmentationReport::Degraded {
                    reason: failure.to_string(),
                    metrics: None,
                },
                segmentation_available: false,
            },
        }
    }
}

/// Liveness snapshot; computing it never loads a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub models: ModelStatus,
    pub resident: ResidentModels,
}
