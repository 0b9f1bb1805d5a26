//! Maps classifier probabilities onto PI-RADS style risk tiers.

use serde::Serialize;

use crate::models::ClassifierOutput;

/// Risk tier derived from the positive-class probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskTier {
    VeryLow,
    Low,
    Moderate,
    High,
}

struct TierRule {
    min_probability: f64,
    tier: RiskTier,
    risk_label: &'static str,
    findings: &'static str,
    clinical_label: &'static str,
    recommendation: &'static str,
}

/// Ordered highest-first; the first rule whose lower bound is met wins.
const TIER_RULES: [TierRule; 4] = [
    TierRule {
        min_probability: 0.80,
        tier: RiskTier::High,
        risk_label: "High Risk",
        findings: "Significant findings that require priority medical evaluation",
        clinical_label: "PIRADS 5",
        recommendation: "See a urologist within the next 2 weeks",
    },
    TierRule {
        min_probability: 0.60,
        tier: RiskTier::Moderate,
        risk_label: "Moderate Risk",
        findings: "Signs that call for a medical evaluation in the coming months",
        clinical_label: "PIRADS 4",
        recommendation: "Schedule an appointment with a urologist of your choice",
    },
    TierRule {
        min_probability: 0.40,
        tier: RiskTier::Low,
        risk_label: "Low Risk",
        findings: "Minor findings that can be reviewed at a routine visit",
        clinical_label: "PIRADS 3",
        recommendation: "Follow the advice of your treating physician",
    },
    TierRule {
        min_probability: f64::NEG_INFINITY,
        tier: RiskTier::VeryLow,
        risk_label: "Very Low Risk",
        findings: "No significant findings",
        clinical_label: "PIRADS 1-2",
        recommendation: "Continue routine follow-up as directed by your physician",
    },
];

/// Structured risk report for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub risk_tier: RiskTier,
    pub risk_label: String,
    pub findings_text: String,
    pub clinical_label: String,
    pub recommendation_text: String,
    /// `floor(p * 100)` of the positive-class probability.
    pub probability_percent: u8,
    pub predicted_class: String,
    pub confidence: f32,
    /// Region the classifier itself can vouch for, if any.
    pub fallback_region: Option<String>,
}

/// Pick the tier for a positive-class probability, clamped into `[0, 1]`.
pub fn risk_tier(probability: f64) -> RiskTier {
    rule_for(probability.clamp(0.0, 1.0)).tier
}

/// Build the full report from the positive-class probability and raw model output.
///
/// Callers must reject non-finite probabilities first; they are treated as 0.
pub fn interpret(probability: f64, output: &ClassifierOutput) -> ClassificationResult {
    let p = if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let rule = rule_for(p);
    ClassificationResult {
        risk_tier: rule.tier,
        risk_label: rule.risk_label.to_string(),
        findings_text: rule.findings.to_string(),
        clinical_label: rule.clinical_label.to_string(),
        recommendation_text: rule.recommendation.to_string(),
        probability_percent: probability_percent(p),
        predicted_class: output.predicted_class.clone(),
        confidence: output.confidence,
        fallback_region: output
            .region_hint
            .as_ref()
            .map(|hint| hint.trim().to_string())
            .filter(|hint| !hint.is_empty()),
    }
}

/// Integer percentage, truncated rather than rounded.
///
/// Computed at the model's `f32` precision: widening first would turn an
/// output of `0.57` into `56.99999...` and report 56.
pub fn probability_percent(probability: f64) -> u8 {
    ((probability.clamp(0.0, 1.0) as f32) * 100.0).floor() as u8
}

fn rule_for(p: f64) -> &'static TierRule {
    TIER_RULES
        .iter()
        .find(|rule| p >= rule.min_probability)
        .unwrap_or(&TIER_RULES[TIER_RULES.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(p: f32) -> ClassifierOutput {
        ClassifierOutput::from_probabilities(vec![1.0 - p, p], None)
    }

    #[test]
    fn boundaries_belong_to_the_higher_tier() {
        assert_eq!(risk_tier(0.80), RiskTier::High);
        assert_eq!(risk_tier(0.79999), RiskTier::Moderate);
        assert_eq!(risk_tier(0.60), RiskTier::Moderate);
        assert_eq!(risk_tier(0.59999), RiskTier::Low);
        assert_eq!(risk_tier(0.40), RiskTier::Low);
        assert_eq!(risk_tier(0.39999), RiskTier::VeryLow);
        assert_eq!(risk_tier(0.0), RiskTier::VeryLow);
        assert_eq!(risk_tier(1.0), RiskTier::High);
    }

    #[test]
    fn f32_model_outputs_on_a_boundary_keep_the_higher_tier() {
        for (p, tier) in [(0.8_f32, RiskTier::High), (0.6, RiskTier::Moderate), (0.4, RiskTier::Low)] {
            assert_eq!(risk_tier(f64::from(p)), tier);
        }
    }

    #[test]
    fn tiers_are_monotonic_over_the_unit_interval() {
        let mut previous = RiskTier::VeryLow;
        for step in 0..1000 {
            let tier = risk_tier(step as f64 / 1000.0);
            assert!(tier >= previous);
            previous = tier;
        }
        assert_eq!(previous, RiskTier::High);
    }

    #[test]
    fn percent_truncates() {
        assert_eq!(probability_percent(0.666), 66);
        assert_eq!(probability_percent(0.999), 99);
        assert_eq!(probability_percent(1.0), 100);
        assert_eq!(probability_percent(0.0), 0);
    }

    #[test]
    fn percent_matches_the_f32_model_output() {
        for (p, percent) in [(0.57_f32, 57), (0.29, 29), (0.58, 58), (0.9, 90), (0.56, 56)] {
            assert_eq!(probability_percent(f64::from(p)), percent, "p = {p}");
        }
        let result = interpret(f64::from(0.57_f32), &output(0.57));
        assert_eq!(result.probability_percent, 57);
        assert_eq!(result.confidence, 0.57);
    }

    #[test]
    fn interpret_fills_every_field() {
        let result = interpret(0.85, &output(0.85));
        assert_eq!(result.risk_tier, RiskTier::High);
        assert_eq!(result.clinical_label, "PIRADS 5");
        assert_eq!(result.risk_label, "High Risk");
        assert_eq!(result.probability_percent, 85);
        assert_eq!(result.predicted_class, "pos");
        assert!(result.fallback_region.is_none());
    }

    #[test]
    fn blank_region_hint_is_not_a_fallback() {
        let out = ClassifierOutput::from_probabilities(vec![0.9, 0.1], Some("  ".into()));
        assert!(interpret(0.1, &out).fallback_region.is_none());
        let out = ClassifierOutput::from_probabilities(vec![0.9, 0.1], Some("Central zone".into()));
        assert_eq!(
            interpret(0.1, &out).fallback_region.as_deref(),
            Some("Central zone")
        );
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(interpret(0.5, &output(0.5))).unwrap();
        assert_eq!(json["riskTier"], "Low");
        assert_eq!(json["clinicalLabel"], "PIRADS 3");
        assert_eq!(json["probabilityPercent"], 50);
    }
}
