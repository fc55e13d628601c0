//! Model loader adapters for the fraud screening pipeline. The core only
//! depends on [`fraud_core::ModelLoader`]; these are the two implementations
//! a deployment actually picks between.

#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use fraud_core::{LogisticRegressionScorer, ModelLoader, ModelScorer, RuleOnlyScorer};
use serde::Deserialize;
use tracing::warn;

/// On-disk coefficient file for one detector's logistic-regression model.
/// Framework-agnostic: just a bias and a map of feature name to weight.
#[derive(Debug, Deserialize)]
struct CoefficientFile {
    bias: f64,
    weights: BTreeMap<String, f64>,
}

/// Loads a [`LogisticRegressionScorer`] per detector from
/// `{model_dir}/{detector_name}.json`. Falls back to rule-only scoring (and
/// logs a warning) when the artifact is missing or malformed, per the
/// model-load-failure degradation the core expects from any loader.
#[derive(Debug, Clone, Default)]
pub struct FileSystemModelLoader;

impl ModelLoader for FileSystemModelLoader {
    fn load(&self, model_dir: &str, detector_name: &str) -> Box<dyn ModelScorer> {
        let path = Path::new(model_dir).join(format!("{detector_name}.json"));
        match load_coefficients(&path) {
            Ok(scorer) => Box::new(scorer),
            Err(reason) => {
                warn!(detector = detector_name, path = %path.display(), %reason, "falling back to rule-only scoring");
                Box::new(RuleOnlyScorer)
            }
        }
    }
}

fn load_coefficients(path: &Path) -> Result<LogisticRegressionScorer, String> {
    let raw = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let parsed: CoefficientFile = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    Ok(LogisticRegressionScorer::new(
        parsed.bias,
        parsed.weights.into_iter().collect(),
    ))
}

/// Deterministic, hand-tuned coefficients for local development and demos
/// where no trained artifact is available. Weights are intentionally mild:
/// the rule overlay, not the model, is expected to carry most of the signal
/// for obviously hostile inputs in this fixture.
#[derive(Debug, Clone, Default)]
pub struct FixtureModelLoader;

impl ModelLoader for FixtureModelLoader {
    fn load(&self, _model_dir: &str, detector_name: &str) -> Box<dyn ModelScorer> {
        let (bias, weights): (f64, Vec<(&str, f64)>) = match detector_name {
            "phishing" => (
                -2.0,
                vec![
                    ("urgency_lexicon_hits", 0.6),
                    ("has_known_shortener", 1.5),
                    ("has_obfuscated_digits", 0.8),
                    ("uppercase_fraction", 0.9),
                ],
            ),
            "quishing" => (
                -2.0,
                vec![
                    ("payee_mismatch", 2.0),
                    ("amount_mismatch_pct", 0.02),
                    ("host_is_ip_literal", 1.2),
                    ("non_standard_param_count", 0.3),
                ],
            ),
            "collect" => (
                -2.0,
                vec![
                    ("is_collect", 0.4),
                    ("payee_new", 0.7),
                    ("amount_zscore_bucket", 0.5),
                    ("merchant_keyword_hits", -0.3),
                ],
            ),
            "malware" => (
                -2.0,
                vec![
                    ("debugger_attached", 1.8),
                    ("accessibility_service_active", 0.9),
                    ("recent_sideload", 0.9),
                    ("screen_overlay_active", 0.7),
                ],
            ),
            _ => (0.0, vec![]),
        };
        Box::new(LogisticRegressionScorer::new(
            bias,
            weights.into_iter().map(|(n, w)| (n.to_string(), w)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraud_core::features::phishing_features;
    use fraud_core::{TransactionRequest, TransactionType};

    fn request(message: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: "t1".to_string(),
            payer_vpa: "alice@bank".to_string(),
            payee_vpa: "bob@bank".to_string(),
            amount: 500.0,
            message: message.to_string(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: false,
            device_posture: None,
        }
    }

    #[test]
    fn filesystem_loader_falls_back_to_rule_only_when_artifact_missing() {
        let loader = FileSystemModelLoader;
        let scorer = loader.load("/nonexistent/model/dir", "phishing");
        assert!(!scorer.is_ready());
    }

    #[test]
    fn fixture_loader_is_deterministic_and_ready() {
        let loader = FixtureModelLoader;
        let scorer = loader.load("./models", "phishing");
        assert!(scorer.is_ready());
        let features = phishing_features(&request("urgent verify KYC"));
        let a = scorer.predict_proba(&features);
        let b = scorer.predict_proba(&features);
        assert_eq!(a, b);
    }

    #[test]
    fn fixture_loader_scores_clean_message_lower_than_suspicious_one() {
        let loader = FixtureModelLoader;
        let scorer = loader.load("./models", "phishing");
        let clean = scorer.predict_proba(&phishing_features(&request("lunch money")));
        let suspicious =
            scorer.predict_proba(&phishing_features(&request("URGENT verify KYC now or blocked")));
        assert!(suspicious > clean);
    }
}
