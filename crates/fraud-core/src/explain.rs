//! Explainer: turns a [`Decision`] into ranked human-facing reasons, a
//! risk-contribution breakdown, feature importance, and a risk-level band.

use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::features::{self, FeatureVector};
use crate::types::{
    DetectorId, Explanation, FeatureImportance, RiskLevel, Subscore, TransactionRequest,
};

fn detector_reason_template(detector: DetectorId, top_rule: Option<&str>) -> String {
    match (detector, top_rule) {
        (DetectorId::Phishing, Some(rule)) => {
            format!("message resembles a phishing attempt ({rule})")
        }
        (DetectorId::Phishing, None) => "message shows phishing-like language patterns".to_string(),
        (DetectorId::Quishing, Some(rule)) => format!("QR payload looks tampered ({rule})"),
        (DetectorId::Quishing, None) => "QR payload does not match the declared transaction".to_string(),
        (DetectorId::Collect, Some(rule)) => format!("collect request looks abusive ({rule})"),
        (DetectorId::Collect, None) => "collect request shape is atypical".to_string(),
        (DetectorId::Malware, Some(rule)) => format!("device shows signs of compromise ({rule})"),
        (DetectorId::Malware, None) => "device posture is unusually risky".to_string(),
    }
}

fn top_rule_hit<'a>(subscore: &'a Subscore) -> Option<&'a str> {
    subscore.rule_hits.first().map(|s| s.as_str())
}

fn shape_reasons(request: &TransactionRequest) -> Vec<String> {
    let mut reasons = Vec::new();
    if request.payee_new && request.amount >= 5_000.0 {
        reasons.push("first-time payee, amount above personal baseline".to_string());
    }
    if request.message.trim().is_empty() && request.amount >= 20_000.0 {
        reasons.push("large transfer with no memo supplied".to_string());
    }
    reasons.truncate(2);
    reasons
}

fn extractor_for(detector: DetectorId) -> fn(&TransactionRequest) -> FeatureVector {
    match detector {
        DetectorId::Phishing => features::phishing_features,
        DetectorId::Quishing => features::qr_features,
        DetectorId::Collect => features::collect_features,
        DetectorId::Malware => features::malware_features,
    }
}

/// `explain(request, subscores, decision) -> Explanation`
pub fn explain(
    request: &TransactionRequest,
    subscores: &[Subscore],
    trust_score: u8,
    config: &ScoringConfig,
) -> Explanation {
    let weights = &config.detector_weights;

    let mut weighted: Vec<(&Subscore, f64)> = subscores
        .iter()
        .map(|s| (s, weights.weight_of(s.detector) * s.probability))
        .collect();
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut reasons: Vec<String> = weighted
        .iter()
        .filter(|(s, _)| s.probability >= 0.3)
        .map(|(s, _)| detector_reason_template(s.detector, top_rule_hit(s)))
        .collect();
    reasons.extend(shape_reasons(request));
    reasons.truncate(6);

    let total_weighted: f64 = weighted.iter().map(|(_, w)| *w).sum();
    let mut risk_breakdown = BTreeMap::new();
    if total_weighted <= f64::EPSILON {
        for subscore in subscores {
            risk_breakdown.insert(subscore.detector.as_str().to_string(), 0.25);
        }
    } else {
        for (subscore, weighted_p) in &weighted {
            risk_breakdown.insert(subscore.detector.as_str().to_string(), weighted_p / total_weighted);
        }
    }

    let mut feature_importance = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for (subscore, weighted_p) in weighted.iter().filter(|(_, w)| *w > 0.0) {
        let extractor = extractor_for(subscore.detector);
        let vector = extractor(request);
        for (name, value) in vector.top(2) {
            if seen.insert(name.clone()) {
                feature_importance.push(FeatureImportance {
                    name,
                    importance: value.abs() * weighted_p,
                });
            }
        }
    }
    let importance_sum: f64 = feature_importance.iter().map(|f| f.importance).sum();
    if importance_sum > f64::EPSILON {
        for feature in &mut feature_importance {
            feature.importance /= importance_sum;
        }
    }

    let risk_fraction = 1.0 - (trust_score as f64 / 100.0);
    let risk_level = risk_level_of(risk_fraction);

    Explanation {
        reasons,
        risk_breakdown,
        feature_importance,
        risk_level,
    }
}

fn risk_level_of(risk_fraction: f64) -> RiskLevel {
    if risk_fraction < 0.2 {
        RiskLevel::Low
    } else if risk_fraction < 0.4 {
        RiskLevel::LowMedium
    } else if risk_fraction < 0.6 {
        RiskLevel::Medium
    } else if risk_fraction < 0.8 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceTier, TransactionType};

    fn base_request() -> TransactionRequest {
        TransactionRequest {
            transaction_id: "t1".to_string(),
            payer_vpa: "alice@bank".to_string(),
            payee_vpa: "bob@bank".to_string(),
            amount: 500.0,
            message: String::new(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: false,
            device_posture: None,
        }
    }

    fn subscore(detector: DetectorId, probability: f64, rule_hits: Vec<&str>) -> Subscore {
        Subscore {
            detector,
            probability,
            rule_hits: rule_hits.into_iter().map(|s| s.to_string()).collect(),
            hard_fire: false,
            confidence: ConfidenceTier::Medium,
        }
    }

    #[test]
    fn risk_breakdown_sums_to_one() {
        let request = base_request();
        let subscores = vec![
            subscore(DetectorId::Phishing, 0.2, vec![]),
            subscore(DetectorId::Quishing, 0.1, vec![]),
            subscore(DetectorId::Collect, 0.05, vec![]),
            subscore(DetectorId::Malware, 0.0, vec![]),
        ];
        let config = ScoringConfig::default();
        let explanation = explain(&request, &subscores, 80, &config);
        let sum: f64 = explanation.risk_breakdown.values().sum();
        assert!((sum - 1.0).abs() < 0.01);
    }

    #[test]
    fn zero_risk_distributes_evenly() {
        let request = base_request();
        let subscores = vec![
            subscore(DetectorId::Phishing, 0.0, vec![]),
            subscore(DetectorId::Quishing, 0.0, vec![]),
            subscore(DetectorId::Collect, 0.0, vec![]),
            subscore(DetectorId::Malware, 0.0, vec![]),
        ];
        let config = ScoringConfig::default();
        let explanation = explain(&request, &subscores, 100, &config);
        for share in explanation.risk_breakdown.values() {
            assert!((share - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn clean_request_has_no_high_probability_reasons() {
        let request = base_request();
        let subscores = vec![
            subscore(DetectorId::Phishing, 0.05, vec![]),
            subscore(DetectorId::Quishing, 0.05, vec![]),
            subscore(DetectorId::Collect, 0.05, vec![]),
            subscore(DetectorId::Malware, 0.05, vec![]),
        ];
        let config = ScoringConfig::default();
        let explanation = explain(&request, &subscores, 95, &config);
        assert!(explanation.reasons.is_empty());
        assert_eq!(explanation.risk_level, RiskLevel::Low);
    }

    #[test]
    fn reasons_capped_at_six() {
        let mut request = base_request();
        request.message = "URGENT verify KYC OTP bit.ly".to_string();
        request.payee_new = true;
        request.amount = 30_000.0;
        let subscores = vec![
            subscore(DetectorId::Phishing, 0.9, vec!["known_shortener_host"]),
            subscore(DetectorId::Quishing, 0.9, vec!["qr_payee_mismatch"]),
            subscore(DetectorId::Collect, 0.9, vec!["large_new_payee_collect"]),
            subscore(DetectorId::Malware, 0.9, vec!["debugger_attached"]),
        ];
        let config = ScoringConfig::default();
        let explanation = explain(&request, &subscores, 10, &config);
        assert!(explanation.reasons.len() <= 6);
    }
}
