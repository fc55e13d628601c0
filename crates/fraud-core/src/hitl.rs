//! Human-in-the-loop manager: decides whether a decision must suspend for
//! analyst review and, if so, with what priority and SLA.

use crate::aggregation::{max_probability, min_probability};
use crate::config::ScoringConfig;
use crate::types::{Action, HitlVerdict, Priority, Subscore, TransactionRequest};

/// `evaluate(decision, subscores) -> {human_review_required, priority, sla_seconds}`
pub fn evaluate(
    action: Action,
    trust_score: u8,
    subscores: &[Subscore],
    request: &TransactionRequest,
    config: &ScoringConfig,
) -> HitlVerdict {
    let max_p = max_probability(subscores);
    let min_p = min_probability(subscores);

    let required = if !config.hitl_enabled {
        false
    } else {
        action == Action::Warn
            || (action == Action::Block && max_p < 0.9)
            || (max_p - min_p) >= 0.6
            || (request.amount >= config.large_amount_threshold && action != Action::Allow)
    };

    let (priority, sla_seconds) = priority_and_sla(action, trust_score, request, config);

    HitlVerdict {
        human_review_required: required,
        priority,
        sla_seconds,
    }
}

fn priority_and_sla(
    action: Action,
    trust_score: u8,
    request: &TransactionRequest,
    config: &ScoringConfig,
) -> (Priority, u64) {
    if action == Action::Block && request.amount >= config.large_amount_threshold {
        return (Priority::Critical, 60);
    }
    if action == Action::Block {
        return (Priority::High, 300);
    }
    if trust_score < 35 {
        return (Priority::High, 300);
    }
    if trust_score < 50 {
        return (Priority::Medium, 1_800);
    }
    (Priority::Low, 14_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceTier, DetectorId, TransactionType};

    fn request(amount: f64) -> TransactionRequest {
        TransactionRequest {
            transaction_id: "t1".to_string(),
            payer_vpa: "alice@bank".to_string(),
            payee_vpa: "bob@bank".to_string(),
            amount,
            message: String::new(),
            transaction_type: TransactionType::Collect,
            qr_payload: None,
            payee_new: true,
            device_posture: None,
        }
    }

    fn subscores(values: [f64; 4]) -> Vec<Subscore> {
        [
            DetectorId::Phishing,
            DetectorId::Quishing,
            DetectorId::Collect,
            DetectorId::Malware,
        ]
        .into_iter()
        .zip(values)
        .map(|(detector, probability)| Subscore {
            detector,
            probability,
            rule_hits: vec![],
            hard_fire: false,
            confidence: ConfidenceTier::Medium,
        })
        .collect()
    }

    #[test]
    fn large_amount_block_is_critical_with_sixty_second_sla() {
        let config = ScoringConfig::default();
        let req = request(75_000.0);
        let verdict = evaluate(Action::Block, 10, &subscores([0.8, 0.8, 0.2, 0.1]), &req, &config);
        assert!(verdict.human_review_required);
        assert_eq!(verdict.priority, Priority::Critical);
        assert_eq!(verdict.sla_seconds, 60);
    }

    #[test]
    fn warn_always_requires_review() {
        let config = ScoringConfig::default();
        let req = request(500.0);
        let verdict = evaluate(Action::Warn, 50, &subscores([0.3, 0.3, 0.3, 0.3]), &req, &config);
        assert!(verdict.human_review_required);
    }

    #[test]
    fn disabled_hitl_never_requires_review() {
        let mut config = ScoringConfig::default();
        config.hitl_enabled = false;
        let req = request(75_000.0);
        let verdict = evaluate(Action::Block, 5, &subscores([0.95, 0.2, 0.1, 0.1]), &req, &config);
        assert!(!verdict.human_review_required);
    }

    #[test]
    fn block_with_decisive_detector_does_not_require_review_on_that_rule_alone() {
        let config = ScoringConfig::default();
        let req = request(500.0);
        let verdict = evaluate(Action::Block, 10, &subscores([0.95, 0.95, 0.95, 0.95]), &req, &config);
        // max_p - min_p = 0 here and max_p >= 0.9, so only the disagreement/amount
        // rules are inapplicable; decisive unanimous high risk does not force HITL.
        assert!(!verdict.human_review_required);
    }
}
