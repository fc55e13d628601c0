//! Trust-score aggregator: fuses the four detector subscores into one
//! decision. Hard overrides are checked in a fixed order before falling back
//! to threshold bands on the fused score; ties resolve toward the stricter
//! action.

use chrono::Utc;

use crate::config::ScoringConfig;
use crate::types::{Action, Decision, DetectorId, Subscore};

/// A subscore counts as a "hard rule fire" only when `Subscore::hard_fire`
/// (set by the detector from its rule catalogue's own hard/soft flags) is
/// true, gated additionally on the probability reaching the hard-rule
/// threshold. A detector whose probability crosses the threshold purely from
/// soft rules plus the model must not trigger this override.
fn looks_like_hard_fire(subscore: &Subscore, hard_rule_threshold: f64) -> bool {
    subscore.hard_fire && subscore.probability >= hard_rule_threshold
}

fn stricter(a: Action, b: Action) -> Action {
    a.max(b)
}

/// `aggregate(subscores[4]) -> Decision`
pub fn aggregate(subscores: &[Subscore], config: &ScoringConfig) -> Decision {
    let weights = &config.detector_weights;
    let risk: f64 = subscores
        .iter()
        .map(|s| weights.weight_of(s.detector) * s.probability)
        .sum();
    let risk = risk.clamp(0.0, 1.0);
    let trust_score = ((1.0 - risk) * 100.0).round().clamp(0.0, 100.0) as u8;

    let max_p = subscores
        .iter()
        .map(|s| s.probability)
        .fold(0.0_f64, f64::max);
    let hard_fires = subscores
        .iter()
        .filter(|s| looks_like_hard_fire(s, config.hard_rule_threshold))
        .count();
    let at_least_two_high = subscores.iter().filter(|s| s.probability >= 0.7).count() >= 2;

    let mut action = threshold_band(trust_score, config);
    let mut floor_score = trust_score;

    // 1. Any detector with a hard rule fire AND p_i >= hard_rule_threshold -> BLOCK, cap score.
    if hard_fires > 0 {
        action = stricter(action, Action::Block);
        floor_score = floor_score.min(20);
    }
    // 2. Two or more detectors with p_i >= 0.7 -> BLOCK.
    if at_least_two_high {
        action = stricter(action, Action::Block);
    }
    // 3. Any detector with p_i >= 0.9 -> at least WARN.
    if max_p >= 0.9 {
        action = stricter(action, Action::Warn);
    }

    Decision {
        trust_score: floor_score,
        action,
        subscores: subscores.to_vec(),
        timestamp: Utc::now(),
    }
}

fn threshold_band(trust_score: u8, config: &ScoringConfig) -> Action {
    if trust_score >= config.trust_score_allow_threshold {
        Action::Allow
    } else if trust_score >= config.trust_score_warn_threshold {
        Action::Warn
    } else {
        Action::Block
    }
}

pub fn max_probability(subscores: &[Subscore]) -> f64 {
    subscores.iter().map(|s| s.probability).fold(0.0_f64, f64::max)
}

pub fn min_probability(subscores: &[Subscore]) -> f64 {
    subscores
        .iter()
        .map(|s| s.probability)
        .fold(1.0_f64, f64::min)
}

pub fn subscore_of(subscores: &[Subscore], detector: DetectorId) -> Option<&Subscore> {
    subscores.iter().find(|s| s.detector == detector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceTier, DetectorId};

    fn clean_subscore(detector: DetectorId) -> Subscore {
        Subscore {
            detector,
            probability: 0.05,
            rule_hits: vec![],
            hard_fire: false,
            confidence: ConfidenceTier::Low,
        }
    }

    fn all_clean() -> Vec<Subscore> {
        vec![
            clean_subscore(DetectorId::Phishing),
            clean_subscore(DetectorId::Quishing),
            clean_subscore(DetectorId::Collect),
            clean_subscore(DetectorId::Malware),
        ]
    }

    #[test]
    fn clean_request_allows_with_high_trust() {
        let config = ScoringConfig::default();
        let decision = aggregate(&all_clean(), &config);
        assert_eq!(decision.action, Action::Allow);
        assert!(decision.trust_score >= 80);
    }

    #[test]
    fn hard_fire_caps_trust_score_and_blocks() {
        let config = ScoringConfig::default();
        let mut subscores = all_clean();
        subscores[0] = Subscore {
            detector: DetectorId::Phishing,
            probability: 0.95,
            rule_hits: vec!["known_shortener_host".to_string()],
            hard_fire: true,
            confidence: ConfidenceTier::High,
        };
        let decision = aggregate(&subscores, &config);
        assert_eq!(decision.action, Action::Block);
        assert!(decision.trust_score <= 20);
    }

    #[test]
    fn soft_rule_hits_at_high_probability_do_not_trigger_hard_override() {
        let config = ScoringConfig::default();
        let mut subscores = all_clean();
        subscores[0] = Subscore {
            detector: DetectorId::Phishing,
            probability: 0.9,
            rule_hits: vec!["urgency_language".to_string()],
            hard_fire: false,
            confidence: ConfidenceTier::High,
        };
        let decision = aggregate(&subscores, &config);
        // A lone detector at 0.9 still forces at least WARN (rule 3), but the
        // hard-override (rule 1) must not fire since no hard rule matched,
        // so the score is not floored to 20.
        assert_ne!(decision.action, Action::Allow);
        assert!(decision.trust_score > 20);
    }

    #[test]
    fn two_high_detectors_force_block() {
        let config = ScoringConfig::default();
        let mut subscores = all_clean();
        subscores[0].probability = 0.75;
        subscores[1].probability = 0.75;
        let decision = aggregate(&subscores, &config);
        assert_eq!(decision.action, Action::Block);
    }

    #[test]
    fn single_detector_at_ninety_forces_at_least_warn() {
        let config = ScoringConfig::default();
        let mut subscores = all_clean();
        subscores[0].probability = 0.92;
        subscores[0].rule_hits = vec![];
        let decision = aggregate(&subscores, &config);
        assert_ne!(decision.action, Action::Allow);
    }

    #[test]
    fn trust_score_forty_five_is_warn_boundary_inclusive() {
        let config = ScoringConfig::default();
        assert_eq!(threshold_band(45, &config), Action::Warn);
        assert_eq!(threshold_band(44, &config), Action::Block);
        assert_eq!(threshold_band(65, &config), Action::Allow);
        assert_eq!(threshold_band(64, &config), Action::Warn);
    }
}
