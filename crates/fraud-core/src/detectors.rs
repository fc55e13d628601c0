//! The four independent risk detectors. Each combines a trained classifier
//! with a rule overlay via the same blend: hard rule fires win outright
//! (`max`), everything else is a soft blend so a brittle model can't dominate.

use std::sync::Arc;

use crate::features::{self, FeatureVector};
use crate::model::ModelScorer;
use crate::rules::{self, Rule};
use crate::types::{ConfidenceTier, DetectorId, Subscore, TransactionRequest};

fn tier_of(margin: f64, rule_hit_count: usize) -> ConfidenceTier {
    if margin >= 0.35 || rule_hit_count >= 2 {
        ConfidenceTier::High
    } else if margin >= 0.15 || rule_hit_count == 1 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// `p = max(p_model, p_rules)` if any rule is hard, else `0.6*p_model + 0.4*p_rules`.
/// A model that failed to load (`is_ready() == false`) never contributes: the
/// detector falls through to rule-only scoring instead of diluting with its
/// fixed neutral prediction.
fn blend(p_model: f64, p_rules: f64, any_hard: bool, model_ready: bool) -> f64 {
    if !model_ready {
        return p_rules;
    }
    if any_hard {
        p_model.max(p_rules)
    } else {
        0.6 * p_model + 0.4 * p_rules
    }
}

fn score_with(
    detector: DetectorId,
    request: &TransactionRequest,
    extractor: impl Fn(&TransactionRequest) -> FeatureVector,
    rule_set: Vec<Rule>,
    model: &dyn ModelScorer,
) -> Subscore {
    let feature_vector = extractor(request);
    let p_model = model.predict_proba(&feature_vector);
    let (p_rules, rule_hits, any_hard) = rules::rule_probability(&rule_set, request);
    let probability = blend(p_model, p_rules, any_hard, model.is_ready()).clamp(0.0, 1.0);
    let confidence = tier_of((p_model - 0.5).abs(), rule_hits.len());
    Subscore {
        detector,
        probability,
        rule_hits,
        hard_fire: any_hard,
        confidence,
    }
}

/// `score(request) -> Subscore`, shared contract across all four detectors.
/// Implementations must be total: the feature extractors they call are
/// themselves total, so nothing here can fail.
pub trait Detector: Send + Sync {
    fn id(&self) -> DetectorId;
    fn score(&self, request: &TransactionRequest) -> Subscore;
    fn is_ready(&self) -> bool;
}

pub struct PhishingDetector {
    model: Arc<dyn ModelScorer>,
}

impl PhishingDetector {
    pub fn new(model: Arc<dyn ModelScorer>) -> Self {
        Self { model }
    }
}

impl Detector for PhishingDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Phishing
    }

    fn score(&self, request: &TransactionRequest) -> Subscore {
        score_with(
            DetectorId::Phishing,
            request,
            features::phishing_features,
            rules::phishing_rules(),
            self.model.as_ref(),
        )
    }

    fn is_ready(&self) -> bool {
        self.model.is_ready()
    }
}

pub struct QuishingDetector {
    model: Arc<dyn ModelScorer>,
}

impl QuishingDetector {
    pub fn new(model: Arc<dyn ModelScorer>) -> Self {
        Self { model }
    }
}

impl Detector for QuishingDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Quishing
    }

    fn score(&self, request: &TransactionRequest) -> Subscore {
        score_with(
            DetectorId::Quishing,
            request,
            features::qr_features,
            rules::qr_rules(),
            self.model.as_ref(),
        )
    }

    fn is_ready(&self) -> bool {
        self.model.is_ready()
    }
}

pub struct CollectDetector {
    model: Arc<dyn ModelScorer>,
    large_amount_threshold: f64,
}

impl CollectDetector {
    pub fn new(model: Arc<dyn ModelScorer>, large_amount_threshold: f64) -> Self {
        Self {
            model,
            large_amount_threshold,
        }
    }
}

impl Detector for CollectDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Collect
    }

    fn score(&self, request: &TransactionRequest) -> Subscore {
        score_with(
            DetectorId::Collect,
            request,
            features::collect_features,
            rules::collect_rules(self.large_amount_threshold),
            self.model.as_ref(),
        )
    }

    fn is_ready(&self) -> bool {
        self.model.is_ready()
    }
}

pub struct MalwareDetector {
    model: Arc<dyn ModelScorer>,
}

impl MalwareDetector {
    pub fn new(model: Arc<dyn ModelScorer>) -> Self {
        Self { model }
    }
}

impl Detector for MalwareDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Malware
    }

    fn score(&self, request: &TransactionRequest) -> Subscore {
        score_with(
            DetectorId::Malware,
            request,
            features::malware_features,
            rules::malware_rules(),
            self.model.as_ref(),
        )
    }

    fn is_ready(&self) -> bool {
        self.model.is_ready()
    }
}
