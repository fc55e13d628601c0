//! Abstraction over a trained classifier. The core only requires that
//! `predict_proba` be a deterministic, total function from a feature vector to
//! a probability; the artifact format and inference backend are a concern of
//! whatever implements [`ModelScorer`] (see `fraud-adapters`).

use crate::features::FeatureVector;

pub trait ModelScorer: Send + Sync {
    /// Probability of the positive (fraud) class for this feature vector.
    /// Must be deterministic for a fixed model and input, and must never
    /// panic or block for I/O.
    fn predict_proba(&self, features: &FeatureVector) -> f64;

    fn is_ready(&self) -> bool {
        true
    }
}

/// Degrades gracefully to rule-only operation: returns a fixed neutral
/// probability so the detector's blend formula falls through to the rule
/// score alone. Used when a model artifact failed to load at startup.
pub struct RuleOnlyScorer;

impl ModelScorer for RuleOnlyScorer {
    fn predict_proba(&self, _features: &FeatureVector) -> f64 {
        0.5
    }

    fn is_ready(&self) -> bool {
        false
    }
}

/// Portable logistic-regression scorer: coefficients keyed by feature name,
/// framework-agnostic, loadable from a plain coefficient-array exchange
/// format rather than a native model binary.
pub struct LogisticRegressionScorer {
    pub bias: f64,
    pub weights: Vec<(String, f64)>,
}

impl LogisticRegressionScorer {
    pub fn new(bias: f64, weights: Vec<(String, f64)>) -> Self {
        Self { bias, weights }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ModelScorer for LogisticRegressionScorer {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        let mut logit = self.bias;
        for (name, weight) in &self.weights {
            if let Some(value) = features.get(name) {
                logit += weight * value;
            }
        }
        sigmoid(logit).clamp(0.0, 1.0)
    }
}

/// Loads an opaque [`ModelScorer`] for one detector. The implementation layer
/// may read a native ML library's artifact or a framework-agnostic exchange
/// format; the core only ever sees the resulting trait object.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_dir: &str, detector_name: &str) -> Box<dyn ModelScorer>;
}

/// Loader used when no real artifact backend is configured: every detector
/// falls back to rule-only scoring. Exercised by default in tests and local
/// development where `model_dir` points nowhere.
pub struct NullModelLoader;

impl ModelLoader for NullModelLoader {
    fn load(&self, _model_dir: &str, _detector_name: &str) -> Box<dyn ModelScorer> {
        Box::new(RuleOnlyScorer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_only_scorer_is_not_ready_and_returns_neutral() {
        let scorer = RuleOnlyScorer;
        assert!(!scorer.is_ready());
        assert_eq!(scorer.predict_proba(&FeatureVector::default()), 0.5);
    }

    #[test]
    fn logistic_scorer_is_deterministic() {
        let scorer = LogisticRegressionScorer::new(0.0, vec![("x".to_string(), 2.0)]);
        let features = FeatureVector::default();
        let a = scorer.predict_proba(&features);
        let b = scorer.predict_proba(&features);
        assert_eq!(a, b);
    }
}
