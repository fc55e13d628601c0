use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::FraudError;

/// Fusion weight for one detector. Kept as a flat struct (rather than a map)
/// so callers get compile-time field access; `normalized()` still lets the
/// weights arrive unnormalized from a config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectorWeights {
    pub phishing: f64,
    pub quishing: f64,
    pub collect: f64,
    pub malware: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            phishing: 0.25,
            quishing: 0.25,
            collect: 0.25,
            malware: 0.25,
        }
    }
}

impl DetectorWeights {
    pub fn sum(&self) -> f64 {
        self.phishing + self.quishing + self.collect + self.malware
    }

    /// Rescales the four weights to sum to 1.0. A zero sum falls back to the
    /// uniform default rather than dividing by zero.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum <= f64::EPSILON {
            return Self::default();
        }
        Self {
            phishing: self.phishing / sum,
            quishing: self.quishing / sum,
            collect: self.collect / sum,
            malware: self.malware / sum,
        }
    }

    pub fn weight_of(&self, detector: crate::types::DetectorId) -> f64 {
        use crate::types::DetectorId::*;
        match detector {
            Phishing => self.phishing,
            Quishing => self.quishing,
            Collect => self.collect,
            Malware => self.malware,
        }
    }
}

/// Process-wide scoring configuration. Loaded at startup and hot-swappable
/// thereafter via [`ConfigHandle`]; see §5/§6 equivalents in the design notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub trust_score_allow_threshold: u8,
    pub trust_score_warn_threshold: u8,
    pub detector_weights: DetectorWeights,
    pub large_amount_threshold: f64,
    pub hitl_enabled: bool,
    pub per_detector_deadline_ms: u64,
    pub model_dir: String,
    pub hard_rule_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            trust_score_allow_threshold: 65,
            trust_score_warn_threshold: 45,
            detector_weights: DetectorWeights::default(),
            large_amount_threshold: 50_000.0,
            hitl_enabled: true,
            per_detector_deadline_ms: 150,
            model_dir: "./models".to_string(),
            hard_rule_threshold: 0.85,
        }
    }
}

impl ScoringConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, FraudError> {
        let mut cfg: Self = toml::from_str(raw)
            .map_err(|e| FraudError::ConfigurationError(format!("invalid config toml: {e}")))?;
        cfg.detector_weights = cfg.detector_weights.normalized();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), FraudError> {
        if self.trust_score_warn_threshold > self.trust_score_allow_threshold {
            return Err(FraudError::ConfigurationError(
                "trust_score_warn_threshold must be <= trust_score_allow_threshold".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.hard_rule_threshold) {
            return Err(FraudError::ConfigurationError(
                "hard_rule_threshold must be in [0,1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Atomically-swappable handle to the live [`ScoringConfig`].
///
/// Readers in the hot path call [`ConfigHandle::current`] and observe either
/// the old or the new version consistently for the duration of their
/// request; there is no lock and no torn read.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<ScoringConfig>>,
}

impl ConfigHandle {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    pub fn current(&self) -> Arc<ScoringConfig> {
        self.inner.load_full()
    }

    pub fn replace(&self, config: ScoringConfig) {
        self.inner.store(Arc::new(config));
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((DetectorWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unnormalized_weights_are_rescaled() {
        let weights = DetectorWeights {
            phishing: 1.0,
            quishing: 1.0,
            collect: 1.0,
            malware: 1.0,
        };
        let normalized = weights.normalized();
        assert!((normalized.sum() - 1.0).abs() < 1e-9);
        assert!((normalized.phishing - 0.25).abs() < 1e-9);
    }

    #[test]
    fn config_handle_hot_swap_is_visible_to_new_reads() {
        let handle = ConfigHandle::default();
        assert_eq!(handle.current().trust_score_allow_threshold, 65);
        let mut updated = ScoringConfig::default();
        updated.trust_score_allow_threshold = 70;
        handle.replace(updated);
        assert_eq!(handle.current().trust_score_allow_threshold, 70);
    }

    #[test]
    fn rejects_warn_threshold_above_allow_threshold() {
        let mut cfg = ScoringConfig::default();
        cfg.trust_score_warn_threshold = 90;
        assert!(cfg.validate().is_err());
    }
}
