use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional client-observed device signals feeding the malware detector.
///
/// All fields default to benign values when the client does not supply a
/// posture bundle at all; absence is never treated as suspicious on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DevicePosture {
    #[serde(default)]
    pub installed_app_count: u32,
    #[serde(default)]
    pub suspicious_app_flag: bool,
    #[serde(default)]
    pub accessibility_service_active: bool,
    #[serde(default)]
    pub screen_overlay_active: bool,
    #[serde(default)]
    pub debugger_attached: bool,
    #[serde(default)]
    pub recent_sideload: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Pay,
    Collect,
    QrPay,
}

/// One screening event entering the pipeline. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub transaction_id: String,
    pub payer_vpa: String,
    pub payee_vpa: String,
    pub amount: f64,
    #[serde(default)]
    pub message: String,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub qr_payload: Option<String>,
    #[serde(default)]
    pub payee_new: bool,
    #[serde(default)]
    pub device_posture: Option<DevicePosture>,
}

impl TransactionRequest {
    /// Structural validation only; semantic risk judgement happens downstream.
    pub fn validate(&self) -> Result<(), crate::error::FraudError> {
        if self.transaction_id.trim().is_empty() {
            return Err(crate::error::FraudError::invalid("transaction_id must not be empty"));
        }
        if self.transaction_id.len() > 128 {
            return Err(crate::error::FraudError::invalid("transaction_id exceeds 128 chars"));
        }
        if self.amount < 0.0 {
            return Err(crate::error::FraudError::invalid("amount must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Identifies which of the four detectors produced a [`Subscore`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    Phishing,
    Quishing,
    Collect,
    Malware,
}

impl DetectorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorId::Phishing => "phishing",
            DetectorId::Quishing => "quishing",
            DetectorId::Collect => "collect",
            DetectorId::Malware => "malware",
        }
    }
}

/// One detector's verdict on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscore {
    pub detector: DetectorId,
    pub probability: f64,
    pub rule_hits: Vec<String>,
    /// Whether any rule in `rule_hits` is flagged hard in the detector's rule
    /// catalogue. Carried alongside `probability` so the aggregator can gate
    /// the hard-override on an actual hard-rule fire rather than guessing
    /// from `rule_hits.is_empty()`.
    pub hard_fire: bool,
    pub confidence: ConfidenceTier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Allow,
    Warn,
    Block,
    HumanReview,
}

/// The aggregator's verdict for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub trust_score: u8,
    pub action: Action,
    pub subscores: Vec<Subscore>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalystDecision {
    Approve,
    Reject,
    Escalate,
}

/// A pending (or resolved) human review, persisted by the review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueEntry {
    pub entry_id: String,
    pub transaction_id: String,
    pub request: TransactionRequest,
    pub subscores: Vec<Subscore>,
    pub trust_score: u8,
    pub priority: Priority,
    pub sla_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reviewed: bool,
    pub analyst_id: Option<String>,
    pub decision: Option<AnalystDecision>,
    pub feedback_text: Option<String>,
}

impl ReviewQueueEntry {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.reviewed && now >= self.sla_deadline
    }
}

/// One labeled example derived from an analyst verdict, staged for retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub transaction_id: String,
    pub original_trust_score: u8,
    pub original_subscores: Vec<Subscore>,
    pub analyst_decision: AnalystDecision,
    pub correct_label: u8,
    pub model_was_correct: bool,
    pub used_for_retraining: bool,
    pub created_at: DateTime<Utc>,
}

/// Ranked human-facing explanation of a [`Decision`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub reasons: Vec<String>,
    pub risk_breakdown: BTreeMap<String, f64>,
    pub feature_importance: Vec<FeatureImportance>,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    #[serde(rename = "LOW-MEDIUM")]
    LowMedium,
    Medium,
    High,
    Critical,
}

/// Outcome of the HITL eligibility check for one decision.
#[derive(Debug, Clone, Copy)]
pub struct HitlVerdict {
    pub human_review_required: bool,
    pub priority: Priority,
    pub sla_seconds: u64,
}

/// Full response returned by the scoring coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub transaction_id: String,
    pub trust_score: u8,
    pub action: Action,
    pub subscores: BTreeMap<String, f64>,
    pub reasons: Vec<String>,
    pub risk_breakdown: BTreeMap<String, f64>,
    pub feature_importance: Vec<FeatureImportance>,
    pub risk_level: RiskLevel,
    pub review_id: Option<String>,
}
