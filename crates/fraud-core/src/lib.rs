//! Pre-transaction fraud screening core: feature extraction, detectors,
//! trust-score aggregation, explanation, human-in-the-loop routing, and
//! review/feedback storage.

#![deny(unsafe_code)]

pub mod aggregation;
pub mod config;
pub mod coordinator;
pub mod detectors;
pub mod error;
pub mod explain;
pub mod features;
pub mod hitl;
pub mod model;
pub mod rules;
pub mod storage;
pub mod types;

pub use config::{ConfigHandle, DetectorWeights, ScoringConfig};
pub use coordinator::ScoringCoordinator;
pub use detectors::{CollectDetector, Detector, MalwareDetector, PhishingDetector, QuishingDetector};
pub use error::FraudError;
pub use model::{LogisticRegressionScorer, ModelLoader, ModelScorer, NullModelLoader, RuleOnlyScorer};
pub use storage::{build_store, InMemoryReviewStore, PostgresReviewStore, ReviewStore, StorageConfig};
pub use types::{
    Action, AnalystDecision, ConfidenceTier, Decision, DetectorId, DevicePosture, Explanation,
    FeatureImportance, FeedbackRecord, HitlVerdict, Priority, ReviewQueueEntry, RiskLevel,
    ScoringResponse, Subscore, TransactionRequest, TransactionType,
};
