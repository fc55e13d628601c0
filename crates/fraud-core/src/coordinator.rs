//! Scoring coordinator: orchestrates feature extraction, detection,
//! aggregation, HITL routing, and explanation for one request. Never fails a
//! scoring request outright — detector and storage trouble degrade rather
//! than propagate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::aggregation;
use crate::config::ConfigHandle;
use crate::detectors::Detector;
use crate::error::FraudError;
use crate::explain;
use crate::hitl;
use crate::storage::ReviewStore;
use crate::types::{
    Action, ConfidenceTier, DetectorId, ReviewQueueEntry, ScoringResponse, Subscore,
    TransactionRequest,
};

fn neutral_subscore(detector: DetectorId) -> Subscore {
    Subscore {
        detector,
        probability: 0.5,
        rule_hits: vec!["timeout".to_string()],
        hard_fire: false,
        confidence: ConfidenceTier::Low,
    }
}

async fn score_with_deadline(
    detector: Arc<dyn Detector>,
    request: TransactionRequest,
    deadline_ms: u64,
) -> Subscore {
    let detector_id = detector.id();
    let request_for_task = request.clone();
    let task = tokio::task::spawn_blocking(move || detector.score(&request_for_task));
    match tokio::time::timeout(Duration::from_millis(deadline_ms), task).await {
        Ok(Ok(subscore)) => subscore,
        Ok(Err(join_error)) => {
            warn!(detector = detector_id.as_str(), error = %join_error, "detector task panicked");
            neutral_subscore(detector_id)
        }
        Err(_elapsed) => neutral_subscore(detector_id),
    }
}

pub struct ScoringCoordinator {
    detectors: Vec<Arc<dyn Detector>>,
    config: ConfigHandle,
    review_store: Arc<dyn ReviewStore>,
}

impl ScoringCoordinator {
    pub fn new(
        detectors: Vec<Arc<dyn Detector>>,
        config: ConfigHandle,
        review_store: Arc<dyn ReviewStore>,
    ) -> Self {
        Self {
            detectors,
            config,
            review_store,
        }
    }

    pub async fn is_healthy(&self) -> bool {
        let config = self.config.current();
        let detectors_ok = self
            .detectors
            .iter()
            .all(|d| d.is_ready() || config.hitl_enabled);
        detectors_ok && self.review_store.is_reachable().await
    }

    /// `score(request) -> Response`
    pub async fn score(&self, request: TransactionRequest) -> Result<ScoringResponse, FraudError> {
        request.validate()?;
        let config = self.config.current();

        let mut handles = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            let detector_id = detector.id();
            handles.push((
                detector_id,
                tokio::spawn(score_with_deadline(
                    Arc::clone(detector),
                    request.clone(),
                    config.per_detector_deadline_ms,
                )),
            ));
        }
        let subscores: Vec<Subscore> = await_all(handles).await;

        let decision = aggregation::aggregate(&subscores, &config);
        let mut action = decision.action;
        let trust_score = decision.trust_score;

        let verdict = hitl::evaluate(action, trust_score, &subscores, &request, &config);

        let mut review_id = None;
        let mut extra_reasons = Vec::new();
        if verdict.human_review_required {
            action = Action::HumanReview;
            let entry = ReviewQueueEntry {
                entry_id: Uuid::new_v4().to_string(),
                transaction_id: request.transaction_id.clone(),
                request: request.clone(),
                subscores: subscores.clone(),
                trust_score,
                priority: verdict.priority,
                sla_deadline: Utc::now() + chrono::Duration::seconds(verdict.sla_seconds as i64),
                created_at: Utc::now(),
                reviewed: false,
                analyst_id: None,
                decision: None,
                feedback_text: None,
            };
            match enqueue_with_retry(self.review_store.as_ref(), entry).await {
                Ok(persisted) => review_id = Some(persisted.entry_id),
                Err(_) => {
                    extra_reasons.push("review_enqueue_failed".to_string());
                }
            }
        }

        let explanation = explain::explain(&request, &subscores, trust_score, &config);
        let mut reasons = explanation.reasons;
        reasons.extend(extra_reasons);

        let subscore_map = subscores
            .iter()
            .map(|s| (s.detector.as_str().to_string(), s.probability))
            .collect();

        Ok(ScoringResponse {
            transaction_id: request.transaction_id,
            trust_score,
            action,
            subscores: subscore_map,
            reasons,
            risk_breakdown: explanation.risk_breakdown,
            feature_importance: explanation.feature_importance,
            risk_level: explanation.risk_level,
            review_id,
        })
    }
}

/// Each handle was produced by `tokio::spawn`, so all four detectors are
/// already running concurrently on the runtime before this function ever
/// awaits the first one; joining them in sequence here does not serialize
/// their execution, only the collection of already-in-flight results.
async fn await_all(handles: Vec<(DetectorId, tokio::task::JoinHandle<Subscore>)>) -> Vec<Subscore> {
    let mut results = Vec::with_capacity(handles.len());
    for (detector_id, handle) in handles {
        match handle.await {
            Ok(subscore) => results.push(subscore),
            Err(join_error) => {
                warn!(detector = detector_id.as_str(), error = %join_error, "detector task join failed");
                results.push(neutral_subscore(detector_id));
            }
        }
    }
    results
}

const RETRY_DELAYS_MS: [u64; 3] = [50, 200, 800];

async fn enqueue_with_retry(
    store: &dyn ReviewStore,
    entry: ReviewQueueEntry,
) -> Result<ReviewQueueEntry, FraudError> {
    let mut last_error = None;
    for delay_ms in RETRY_DELAYS_MS {
        match store.enqueue(entry.clone()).await {
            Ok(persisted) => return Ok(persisted),
            Err(FraudError::StorageTransient(detail)) => {
                last_error = Some(FraudError::StorageTransient(detail));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(other) => return Err(other),
        }
    }
    match store.enqueue(entry).await {
        Ok(persisted) => Ok(persisted),
        Err(_) => Err(FraudError::StorageUnavailable(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::detectors::{CollectDetector, MalwareDetector, PhishingDetector, QuishingDetector};
    use crate::model::RuleOnlyScorer;
    use crate::storage::InMemoryReviewStore;
    use crate::types::TransactionType;

    fn detectors() -> Vec<Arc<dyn Detector>> {
        vec![
            Arc::new(PhishingDetector::new(Arc::new(RuleOnlyScorer))),
            Arc::new(QuishingDetector::new(Arc::new(RuleOnlyScorer))),
            Arc::new(CollectDetector::new(Arc::new(RuleOnlyScorer), 50_000.0)),
            Arc::new(MalwareDetector::new(Arc::new(RuleOnlyScorer))),
        ]
    }

    fn coordinator() -> ScoringCoordinator {
        ScoringCoordinator::new(
            detectors(),
            ConfigHandle::new(ScoringConfig::default()),
            Arc::new(InMemoryReviewStore::default()),
        )
    }

    fn clean_request(transaction_id: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: transaction_id.to_string(),
            payer_vpa: "alice@bank".to_string(),
            payee_vpa: "bob@bank".to_string(),
            amount: 500.0,
            message: "Send ₹500 for lunch".to_string(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: false,
            device_posture: None,
        }
    }

    #[tokio::test]
    async fn clean_request_allows_with_no_review() {
        let coordinator = coordinator();
        let response = coordinator.score(clean_request("tx-1")).await.unwrap();
        assert_eq!(response.action, Action::Allow);
        assert!(response.trust_score >= 80);
        assert!(response.review_id.is_none());
    }

    #[tokio::test]
    async fn large_collect_from_new_payee_is_human_review_with_critical_priority() {
        let coordinator = coordinator();
        let mut request = clean_request("tx-2");
        request.transaction_type = TransactionType::Collect;
        request.amount = 75_000.0;
        request.payee_new = true;
        request.message = "prize claim".to_string();

        let response = coordinator.score(request).await.unwrap();
        assert_eq!(response.action, Action::HumanReview);
        assert!(response.review_id.is_some());

        let entry = coordinator
            .review_store
            .get_by_transaction_id("tx-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.priority, crate::types::Priority::Critical);
    }

    #[tokio::test]
    async fn scoring_same_request_twice_is_idempotent_on_enqueue() {
        let coordinator = coordinator();
        let mut request = clean_request("tx-3");
        request.transaction_type = TransactionType::Collect;
        request.amount = 75_000.0;
        request.payee_new = true;

        let first = coordinator.score(request.clone()).await.unwrap();
        let second = coordinator.score(request).await.unwrap();
        assert_eq!(first.review_id, second.review_id);
        assert_eq!(coordinator.review_store.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected() {
        let coordinator = coordinator();
        let mut request = clean_request("");
        request.amount = -1.0;
        let result = coordinator.score(request).await;
        assert!(matches!(result, Err(FraudError::InvalidRequest(_))));
    }
}
