#![deny(unsafe_code)]

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fraud_adapters::{FileSystemModelLoader, FixtureModelLoader};
use fraud_core::{
    build_store, AnalystDecision, CollectDetector, ConfigHandle, Detector, FraudError,
    MalwareDetector, ModelLoader, PhishingDetector, QuishingDetector, ReviewQueueEntry,
    ReviewStore, ScoringConfig, ScoringCoordinator, ScoringResponse, StorageConfig,
    TransactionRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub scoring: ScoringConfig,
    pub storage: ServiceStorageConfig,
    pub use_fixture_models: bool,
}

#[derive(Debug, Clone)]
pub enum ServiceStorageConfig {
    Memory,
    Postgres { database_url: String, max_connections: u32 },
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            storage: ServiceStorageConfig::Memory,
            use_fixture_models: true,
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub coordinator: Arc<ScoringCoordinator>,
    pub review_store: Arc<dyn ReviewStore>,
    pub config: ConfigHandle,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let ServiceConfig {
            scoring,
            storage,
            use_fixture_models,
        } = config;

        scoring.validate().map_err(ServiceError::Core)?;
        let config_handle = ConfigHandle::new(scoring.clone());

        let loader: Box<dyn ModelLoader> = if use_fixture_models {
            Box::new(FixtureModelLoader)
        } else {
            Box::new(FileSystemModelLoader)
        };

        let phishing_model: Arc<dyn fraud_core::ModelScorer> =
            Arc::from(loader.load(&scoring.model_dir, "phishing"));
        let quishing_model: Arc<dyn fraud_core::ModelScorer> =
            Arc::from(loader.load(&scoring.model_dir, "quishing"));
        let collect_model: Arc<dyn fraud_core::ModelScorer> =
            Arc::from(loader.load(&scoring.model_dir, "collect"));
        let malware_model: Arc<dyn fraud_core::ModelScorer> =
            Arc::from(loader.load(&scoring.model_dir, "malware"));

        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(PhishingDetector::new(phishing_model)),
            Arc::new(QuishingDetector::new(quishing_model)),
            Arc::new(CollectDetector::new(collect_model, scoring.large_amount_threshold)),
            Arc::new(MalwareDetector::new(malware_model)),
        ];

        let storage_config = match storage {
            ServiceStorageConfig::Memory => StorageConfig::Memory,
            ServiceStorageConfig::Postgres {
                database_url,
                max_connections,
            } => StorageConfig::Postgres {
                database_url,
                max_connections,
            },
        };
        let review_store: Arc<dyn ReviewStore> = Arc::from(build_store(storage_config).await.map_err(ServiceError::Core)?);

        let coordinator = ScoringCoordinator::new(detectors, config_handle.clone(), Arc::clone(&review_store));

        Ok(Self {
            coordinator: Arc::new(coordinator),
            review_store,
            config: config_handle,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/score_request", post(score_request))
        .route("/v1/review_queue", get(list_review_queue))
        .route("/v1/review_queue/:transaction_id/decision", post(submit_review))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health(State(state): State<ServiceState>) -> impl IntoResponse {
    let healthy = state.coordinator.is_healthy().await;
    let status = if healthy { "ok" } else { "degraded" };
    Json(HealthResponse {
        status,
        service: "fraud-service",
    })
}

async fn score_request(
    State(state): State<ServiceState>,
    Json(request): Json<TransactionRequest>,
) -> Result<Json<ScoringResponse>, ApiError> {
    Ok(Json(state.coordinator.score(request).await?))
}

async fn list_review_queue(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<ReviewQueueEntry>>, ApiError> {
    Ok(Json(state.review_store.list_pending(100).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitReviewRequest {
    analyst_id: String,
    decision: AnalystDecision,
    feedback_text: Option<String>,
}

async fn submit_review(
    Path(transaction_id): Path<String>,
    State(state): State<ServiceState>,
    Json(body): Json<SubmitReviewRequest>,
) -> Result<StatusCode, ApiError> {
    let warn_threshold = state.config.current().trust_score_warn_threshold;
    state
        .review_store
        .submit_decision(
            &transaction_id,
            &body.analyst_id,
            body.decision,
            body.feedback_text,
            warn_threshold,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] FraudError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] FraudError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Core(err) = self;
        match &err {
            FraudError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response()
            }
            FraudError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": message }))).into_response()
            }
            FraudError::AlreadyReviewed(message) => {
                (StatusCode::CONFLICT, Json(serde_json::json!({ "error": message }))).into_response()
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": other.to_string() })),
            )
                .into_response(),
        }
    }
}
