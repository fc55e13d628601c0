//! Review queue and feedback store. Both the in-memory and Postgres backends
//! honor the same invariants: `transaction_id` is unique across pending
//! entries, `submit_decision` is idempotent, and a queue update plus its
//! feedback append land together or not at all.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::FraudError;
use crate::types::{AnalystDecision, FeedbackRecord, ReviewQueueEntry};

#[async_trait::async_trait]
pub trait ReviewStore: Send + Sync {
    async fn enqueue(&self, entry: ReviewQueueEntry) -> Result<ReviewQueueEntry, FraudError>;
    async fn get_by_transaction_id(&self, transaction_id: &str) -> Result<Option<ReviewQueueEntry>, FraudError>;
    async fn list_pending(&self, limit: usize) -> Result<Vec<ReviewQueueEntry>, FraudError>;
    async fn list_overdue(&self, now: chrono::DateTime<Utc>) -> Result<Vec<ReviewQueueEntry>, FraudError>;
    async fn count_pending(&self) -> Result<u64, FraudError>;
    async fn submit_decision(
        &self,
        transaction_id: &str,
        analyst_id: &str,
        decision: AnalystDecision,
        feedback_text: Option<String>,
        warn_threshold: u8,
    ) -> Result<(), FraudError>;
    async fn pending_feedback(&self, min_samples: usize) -> Result<Vec<FeedbackRecord>, FraudError>;
    async fn mark_used(&self, transaction_ids: &[String]) -> Result<(), FraudError>;
    async fn is_reachable(&self) -> bool;
}

fn correct_label(decision: AnalystDecision) -> u8 {
    matches!(decision, AnalystDecision::Reject | AnalystDecision::Escalate) as u8
}

fn model_was_correct(trust_score: u8, warn_threshold: u8, correct_label: u8) -> bool {
    (trust_score < warn_threshold) == (correct_label == 1)
}

/// Backend selector; mirrors the way persistence engine choice is kept out of
/// the core and resolved once at bootstrap.
pub enum StorageConfig {
    Memory,
    Postgres { database_url: String, max_connections: u32 },
}

pub async fn build_store(config: StorageConfig) -> Result<Box<dyn ReviewStore>, FraudError> {
    match config {
        StorageConfig::Memory => Ok(Box::new(InMemoryReviewStore::default())),
        StorageConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresReviewStore::connect(&database_url, max_connections).await?;
            Ok(Box::new(store))
        }
    }
}

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<String, ReviewQueueEntry>,
    feedback: Vec<FeedbackRecord>,
}

#[derive(Default)]
pub struct InMemoryReviewStore {
    state: Mutex<MemoryState>,
}

#[async_trait::async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn enqueue(&self, entry: ReviewQueueEntry) -> Result<ReviewQueueEntry, FraudError> {
        let mut state = self.state.lock().expect("review store mutex poisoned");
        if let Some(existing) = state.entries.get(&entry.transaction_id) {
            return Ok(existing.clone());
        }
        state.entries.insert(entry.transaction_id.clone(), entry.clone());
        Ok(entry)
    }

    async fn get_by_transaction_id(&self, transaction_id: &str) -> Result<Option<ReviewQueueEntry>, FraudError> {
        let state = self.state.lock().expect("review store mutex poisoned");
        Ok(state.entries.get(transaction_id).cloned())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<ReviewQueueEntry>, FraudError> {
        let state = self.state.lock().expect("review store mutex poisoned");
        let mut pending: Vec<ReviewQueueEntry> = state
            .entries
            .values()
            .filter(|e| !e.reviewed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_overdue(&self, now: chrono::DateTime<Utc>) -> Result<Vec<ReviewQueueEntry>, FraudError> {
        let state = self.state.lock().expect("review store mutex poisoned");
        Ok(state
            .entries
            .values()
            .filter(|e| e.is_overdue(now))
            .cloned()
            .collect())
    }

    async fn count_pending(&self) -> Result<u64, FraudError> {
        let state = self.state.lock().expect("review store mutex poisoned");
        Ok(state.entries.values().filter(|e| !e.reviewed).count() as u64)
    }

    async fn submit_decision(
        &self,
        transaction_id: &str,
        analyst_id: &str,
        decision: AnalystDecision,
        feedback_text: Option<String>,
        warn_threshold: u8,
    ) -> Result<(), FraudError> {
        let mut state = self.state.lock().expect("review store mutex poisoned");
        let entry = state
            .entries
            .get_mut(transaction_id)
            .ok_or_else(|| FraudError::NotFound(transaction_id.to_string()))?;
        if entry.reviewed {
            return Err(FraudError::AlreadyReviewed(transaction_id.to_string()));
        }
        entry.reviewed = true;
        entry.analyst_id = Some(analyst_id.to_string());
        entry.decision = Some(decision);
        entry.feedback_text = feedback_text;

        let label = correct_label(decision);
        let feedback = FeedbackRecord {
            transaction_id: transaction_id.to_string(),
            original_trust_score: entry.trust_score,
            original_subscores: entry.subscores.clone(),
            analyst_decision: decision,
            correct_label: label,
            model_was_correct: model_was_correct(entry.trust_score, warn_threshold, label),
            used_for_retraining: false,
            created_at: Utc::now(),
        };
        state.feedback.push(feedback);
        Ok(())
    }

    async fn pending_feedback(&self, min_samples: usize) -> Result<Vec<FeedbackRecord>, FraudError> {
        let state = self.state.lock().expect("review store mutex poisoned");
        let mut rows: Vec<FeedbackRecord> = state
            .feedback
            .iter()
            .filter(|f| !f.used_for_retraining)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(min_samples.saturating_mul(2));
        Ok(rows)
    }

    async fn mark_used(&self, transaction_ids: &[String]) -> Result<(), FraudError> {
        let mut state = self.state.lock().expect("review store mutex poisoned");
        for record in state.feedback.iter_mut() {
            if transaction_ids.contains(&record.transaction_id) {
                record.used_for_retraining = true;
            }
        }
        Ok(())
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

pub struct PostgresReviewStore {
    pool: PgPool,
}

impl PostgresReviewStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, FraudError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| FraudError::StorageUnavailable(e.to_string()))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), FraudError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_queue (
                id TEXT PRIMARY KEY,
                transaction_id TEXT UNIQUE NOT NULL,
                trust_score SMALLINT NOT NULL,
                priority TEXT NOT NULL,
                request_json JSONB NOT NULL,
                subscores_json JSONB NOT NULL,
                sla_deadline TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                reviewed BOOLEAN NOT NULL,
                analyst_id TEXT,
                decision TEXT,
                feedback_text TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FraudError::StorageUnavailable(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS review_queue_reviewed_idx ON review_queue (reviewed, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FraudError::StorageUnavailable(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback_log (
                id BIGSERIAL PRIMARY KEY,
                transaction_id TEXT NOT NULL,
                original_trust_score SMALLINT NOT NULL,
                original_subscores_json JSONB NOT NULL,
                analyst_decision TEXT NOT NULL,
                correct_label SMALLINT NOT NULL,
                model_was_correct BOOLEAN NOT NULL,
                used_for_retraining BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FraudError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }

    fn priority_to_str(priority: crate::types::Priority) -> &'static str {
        match priority {
            crate::types::Priority::Low => "LOW",
            crate::types::Priority::Medium => "MEDIUM",
            crate::types::Priority::High => "HIGH",
            crate::types::Priority::Critical => "CRITICAL",
        }
    }

    fn parse_priority(raw: &str) -> Result<crate::types::Priority, FraudError> {
        match raw {
            "LOW" => Ok(crate::types::Priority::Low),
            "MEDIUM" => Ok(crate::types::Priority::Medium),
            "HIGH" => Ok(crate::types::Priority::High),
            "CRITICAL" => Ok(crate::types::Priority::Critical),
            other => Err(FraudError::Serialization(format!("unknown priority '{other}'"))),
        }
    }

    fn decision_to_str(decision: AnalystDecision) -> &'static str {
        match decision {
            AnalystDecision::Approve => "APPROVE",
            AnalystDecision::Reject => "REJECT",
            AnalystDecision::Escalate => "ESCALATE",
        }
    }

    fn parse_decision(raw: &str) -> Result<AnalystDecision, FraudError> {
        match raw {
            "APPROVE" => Ok(AnalystDecision::Approve),
            "REJECT" => Ok(AnalystDecision::Reject),
            "ESCALATE" => Ok(AnalystDecision::Escalate),
            other => Err(FraudError::Serialization(format!("unknown analyst decision '{other}'"))),
        }
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<ReviewQueueEntry, FraudError> {
        let request_json: Value = row.try_get("request_json").map_err(db_err)?;
        let subscores_json: Value = row.try_get("subscores_json").map_err(db_err)?;
        let priority_raw: String = row.try_get("priority").map_err(db_err)?;
        let decision_raw: Option<String> = row.try_get("decision").map_err(db_err)?;

        Ok(ReviewQueueEntry {
            entry_id: row.try_get("id").map_err(db_err)?,
            transaction_id: row.try_get("transaction_id").map_err(db_err)?,
            request: serde_json::from_value(request_json)
                .map_err(|e| FraudError::Serialization(e.to_string()))?,
            subscores: serde_json::from_value(subscores_json)
                .map_err(|e| FraudError::Serialization(e.to_string()))?,
            trust_score: row.try_get::<i16, _>("trust_score").map_err(db_err)? as u8,
            priority: Self::parse_priority(&priority_raw)?,
            sla_deadline: row.try_get("sla_deadline").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
            reviewed: row.try_get("reviewed").map_err(db_err)?,
            analyst_id: row.try_get("analyst_id").map_err(db_err)?,
            decision: decision_raw.map(|d| Self::parse_decision(&d)).transpose()?,
            feedback_text: row.try_get("feedback_text").map_err(db_err)?,
        })
    }
}

fn db_err(e: sqlx::Error) -> FraudError {
    FraudError::StorageTransient(e.to_string())
}

#[async_trait::async_trait]
impl ReviewStore for PostgresReviewStore {
    async fn enqueue(&self, entry: ReviewQueueEntry) -> Result<ReviewQueueEntry, FraudError> {
        if let Some(existing) = self.get_by_transaction_id(&entry.transaction_id).await? {
            return Ok(existing);
        }
        let request_json = serde_json::to_value(&entry.request)
            .map_err(|e| FraudError::Serialization(e.to_string()))?;
        let subscores_json = serde_json::to_value(&entry.subscores)
            .map_err(|e| FraudError::Serialization(e.to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO review_queue
                (id, transaction_id, trust_score, priority, request_json, subscores_json,
                 sla_deadline, created_at, reviewed, analyst_id, decision, feedback_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(&entry.entry_id)
        .bind(&entry.transaction_id)
        .bind(entry.trust_score as i16)
        .bind(Self::priority_to_str(entry.priority))
        .bind(&request_json)
        .bind(&subscores_json)
        .bind(entry.sla_deadline)
        .bind(entry.created_at)
        .bind(entry.reviewed)
        .bind(&entry.analyst_id)
        .bind(entry.decision.map(Self::decision_to_str))
        .bind(&entry.feedback_text)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if inserted.rows_affected() == 0 {
            // Lost the race to a concurrent enqueue for the same transaction_id.
            return self
                .get_by_transaction_id(&entry.transaction_id)
                .await?
                .ok_or_else(|| FraudError::StorageTransient("enqueue race left no row".to_string()));
        }
        Ok(entry)
    }

    async fn get_by_transaction_id(&self, transaction_id: &str) -> Result<Option<ReviewQueueEntry>, FraudError> {
        let row = sqlx::query("SELECT * FROM review_queue WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<ReviewQueueEntry>, FraudError> {
        let rows = sqlx::query(
            "SELECT * FROM review_queue WHERE reviewed = false ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn list_overdue(&self, now: chrono::DateTime<Utc>) -> Result<Vec<ReviewQueueEntry>, FraudError> {
        let rows = sqlx::query("SELECT * FROM review_queue WHERE reviewed = false AND sla_deadline <= $1")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn count_pending(&self) -> Result<u64, FraudError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM review_queue WHERE reviewed = false")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let count: i64 = row.try_get("n").map_err(db_err)?;
        Ok(count as u64)
    }

    async fn submit_decision(
        &self,
        transaction_id: &str,
        analyst_id: &str,
        decision: AnalystDecision,
        feedback_text: Option<String>,
        warn_threshold: u8,
    ) -> Result<(), FraudError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM review_queue WHERE transaction_id = $1 FOR UPDATE")
            .bind(transaction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let row = row.ok_or_else(|| FraudError::NotFound(transaction_id.to_string()))?;
        let entry = Self::row_to_entry(&row)?;
        if entry.reviewed {
            return Err(FraudError::AlreadyReviewed(transaction_id.to_string()));
        }

        sqlx::query(
            "UPDATE review_queue SET reviewed = true, analyst_id = $1, decision = $2, feedback_text = $3 \
             WHERE transaction_id = $4",
        )
        .bind(analyst_id)
        .bind(Self::decision_to_str(decision))
        .bind(&feedback_text)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let label = correct_label(decision);
        let subscores_json = serde_json::to_value(&entry.subscores)
            .map_err(|e| FraudError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO feedback_log
                (transaction_id, original_trust_score, original_subscores_json, analyst_decision,
                 correct_label, model_was_correct, used_for_retraining, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, false, $7)
            "#,
        )
        .bind(transaction_id)
        .bind(entry.trust_score as i16)
        .bind(&subscores_json)
        .bind(Self::decision_to_str(decision))
        .bind(label as i16)
        .bind(model_was_correct(entry.trust_score, warn_threshold, label))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn pending_feedback(&self, min_samples: usize) -> Result<Vec<FeedbackRecord>, FraudError> {
        let rows = sqlx::query(
            "SELECT * FROM feedback_log WHERE used_for_retraining = false ORDER BY created_at DESC LIMIT $1",
        )
        .bind((min_samples.saturating_mul(2)) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let subscores_json: Value = row.try_get("original_subscores_json").map_err(db_err)?;
                let decision_raw: String = row.try_get("analyst_decision").map_err(db_err)?;
                Ok(FeedbackRecord {
                    transaction_id: row.try_get("transaction_id").map_err(db_err)?,
                    original_trust_score: row.try_get::<i16, _>("original_trust_score").map_err(db_err)? as u8,
                    original_subscores: serde_json::from_value(subscores_json)
                        .map_err(|e| FraudError::Serialization(e.to_string()))?,
                    analyst_decision: Self::parse_decision(&decision_raw)?,
                    correct_label: row.try_get::<i16, _>("correct_label").map_err(db_err)? as u8,
                    model_was_correct: row.try_get("model_was_correct").map_err(db_err)?,
                    used_for_retraining: row.try_get("used_for_retraining").map_err(db_err)?,
                    created_at: row.try_get("created_at").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn mark_used(&self, transaction_ids: &[String]) -> Result<(), FraudError> {
        sqlx::query("UPDATE feedback_log SET used_for_retraining = true WHERE transaction_id = ANY($1)")
            .bind(transaction_ids)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn is_reachable(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
