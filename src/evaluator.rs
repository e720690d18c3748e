use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::batch;
use crate::cache::{cache_key, RiskCache, RISK_RESULT_TTL};
use crate::db;
use crate::metrics;
use crate::risk::{self, RiskResult};
use crate::windows::WeekWindows;

#[derive(Debug, Clone, Copy)]
pub struct EvaluateOptions {
    pub record_history: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            record_history: true,
        }
    }
}

/// Orchestrates one student's evaluation: cache, concurrent extractors, the
/// shared scorer, and the best-effort audit write. Constructed per process
/// lifecycle; the cache it owns is the process-wide one.
#[derive(Clone)]
pub struct RiskEvaluator {
    pool: PgPool,
    cache: Arc<RiskCache>,
}

impl RiskEvaluator {
    pub fn new(pool: PgPool) -> Self {
        Self::with_cache(pool, Arc::new(RiskCache::new(RISK_RESULT_TTL)))
    }

    pub fn with_cache(pool: PgPool, cache: Arc<RiskCache>) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &Arc<RiskCache> {
        &self.cache
    }

    pub async fn evaluate(&self, student_id: Uuid) -> RiskResult {
        self.evaluate_with(student_id, EvaluateOptions::default()).await
    }

    /// Always yields a result: a metric whose source fails degrades to its
    /// zero values rather than failing the evaluation. A cache hit is not a
    /// new evaluation and records no history.
    pub async fn evaluate_with(&self, student_id: Uuid, options: EvaluateOptions) -> RiskResult {
        let key = cache_key(student_id);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(%student_id, "weekly risk cache hit");
            return hit;
        }

        let windows = WeekWindows::for_today(Utc::now().date_naive());
        let bundle = metrics::collect_all(&self.pool, student_id, &windows).await;
        let result = risk::score_metrics(&bundle, student_id);
        self.cache.set(&key, result.clone());

        if options.record_history {
            let pool = self.pool.clone();
            let audit = result.clone();
            tokio::spawn(async move {
                if let Err(err) = db::record_evaluation(&pool, &audit).await {
                    tracing::warn!(
                        student_id = %audit.student_id,
                        error = %err,
                        "failed to record risk evaluation history"
                    );
                }
            });
        }

        result
    }

    /// Reporting sweep over many students with a fixed number of bulk
    /// queries. Does not consult or fill the cache and records no history.
    pub async fn evaluate_batch(&self, student_ids: &[Uuid]) -> Vec<RiskResult> {
        batch::evaluate_batch(&self.pool, student_ids).await
    }
}
