//! Task store (spec §4.7 C7): durable task records over Postgres, with an
//! append-only log of status-code transitions alongside the primary row.

mod error;
mod row;

use chrono::Utc;
use fortune_shared::{ErrorCategory, FortuneError, FortuneResult, Task, TaskState, TaskSummary};
use row::TaskRow;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::map_sqlx_error;
use crate::row::state_as_str;

/// Postgres-backed task store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: PgPool,
}

impl TaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> FortuneResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> FortuneResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| FortuneError::Internal(format!("migration failed: {e}")))
    }

    /// Insert a brand-new, `Queued` task.
    pub async fn create(&self, task: &Task) -> FortuneResult<()> {
        let context = task
            .context
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(FortuneError::from)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, owner_id, deity_id, fortune_number, question, context, language,
                state, progress, status_code, status_message,
                submitted_at, priority, cancel_requested, retry_count, can_generate_report
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(task.id)
        .bind(&task.owner_id)
        .bind(&task.deity_id)
        .bind(task.fortune_number)
        .bind(&task.question)
        .bind(context)
        .bind(task.language.to_string())
        .bind(state_as_str(task.state))
        .bind(task.progress)
        .bind(task.status_code)
        .bind(&task.status_message)
        .bind(task.submitted_at)
        .bind(task.priority)
        .bind(task.cancel_requested)
        .bind(task.retry_count)
        .bind(task.can_generate_report)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;
        Ok(())
    }

    /// Atomically claim the next queued task, highest priority and oldest
    /// first, skipping rows another worker already has locked.
    pub async fn claim_next(&self, worker_id: &str) -> FortuneResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET state = 'processing', claimed_by = $1, started_at = now(), status_code = 1
            WHERE id = (
                SELECT id FROM tasks
                WHERE state = 'queued'
                ORDER BY priority DESC, submitted_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_next", e))?;

        row.map(Task::try_from).transpose()
    }

    /// Update progress and status for a task the caller currently owns.
    /// Progress is clamped so it can never decrease (spec §3 invariant).
    pub async fn update_progress(
        &self,
        task_id: Uuid,
        status_code: i32,
        progress: i32,
        message: Option<&str>,
    ) -> FortuneResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET progress = GREATEST(progress, $2), status_code = $3, status_message = $4
            WHERE id = $1 AND state = 'processing'
            "#,
        )
        .bind(task_id)
        .bind(progress)
        .bind(status_code)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_progress", e))?;

        if result.rows_affected() == 0 {
            return Err(FortuneError::ConflictingUpdate(format!(
                "task {task_id} is not processing"
            )));
        }

        sqlx::query(
            "INSERT INTO task_status_transitions (task_id, seq, status_code, message, recorded_at) \
             VALUES ($1, (SELECT COALESCE(MAX(seq), -1) + 1 FROM task_status_transitions WHERE task_id = $1), $2, $3, $4)",
        )
        .bind(task_id)
        .bind(status_code)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_transition", e))?;
        Ok(())
    }

    /// Mark a task `Completed` with its final response.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete(
        &self,
        task_id: Uuid,
        response_text: &str,
        response_sections: &serde_json::Value,
        confidence: Option<f64>,
        sources_used: &[String],
        processing_time_ms: i64,
        can_generate_report: bool,
    ) -> FortuneResult<()> {
        let sources_json = serde_json::to_value(sources_used).map_err(FortuneError::from)?;
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'completed', status_code = 61, progress = 100,
                response_text = $2, response_sections = $3, confidence = $4,
                sources_used = $5, processing_time_ms = $6, completed_at = now(),
                can_generate_report = $7
            WHERE id = $1 AND state = 'processing'
            "#,
        )
        .bind(task_id)
        .bind(response_text)
        .bind(response_sections)
        .bind(confidence)
        .bind(sources_json)
        .bind(processing_time_ms)
        .bind(can_generate_report)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete", e))?;

        if result.rows_affected() == 0 {
            return Err(FortuneError::ConflictingUpdate(format!(
                "task {task_id} is not processing"
            )));
        }
        Ok(())
    }

    /// Mark a task `Failed` with a classified error.
    pub async fn fail(&self, task_id: Uuid, category: ErrorCategory, message: &str) -> FortuneResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'failed', status_code = 70, error_category = $2, error_message = $3, completed_at = now()
            WHERE id = $1 AND state IN ('processing', 'queued')
            "#,
        )
        .bind(task_id)
        .bind(category.to_string())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fail", e))?;

        if result.rows_affected() == 0 {
            return Err(FortuneError::ConflictingUpdate(format!("task {task_id} already terminal")));
        }
        Ok(())
    }

    /// Owner-checked cancellation request; only sets the flag, observed by
    /// the worker at its next suspension point (spec §3 Lifecycle).
    ///
    /// Cancelling an already-terminal task is a no-op that returns success
    /// (spec §8 idempotence law); only a task that doesn't exist, or isn't
    /// owned by `owner_id`, is `NotFound`.
    pub async fn request_cancel(&self, task_id: Uuid, owner_id: &str) -> FortuneResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET cancel_requested = TRUE WHERE id = $1 AND owner_id = $2 AND state IN ('queued', 'processing')",
        )
        .bind(task_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("request_cancel", e))?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT state FROM tasks WHERE id = $1 AND owner_id = $2")
                    .bind(task_id)
                    .bind(owner_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("request_cancel_lookup", e))?;
            if exists.is_none() {
                return Err(FortuneError::NotFound(format!("no cancellable task {task_id} for this owner")));
            }
            // Row exists but wasn't queued/processing: already terminal, no-op.
        }
        Ok(())
    }

    /// Return a claimed task to `Queued`, clearing its claim. Used by the
    /// worker pool on graceful shutdown for tasks that were still in flight.
    pub async fn requeue(&self, task_id: Uuid) -> FortuneResult<()> {
        sqlx::query(
            "UPDATE tasks SET state = 'queued', claimed_by = NULL, status_code = 0, started_at = NULL \
             WHERE id = $1 AND state = 'processing'",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("requeue", e))?;
        Ok(())
    }

    pub async fn mark_cancelled(&self, task_id: Uuid) -> FortuneResult<()> {
        sqlx::query(
            "UPDATE tasks SET state = 'cancelled', status_code = 70, completed_at = now(), \
             error_category = $2, error_message = $3 WHERE id = $1",
        )
        .bind(task_id)
        .bind(ErrorCategory::Cancelled.to_string())
        .bind("cancelled")
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_cancelled", e))?;
        Ok(())
    }

    /// Owner-checked read; only the owner may see their own task.
    pub async fn get(&self, task_id: Uuid, owner_id: &str) -> FortuneResult<Task> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(task_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?
            .ok_or_else(|| FortuneError::NotFound(format!("task {task_id} not found")))?;
        Task::try_from(row)
    }

    /// Check whether the cancel flag has been set, without an ownership
    /// check - called from inside the worker that already owns the claim.
    pub async fn is_cancel_requested(&self, task_id: Uuid) -> FortuneResult<bool> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT cancel_requested FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_cancel_requested", e))?;
        Ok(flag.unwrap_or(false))
    }

    pub async fn list(&self, owner_id: &str, limit: i64, offset: i64) -> FortuneResult<Vec<TaskSummary>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE owner_id = $1 ORDER BY submitted_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.into_iter()
            .map(|row| Task::try_from(row).map(|task| TaskSummary::from(&task)))
            .collect()
    }

    /// Aggregate counts and latency percentiles over the trailing
    /// `window_hours` (spec §4.7 `stats(window_hours)`).
    pub async fn stats(&self, window_hours: i64) -> FortuneResult<TaskStoreStats> {
        let by_status: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'queued'),
                COUNT(*) FILTER (WHERE state = 'processing'),
                COUNT(*) FILTER (WHERE state = 'completed'),
                COUNT(*) FILTER (WHERE state = 'failed'),
                COUNT(*) FILTER (WHERE state = 'cancelled')
            FROM tasks
            WHERE submitted_at >= now() - ($1 || ' hours')::interval
            "#,
        )
        .bind(window_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats_by_status", e))?;

        let latency: (Option<f64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                AVG(processing_time_ms)::float8,
                PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY processing_time_ms)::float8
            FROM tasks
            WHERE state = 'completed' AND submitted_at >= now() - ($1 || ' hours')::interval
            "#,
        )
        .bind(window_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats_latency", e))?;

        let (queued, processing, completed, failed, cancelled) =
            (by_status.0 as u64, by_status.1 as u64, by_status.2 as u64, by_status.3 as u64, by_status.4 as u64);
        let terminal = completed + failed + cancelled;
        let success_rate = if terminal == 0 { 0.0 } else { completed as f64 / terminal as f64 };

        Ok(TaskStoreStats {
            queued,
            processing,
            completed,
            failed,
            cancelled,
            avg_ms: latency.0.unwrap_or(0.0),
            p95_ms: latency.1.unwrap_or(0.0),
            success_rate,
        })
    }
}

/// Aggregate counts by state plus latency percentiles, used by health
/// reporting (spec §4.7 `stats(window_hours)`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskStoreStats {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_as_str_round_trips_every_variant() {
        assert_eq!(state_as_str(TaskState::Queued), "queued");
        assert_eq!(state_as_str(TaskState::Processing), "processing");
        assert_eq!(state_as_str(TaskState::Completed), "completed");
        assert_eq!(state_as_str(TaskState::Failed), "failed");
        assert_eq!(state_as_str(TaskState::Cancelled), "cancelled");
    }

    #[test]
    fn stats_default_is_all_zero() {
        let stats = TaskStoreStats::default();
        assert_eq!(stats.queued + stats.processing + stats.completed + stats.failed + stats.cancelled, 0);
    }
}
