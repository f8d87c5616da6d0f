//! SQLite-backed implementation of the action queue port.
//!
//! Queue records move `pending → failed` on execution error and are deleted
//! on success, on dismissal, or when the retry ceiling is reached. Drain
//! order is creation time ascending with rowid as the tie-breaker, so two
//! actions created within the same clock second still replay in insertion
//! order.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use petsafe_core::ActionQueue;
use petsafe_domain::{
    ActionPayload, ActionStatus, PetSafeError, QueuedAction, Result, MAX_ACTION_RETRIES,
};
use rusqlite::{params, Row};
use tokio::task;
use tracing::{debug, warn};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};
use crate::errors::InfraError;

/// SQLite-backed action queue repository.
pub struct SqliteActionQueue {
    db: Arc<DbManager>,
}

impl SqliteActionQueue {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActionQueue for SqliteActionQueue {
    async fn queue_action(&self, payload: &ActionPayload) -> Result<String> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| PetSafeError::from(InfraError::from(e)))?;
        let kind = payload.kind().to_string();
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();

        let db = Arc::clone(&self.db);
        let action_id = id.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO action_queue (id, kind, payload_json, status, retry_count, created_at)
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4)",
                params![action_id, kind, payload_json, created_at],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)??;

        debug!(action_id = %id, kind = payload.kind(), "action queued");
        Ok(id)
    }

    async fn fetch_pending(&self) -> Result<Vec<QueuedAction>> {
        self.fetch_by_status(ActionStatus::Pending).await
    }

    async fn fetch_failed(&self) -> Result<Vec<QueuedAction>> {
        self.fetch_by_status(ActionStatus::Failed).await
    }

    async fn fetch_due(&self) -> Result<Vec<QueuedAction>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<QueuedAction>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, kind, payload_json, status, retry_count, last_error, created_at
                     FROM action_queue
                     WHERE status = 'pending'
                        OR (status = 'failed' AND retry_count > 0)
                     ORDER BY created_at ASC, rowid ASC",
                )
                .map_err(map_sql_error)?;

            let rows = stmt
                .query_map([], map_action_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn complete_action(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            // Idempotent: zero rows affected is a successful no-op.
            conn.execute("DELETE FROM action_queue WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fail_action(&self, id: &str, error: &str, increment_retry: bool) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let error = truncate_error(error);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            let current: i32 = tx
                .query_row(
                    "SELECT retry_count FROM action_queue WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        PetSafeError::NotFound(format!("queued action {id} not found"))
                    }
                    other => map_sql_error(other),
                })?;

            let retry_count = if increment_retry { current + 1 } else { current };

            if increment_retry && retry_count >= MAX_ACTION_RETRIES {
                tx.execute("DELETE FROM action_queue WHERE id = ?1", params![id])
                    .map_err(map_sql_error)?;
                warn!(
                    action_id = %id,
                    retries = retry_count,
                    "action dropped after exhausting retries"
                );
            } else {
                tx.execute(
                    "UPDATE action_queue
                     SET status = 'failed', retry_count = ?1, last_error = ?2
                     WHERE id = ?3",
                    params![retry_count, error, id],
                )
                .map_err(map_sql_error)?;
            }

            tx.commit().map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn retry_action(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE action_queue SET status = 'pending', last_error = NULL
                 WHERE id = ?1 AND status = 'failed'",
                params![id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn retry_all_failed(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE action_queue SET status = 'pending', last_error = NULL
                     WHERE status = 'failed'",
                    [],
                )
                .map_err(map_sql_error)?;
            Ok(changed)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn dismiss_action(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            // Idempotent, like complete_action.
            conn.execute(
                "DELETE FROM action_queue WHERE id = ?1 AND status = 'failed'",
                params![id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn dismiss_all_failed(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let deleted = conn
                .execute("DELETE FROM action_queue WHERE status = 'failed'", [])
                .map_err(map_sql_error)?;
            Ok(deleted)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM action_queue WHERE status = 'pending'",
                    [],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
        .map_err(map_join_error)?
    }
}

impl SqliteActionQueue {
    async fn fetch_by_status(&self, status: ActionStatus) -> Result<Vec<QueuedAction>> {
        let db = Arc::clone(&self.db);
        let status = status.to_string();

        task::spawn_blocking(move || -> Result<Vec<QueuedAction>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, kind, payload_json, status, retry_count, last_error, created_at
                     FROM action_queue
                     WHERE status = ?1
                     ORDER BY created_at ASC, rowid ASC",
                )
                .map_err(map_sql_error)?;

            let rows = stmt
                .query_map(params![status], map_action_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;

            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_action_row(row: &Row<'_>) -> rusqlite::Result<QueuedAction> {
    let id: String = row.get(0)?;
    let status_raw: String = row.get(3)?;
    let status = parse_status(&id, &status_raw);
    let created_at: i64 = row.get(6)?;

    Ok(QueuedAction {
        id,
        kind: row.get(1)?,
        payload_json: row.get(2)?,
        status,
        retry_count: row.get(4)?,
        last_error: row.get(5)?,
        created_at: Utc.timestamp_opt(created_at, 0).single().unwrap_or_else(Utc::now),
    })
}

fn parse_status(id: &str, raw: &str) -> ActionStatus {
    match ActionStatus::from_str(raw) {
        Ok(status) => status,
        Err(err) => {
            warn!(
                action_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid action status in store – defaulting to pending"
            );
            ActionStatus::Pending
        }
    }
}

fn truncate_error(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn map_join_error(err: task::JoinError) -> PetSafeError {
    if err.is_cancelled() {
        PetSafeError::Internal("store task cancelled".into())
    } else {
        PetSafeError::Internal(format!("store task panic: {err}"))
    }
}
