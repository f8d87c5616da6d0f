//! Port interfaces for the offline store
//!
//! The store is the only component permitted to touch durable storage; every
//! mutation from the sync layer or the UI is funnelled through these traits.

use async_trait::async_trait;
use petsafe_domain::{ActionPayload, Alert, Pet, QueuedAction, Result, SuccessStory};

/// Durable FIFO queue of locally-originated mutations awaiting remote
/// execution.
#[async_trait]
pub trait ActionQueue: Send + Sync {
    /// Persist a new action with status `pending` and a zero retry count.
    ///
    /// Returns the generated action id. Payload serialization failure is a
    /// hard error to the caller, never a silent drop.
    async fn queue_action(&self, payload: &ActionPayload) -> Result<String>;

    /// All `pending` actions ordered by creation time ascending. Creation
    /// time ties are broken by insertion order, so a drain pass always sees
    /// strict FIFO order.
    async fn fetch_pending(&self) -> Result<Vec<QueuedAction>>;

    /// The drain set: `pending` actions plus transiently-failed actions
    /// (retry count above zero, still under the ceiling), in the same FIFO
    /// order. Failed actions with a zero retry count are permanent local
    /// errors and are excluded: re-running them cannot change the
    /// outcome, so they wait for an explicit retry or dismissal.
    async fn fetch_due(&self) -> Result<Vec<QueuedAction>>;

    /// All `failed` actions ordered by creation time ascending.
    async fn fetch_failed(&self) -> Result<Vec<QueuedAction>>;

    /// Delete the action record after successful remote execution.
    /// Idempotent: completing a missing id is a no-op.
    async fn complete_action(&self, id: &str) -> Result<()>;

    /// Record a failure on the action. Increments the retry count unless
    /// `increment_retry` is false; deletes the record outright when the
    /// count reaches the retry ceiling, otherwise marks it `failed` with
    /// the error message.
    async fn fail_action(&self, id: &str, error: &str, increment_retry: bool) -> Result<()>;

    /// Reset a failed action back to `pending`, clearing the error, so the
    /// next drain pass picks it up again.
    async fn retry_action(&self, id: &str) -> Result<()>;

    /// Re-admit every failed action to the next drain pass.
    async fn retry_all_failed(&self) -> Result<usize>;

    /// Permanently delete a failed action the user chose not to retry.
    async fn dismiss_action(&self, id: &str) -> Result<()>;

    /// Permanently delete all failed actions.
    async fn dismiss_all_failed(&self) -> Result<usize>;

    /// Number of `pending` actions currently queued.
    async fn pending_count(&self) -> Result<usize>;
}

/// Cached snapshots of server-owned entities, keyed by the server-assigned
/// identifier. The cache is never the source of truth: a successful remote
/// fetch overwrites it wholesale.
#[async_trait]
pub trait EntityCache: Send + Sync {
    /// Upsert a pet snapshot, overwriting all mirrored fields and stamping
    /// `last_synced_at`.
    async fn save_pet(&self, pet: &Pet) -> Result<()>;

    /// Bulk upsert from an authoritative remote fetch.
    async fn save_pets(&self, pets: &[Pet]) -> Result<()>;

    /// Upsert an alert snapshot.
    async fn save_alert(&self, alert: &Alert) -> Result<()>;

    /// Bulk upsert from an authoritative remote fetch.
    async fn save_alerts(&self, alerts: &[Alert]) -> Result<()>;

    /// Upsert a success story snapshot.
    async fn save_story(&self, story: &SuccessStory) -> Result<()>;

    /// Pets, optionally filtered by owner, sorted by name ascending.
    async fn fetch_pets(&self, owner_id: Option<&str>) -> Result<Vec<Pet>>;

    /// A single pet by id.
    async fn fetch_pet(&self, id: &str) -> Result<Option<Pet>>;

    /// Alerts, optionally filtered by pet and/or active flag, newest first.
    async fn fetch_alerts(&self, pet_id: Option<&str>, active_only: bool) -> Result<Vec<Alert>>;

    /// Success stories, newest first. With `public_confirmed_only` set,
    /// returns only stories that are both public and confirmed.
    async fn fetch_stories(&self, public_confirmed_only: bool) -> Result<Vec<SuccessStory>>;

    /// Delete a cached pet snapshot.
    async fn delete_pet(&self, id: &str) -> Result<()>;

    /// Delete a cached alert snapshot (used to drop local-only
    /// placeholders once the remote alert exists).
    async fn delete_alert(&self, id: &str) -> Result<()>;

    /// Wipe all cached entities and the action queue in one transaction.
    /// Used at logout; all-or-nothing so a failure cannot leave a partial
    /// logout state.
    async fn clear_all(&self) -> Result<()>;
}
