//! Sync orchestrator: queue drain, cache refresh, auto-sync lifecycle.
//!
//! One orchestrator instance exists per process. It accepts queued
//! mutations, drains them against the remote API in strict FIFO order when
//! connectivity allows, refreshes the local cache from the authoritative
//! remote lists, and publishes a single coherent [`SyncStatus`] to
//! observers. Only one sync pass runs at a time; a request arriving while a
//! pass is in flight is dropped and reported as such.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use petsafe_core::{ActionQueue, ConnectivityMonitor, EntityCache};
use petsafe_domain::{
    ActionPayload, PetSafeError, QueuedAction, Result, SyncStatus, AUTO_SYNC_INTERVAL,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::errors::ActionError;
use crate::api::RemoteApi;
use crate::settings::SettingsStore;

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOrchestratorConfig {
    /// Interval between automatic sync passes.
    pub auto_sync_interval: Duration,
    /// Join timeout when stopping background tasks.
    pub join_timeout: Duration,
}

impl Default for SyncOrchestratorConfig {
    fn default() -> Self {
        Self { auto_sync_interval: AUTO_SYNC_INTERVAL, join_timeout: Duration::from_secs(5) }
    }
}

/// Result of one requested sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The pass ran to completion.
    Completed {
        /// Actions successfully executed and removed from the queue.
        drained: usize,
        /// Actions marked failed during this pass.
        failed: usize,
    },
    /// Dropped: the device is offline.
    Offline,
    /// Dropped: another pass is already in flight.
    AlreadyRunning,
    /// The stored credential was rejected; the user must re-authenticate.
    AuthRequired,
    /// The pass failed; queue bookkeeping from the drain step is kept.
    Failed(String),
}

/// Shared state for the orchestrator and its background tasks.
struct SyncContext {
    queue: Arc<dyn ActionQueue>,
    cache: Arc<dyn EntityCache>,
    api: Arc<dyn RemoteApi>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    settings: Arc<SettingsStore>,
    status_tx: watch::Sender<SyncStatus>,
    in_flight: AtomicBool,
}

struct DrainSummary {
    drained: usize,
    failed: usize,
    auth_error: Option<String>,
}

impl SyncContext {
    fn publish<F: FnOnce(&mut SyncStatus)>(&self, update: F) {
        self.status_tx.send_modify(update);
    }

    async fn refresh_pending_count(&self) {
        match self.queue.pending_count().await {
            Ok(count) => self.publish(|s| s.pending_actions = count),
            Err(err) => warn!(error = %err, "failed to refresh pending action count"),
        }
    }

    /// Run one guarded sync pass.
    async fn perform_full_sync(&self) -> SyncOutcome {
        if !self.connectivity.current().online {
            debug!("sync requested while offline, dropping");
            return SyncOutcome::Offline;
        }

        // Checked-and-set guard: all entry points funnel through here, so a
        // plain atomic is enough to keep passes from overlapping.
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("sync already in flight, dropping request");
            return SyncOutcome::AlreadyRunning;
        }

        self.publish(|s| {
            s.is_syncing = true;
            s.message = "Syncing...".to_string();
        });

        let outcome = self.run_sync_pass().await;

        self.refresh_pending_count().await;
        self.publish(|s| {
            s.is_syncing = false;
            match &outcome {
                SyncOutcome::Completed { drained, failed } => {
                    s.last_sync_at = self.settings.last_sync_at();
                    s.message = if *failed > 0 {
                        format!("Synced ({drained} applied, {failed} failed)")
                    } else {
                        "Synced".to_string()
                    };
                }
                SyncOutcome::AuthRequired => {
                    s.message = "Sync failed: re-authentication required".to_string();
                }
                SyncOutcome::Failed(reason) => {
                    s.message = format!("Sync failed: {reason}");
                }
                SyncOutcome::Offline | SyncOutcome::AlreadyRunning => {}
            }
        });

        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_sync_pass(&self) -> SyncOutcome {
        // Step 1: drain the action queue. Per-action failures are recorded
        // on the action and never abort the loop; only store I/O failures
        // and credential rejection do.
        let summary = match self.drain_queue().await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, "queue drain failed");
                return SyncOutcome::Failed(err.to_string());
            }
        };

        if let Some(reason) = summary.auth_error {
            warn!(reason = %reason, "drain aborted, credential rejected");
            return SyncOutcome::AuthRequired;
        }

        // Step 2: overwrite the cache from the authoritative remote lists.
        // A failure here fails the pass; the drain bookkeeping above is
        // already durable and feeds the next attempt.
        if let Err(err) = self.refresh_cache().await {
            error!(error = %err, "cache refresh failed");
            return SyncOutcome::Failed(err);
        }

        // Step 3: stamp the sync time.
        if let Err(err) = self.settings.set_last_sync_at(Utc::now()).await {
            error!(error = %err, "failed to persist last sync time");
            return SyncOutcome::Failed(err.to_string());
        }

        info!(drained = summary.drained, failed = summary.failed, "sync pass complete");
        SyncOutcome::Completed { drained: summary.drained, failed: summary.failed }
    }

    async fn drain_queue(&self) -> Result<DrainSummary> {
        let pending = self.queue.fetch_due().await?;
        if pending.is_empty() {
            debug!("no pending actions to drain");
            return Ok(DrainSummary { drained: 0, failed: 0, auth_error: None });
        }

        info!(count = pending.len(), "draining action queue");

        let mut drained = 0_usize;
        let mut failed = 0_usize;

        for action in pending {
            match self.process_action(&action).await {
                Ok(()) => {
                    self.queue.complete_action(&action.id).await?;
                    drained += 1;
                }
                Err(ActionError::Auth(reason)) => {
                    // Leave this and all later actions pending; they would
                    // all fail the same way until re-authentication.
                    return Ok(DrainSummary { drained, failed, auth_error: Some(reason) });
                }
                Err(ActionError::Transient(reason)) => {
                    warn!(action_id = %action.id, kind = %action.kind, error = %reason, "action failed");
                    self.queue.fail_action(&action.id, &reason, true).await?;
                    failed += 1;
                }
                Err(ActionError::Permanent(reason)) => {
                    warn!(
                        action_id = %action.id,
                        kind = %action.kind,
                        error = %reason,
                        "action failed permanently"
                    );
                    self.queue.fail_action(&action.id, &reason, false).await?;
                    failed += 1;
                }
            }
        }

        Ok(DrainSummary { drained, failed, auth_error: None })
    }

    /// Map one queued action onto its remote call and apply the result to
    /// the cache optimistically.
    async fn process_action(&self, action: &QueuedAction) -> std::result::Result<(), ActionError> {
        let payload = action
            .payload()
            .map_err(|e| ActionError::Permanent(format!("undecodable action payload: {e}")))?;

        debug!(action_id = %action.id, kind = payload.kind(), "executing queued action");

        match payload {
            ActionPayload::MarkPetLost { pet_id, message, latitude, longitude, address } => {
                let request = ActionPayload::missing_pet_alert(
                    pet_id.clone(),
                    message,
                    latitude,
                    longitude,
                    address,
                );
                let alert = self.api.create_alert(&request).await?;
                self.apply_to_cache(self.cache.save_alert(&alert).await);
                if let Some(mut pet) = self.fetch_cached_pet(&pet_id).await {
                    pet.is_missing = true;
                    self.apply_to_cache(self.cache.save_pet(&pet).await);
                }
            }
            ActionPayload::MarkPetFound { pet_id } => {
                let pet = self.api.mark_pet_found(&pet_id).await?;
                self.apply_to_cache(self.cache.save_pet(&pet).await);
            }
            ActionPayload::ReportSighting { alert_id, request } => {
                self.api.report_sighting(&alert_id, &request).await?;
            }
            ActionPayload::CreateAlert { request, placeholder_alert_id } => {
                let alert = self.api.create_alert(&request).await?;
                self.apply_to_cache(self.cache.save_alert(&alert).await);
                if let Some(placeholder) = placeholder_alert_id {
                    self.apply_to_cache(self.cache.delete_alert(&placeholder).await);
                }
            }
            ActionPayload::UpdatePet { pet_id, update } => {
                let pet = self.api.update_pet(&pet_id, &update).await?;
                self.apply_to_cache(self.cache.save_pet(&pet).await);
            }
        }

        Ok(())
    }

    /// Optimistic cache application after a successful remote call. The
    /// remote mutation already happened, so a cache write failure must not
    /// fail the action; the next full fetch overwrites the cache anyway.
    fn apply_to_cache(&self, result: Result<()>) {
        if let Err(err) = result {
            warn!(error = %err, "optimistic cache update failed");
        }
    }

    async fn fetch_cached_pet(&self, pet_id: &str) -> Option<petsafe_domain::Pet> {
        match self.cache.fetch_pet(pet_id).await {
            Ok(pet) => pet,
            Err(err) => {
                warn!(pet_id, error = %err, "cached pet lookup failed");
                None
            }
        }
    }

    async fn refresh_cache(&self) -> std::result::Result<(), String> {
        let pets = self.api.get_pets().await.map_err(|e| e.to_string())?;
        self.cache.save_pets(&pets).await.map_err(|e| e.to_string())?;

        let alerts = self.api.get_alerts().await.map_err(|e| e.to_string())?;
        self.cache.save_alerts(&alerts).await.map_err(|e| e.to_string())?;

        debug!(pets = pets.len(), alerts = alerts.len(), "cache refreshed from remote");
        Ok(())
    }
}

/// Sync orchestrator with explicit lifecycle management.
pub struct SyncOrchestrator {
    ctx: Arc<SyncContext>,
    config: SyncOrchestratorConfig,
    cancellation: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator. The published status starts from the
    /// persisted last-sync timestamp.
    pub fn new(
        queue: Arc<dyn ActionQueue>,
        cache: Arc<dyn EntityCache>,
        api: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        settings: Arc<SettingsStore>,
        config: SyncOrchestratorConfig,
    ) -> Self {
        let initial = SyncStatus { last_sync_at: settings.last_sync_at(), ..SyncStatus::default() };
        let (status_tx, _) = watch::channel(initial);

        let ctx = Arc::new(SyncContext {
            queue,
            cache,
            api,
            connectivity,
            settings,
            status_tx,
            in_flight: AtomicBool::new(false),
        });

        Self { ctx, config, cancellation: CancellationToken::new(), task_handles: Vec::new() }
    }

    /// Watch receiver for sync status updates.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.ctx.status_tx.subscribe()
    }

    /// Current sync status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.ctx.status_tx.borrow().clone()
    }

    /// Persist a locally-originated mutation and, when online, kick off a
    /// best-effort sync pass. Returns once the action is durable, not once
    /// it is remotely applied.
    #[instrument(skip(self, payload), fields(kind = payload.kind()))]
    pub async fn queue_action(&self, payload: &ActionPayload) -> Result<String> {
        let id = self.ctx.queue.queue_action(payload).await?;
        self.ctx.refresh_pending_count().await;

        if self.ctx.connectivity.current().online {
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                let outcome = ctx.perform_full_sync().await;
                debug!(?outcome, "post-queue sync pass finished");
            });
        }

        Ok(id)
    }

    /// Run one sync pass now. Preconditions (online, not already syncing)
    /// are checked and early-return rather than queueing the request.
    pub async fn perform_full_sync(&self) -> SyncOutcome {
        self.ctx.perform_full_sync().await
    }

    /// Start the background tasks: the periodic auto-sync timer and the
    /// connectivity-restored trigger.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> std::result::Result<(), PetSafeError> {
        if self.is_running() {
            return Err(PetSafeError::InvalidInput("orchestrator already running".into()));
        }

        info!("starting sync orchestrator");
        self.cancellation = CancellationToken::new();

        let interval = self.config.auto_sync_interval;
        let ctx = Arc::clone(&self.ctx);
        let cancel = self.cancellation.clone();
        let timer_handle = tokio::spawn(async move {
            Self::auto_sync_loop(ctx, interval, cancel).await;
        });

        let ctx = Arc::clone(&self.ctx);
        let cancel = self.cancellation.clone();
        let connectivity_handle = tokio::spawn(async move {
            Self::connectivity_loop(ctx, cancel).await;
        });

        self.task_handles = vec![timer_handle, connectivity_handle];
        self.ctx.refresh_pending_count().await;

        info!("sync orchestrator started");
        Ok(())
    }

    /// Stop the background tasks and wait for them to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> std::result::Result<(), PetSafeError> {
        if !self.is_running() {
            return Err(PetSafeError::InvalidInput("orchestrator not running".into()));
        }

        info!("stopping sync orchestrator");
        self.cancellation.cancel();

        for handle in self.task_handles.drain(..) {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "orchestrator task panicked");
                    return Err(PetSafeError::Internal("orchestrator task panicked".into()));
                }
                Err(_) => {
                    warn!("orchestrator task did not stop within timeout");
                    return Err(PetSafeError::Internal("orchestrator stop timeout".into()));
                }
            }
        }

        info!("sync orchestrator stopped");
        Ok(())
    }

    /// Returns true while background tasks are active.
    pub fn is_running(&self) -> bool {
        !self.task_handles.is_empty()
    }

    /// Periodic auto-sync. Supplementary to the connectivity trigger: the
    /// pass itself checks the online and in-flight preconditions.
    async fn auto_sync_loop(ctx: Arc<SyncContext>, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("auto-sync loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let outcome = ctx.perform_full_sync().await;
                    debug!(?outcome, "auto-sync pass finished");
                }
            }
        }
    }

    /// Trigger a pass on every offline-to-online transition.
    async fn connectivity_loop(ctx: Arc<SyncContext>, cancel: CancellationToken) {
        let mut rx = ctx.connectivity.subscribe();
        let mut was_online = ctx.connectivity.current().online;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("connectivity loop cancelled");
                    break;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!("connectivity channel closed");
                        break;
                    }
                    let online = rx.borrow_and_update().online;
                    if online && !was_online {
                        info!("connectivity restored, starting sync pass");
                        let outcome = ctx.perform_full_sync().await;
                        debug!(?outcome, "connectivity-triggered pass finished");
                    }
                    was_online = online;
                }
            }
        }
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncOrchestrator dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use petsafe_domain::{
        Alert, AlertRequest, Connectivity, Pet, PetUpdate, Sighting, SightingRequest, Transport,
    };
    use tempfile::TempDir;
    use tokio::sync::Notify;

    use super::*;
    use crate::api::ApiError;
    use crate::database::{DbManager, SqliteActionQueue, SqliteEntityCache};
    use crate::network::NetworkObserver;

    fn sample_pet(id: &str, is_missing: bool) -> Pet {
        Pet {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            name: format!("pet {id}"),
            species: "dog".to_string(),
            breed: None,
            color: None,
            photo_url: None,
            qr_tag_id: None,
            is_missing,
            last_seen_latitude: None,
            last_seen_longitude: None,
            last_seen_address: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            last_synced_at: None,
        }
    }

    fn sample_alert(id: &str, pet_id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            pet_id: pet_id.to_string(),
            owner_id: "owner-1".to_string(),
            alert_type: "missing_pet".to_string(),
            message: None,
            latitude: None,
            longitude: None,
            address: None,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            last_synced_at: None,
        }
    }

    /// Scripted remote API: per-method response queues, empty queue means
    /// the default success response. Calls are logged in arrival order.
    #[derive(Default)]
    struct MockApi {
        calls: StdMutex<Vec<String>>,
        mark_found: StdMutex<VecDeque<std::result::Result<Pet, ApiError>>>,
        update_pet: StdMutex<VecDeque<std::result::Result<Pet, ApiError>>>,
        get_pets: StdMutex<VecDeque<std::result::Result<Vec<Pet>, ApiError>>>,
        get_alerts: StdMutex<VecDeque<std::result::Result<Vec<Alert>, ApiError>>>,
        fetch_gate: Option<std::sync::Arc<Notify>>,
    }

    impl MockApi {
        fn log(&self, entry: String) {
            self.calls.lock().unwrap().push(entry);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteApi for MockApi {
        async fn get_pets(&self) -> std::result::Result<Vec<Pet>, ApiError> {
            if let Some(gate) = &self.fetch_gate {
                gate.notified().await;
            }
            self.log("get_pets".to_string());
            self.get_pets.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn get_alerts(&self) -> std::result::Result<Vec<Alert>, ApiError> {
            self.log("get_alerts".to_string());
            self.get_alerts.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn create_alert(
            &self,
            request: &AlertRequest,
        ) -> std::result::Result<Alert, ApiError> {
            self.log(format!("create_alert:{}", request.pet_id));
            Ok(sample_alert("alert-remote", &request.pet_id))
        }

        async fn mark_pet_found(&self, pet_id: &str) -> std::result::Result<Pet, ApiError> {
            self.log(format!("mark_pet_found:{pet_id}"));
            self.mark_found
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(sample_pet(pet_id, false)))
        }

        async fn update_pet(
            &self,
            pet_id: &str,
            _update: &PetUpdate,
        ) -> std::result::Result<Pet, ApiError> {
            self.log(format!("update_pet:{pet_id}"));
            self.update_pet
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(sample_pet(pet_id, false)))
        }

        async fn report_sighting(
            &self,
            alert_id: &str,
            _request: &SightingRequest,
        ) -> std::result::Result<Sighting, ApiError> {
            self.log(format!("report_sighting:{alert_id}"));
            Ok(Sighting {
                id: "sighting-1".to_string(),
                alert_id: alert_id.to_string(),
                reporter_name: None,
                latitude: 52.0,
                longitude: 4.0,
                address: None,
                note: None,
                created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            })
        }
    }

    struct Fixture {
        orchestrator: SyncOrchestrator,
        queue: Arc<SqliteActionQueue>,
        cache: Arc<SqliteEntityCache>,
        api: Arc<MockApi>,
        observer: Arc<NetworkObserver>,
        _temp_dir: TempDir,
    }

    async fn setup(api: MockApi, online: bool) -> Fixture {
        setup_with_config(api, online, SyncOrchestratorConfig::default()).await
    }

    async fn setup_with_config(
        api: MockApi,
        online: bool,
        config: SyncOrchestratorConfig,
    ) -> Fixture {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 4).expect("manager");
        manager.run_migrations().expect("migrations");
        let manager = Arc::new(manager);

        let queue = Arc::new(SqliteActionQueue::new(Arc::clone(&manager)));
        let cache = Arc::new(SqliteEntityCache::new(Arc::clone(&manager)));
        let api = Arc::new(api);
        let initial = if online {
            Connectivity::online(Transport::Wifi)
        } else {
            Connectivity::OFFLINE
        };
        let observer = Arc::new(NetworkObserver::new(initial));
        let settings = Arc::new(
            SettingsStore::load(temp_dir.path().join("settings.json")).expect("settings"),
        );

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&queue) as Arc<dyn ActionQueue>,
            Arc::clone(&cache) as Arc<dyn EntityCache>,
            Arc::clone(&api) as Arc<dyn RemoteApi>,
            Arc::clone(&observer) as Arc<dyn ConnectivityMonitor>,
            settings,
            config,
        );

        Fixture { orchestrator, queue, cache, api, observer, _temp_dir: temp_dir }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drains_actions_in_fifo_order() {
        let fixture = setup(MockApi::default(), false).await;

        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p1".to_string() })
            .await
            .expect("queue succeeds");
        fixture
            .queue
            .queue_action(&ActionPayload::ReportSighting {
                alert_id: "a1".to_string(),
                request: SightingRequest {
                    latitude: 52.0,
                    longitude: 4.0,
                    address: None,
                    note: None,
                    reporter_name: None,
                },
            })
            .await
            .expect("queue succeeds");
        fixture
            .queue
            .queue_action(&ActionPayload::UpdatePet {
                pet_id: "p2".to_string(),
                update: PetUpdate::default(),
            })
            .await
            .expect("queue succeeds");

        fixture.observer.report(Connectivity::online(Transport::Wifi));
        let outcome = fixture.orchestrator.perform_full_sync().await;

        assert_eq!(outcome, SyncOutcome::Completed { drained: 3, failed: 0 });
        assert_eq!(
            fixture.api.calls(),
            [
                "mark_pet_found:p1",
                "report_sighting:a1",
                "update_pet:p2",
                "get_pets",
                "get_alerts"
            ]
        );
        assert!(fixture.queue.fetch_pending().await.expect("fetch").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_action_does_not_block_the_rest() {
        let api = MockApi::default();
        api.mark_found
            .lock()
            .unwrap()
            .push_back(Err(ApiError::Server("boom".to_string())));
        let fixture = setup(api, true).await;

        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p1".to_string() })
            .await
            .expect("queue succeeds");
        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p2".to_string() })
            .await
            .expect("queue succeeds");

        let outcome = fixture.orchestrator.perform_full_sync().await;

        assert_eq!(outcome, SyncOutcome::Completed { drained: 1, failed: 1 });

        let failed = fixture.queue.fetch_failed().await.expect("fetch");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, 1);
        assert!(failed[0].last_error.as_deref().unwrap_or_default().contains("boom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_request_is_dropped() {
        let fixture = setup(MockApi::default(), false).await;

        let outcome = fixture.orchestrator.perform_full_sync().await;

        assert_eq!(outcome, SyncOutcome::Offline);
        assert!(fixture.api.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_sync_request_is_a_no_op() {
        let gate = std::sync::Arc::new(Notify::new());
        let api = MockApi { fetch_gate: Some(std::sync::Arc::clone(&gate)), ..Default::default() };
        let fixture = setup(api, true).await;

        let ctx = Arc::clone(&fixture.orchestrator.ctx);
        let first = tokio::spawn(async move { ctx.perform_full_sync().await });

        // Give the first pass time to take the guard and block on get_pets.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = fixture.orchestrator.perform_full_sync().await;
        assert_eq!(second, SyncOutcome::AlreadyRunning);

        gate.notify_one();
        let first = first.await.expect("first pass joins");
        assert_eq!(first, SyncOutcome::Completed { drained: 0, failed: 0 });

        // Exactly one fetch cycle ran.
        assert_eq!(fixture.api.calls(), ["get_pets", "get_alerts"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_failure_fails_the_pass_but_keeps_drain_results() {
        let api = MockApi::default();
        api.get_pets
            .lock()
            .unwrap()
            .push_back(Err(ApiError::Server("backend down".to_string())));
        let fixture = setup(api, true).await;

        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p1".to_string() })
            .await
            .expect("queue succeeds");

        let outcome = fixture.orchestrator.perform_full_sync().await;

        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        let status = fixture.orchestrator.status();
        assert!(status.message.starts_with("Sync failed:"), "message: {}", status.message);
        // Step 1 completed before step 2 failed.
        assert!(fixture.queue.fetch_pending().await.expect("fetch").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auth_failure_aborts_drain_and_leaves_actions_pending() {
        let api = MockApi::default();
        api.mark_found
            .lock()
            .unwrap()
            .push_back(Err(ApiError::Auth("credential rejected".to_string())));
        let fixture = setup(api, true).await;

        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p1".to_string() })
            .await
            .expect("queue succeeds");
        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p2".to_string() })
            .await
            .expect("queue succeeds");

        let outcome = fixture.orchestrator.perform_full_sync().await;

        assert_eq!(outcome, SyncOutcome::AuthRequired);

        let pending = fixture.queue.fetch_pending().await.expect("fetch");
        assert_eq!(pending.len(), 2, "auth failure must not consume the queue");
        assert!(pending.iter().all(|a| a.retry_count == 0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_payload_fails_without_retry_budget() {
        let fixture = setup(MockApi::default(), true).await;

        // A stored envelope from a newer/older build with an unknown tag.
        let manager = DbManager::new(fixture._temp_dir.path().join("test.db"), 1).expect("db");
        let conn = manager.get_connection().expect("conn");
        conn.execute(
            "INSERT INTO action_queue (id, kind, payload_json, status, retry_count, created_at)
             VALUES ('legacy-1', 'legacy_action', '{\"type\":\"legacy_action\"}', 'pending', 0, 1700000000)",
            [],
        )
        .expect("insert");

        let outcome = fixture.orchestrator.perform_full_sync().await;
        assert_eq!(outcome, SyncOutcome::Completed { drained: 0, failed: 1 });

        let failed = fixture.queue.fetch_failed().await.expect("fetch");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, 0, "logic errors must not consume retry budget");
        assert!(fixture.api.calls().iter().all(|c| c.starts_with("get_")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_action_updates_pending_count() {
        let fixture = setup(MockApi::default(), false).await;

        fixture
            .orchestrator
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p1".to_string() })
            .await
            .expect("queue succeeds");

        assert_eq!(fixture.orchestrator.status().pending_actions, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_found_drain_updates_cached_pet() {
        let fixture = setup(MockApi::default(), true).await;

        // Cached snapshot still says the pet is missing.
        fixture.cache.save_pet(&sample_pet("p1", true)).await.expect("save");
        fixture
            .queue
            .queue_action(&ActionPayload::MarkPetFound { pet_id: "p1".to_string() })
            .await
            .expect("queue succeeds");

        let outcome = fixture.orchestrator.perform_full_sync().await;
        assert_eq!(outcome, SyncOutcome::Completed { drained: 1, failed: 0 });

        let pet = fixture.cache.fetch_pet("p1").await.expect("fetch").expect("cached");
        assert!(!pet.is_missing, "optimistic application clears the missing flag");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auto_sync_timer_runs_passes_while_online() {
        let config = SyncOrchestratorConfig {
            auto_sync_interval: Duration::from_millis(50),
            ..SyncOrchestratorConfig::default()
        };
        let mut fixture = setup_with_config(MockApi::default(), true, config).await;

        fixture.orchestrator.start().await.expect("start succeeds");

        let status_rx = fixture.orchestrator.subscribe_status();
        for _ in 0..100 {
            if status_rx.borrow().last_sync_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(
            fixture.orchestrator.status().last_sync_at.is_some(),
            "timer never triggered a pass"
        );
        assert!(fixture.api.calls().contains(&"get_pets".to_string()));

        fixture.orchestrator.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_start_stop() {
        let mut fixture = setup(MockApi::default(), false).await;

        assert!(!fixture.orchestrator.is_running());
        fixture.orchestrator.start().await.expect("start succeeds");
        assert!(fixture.orchestrator.is_running());

        assert!(fixture.orchestrator.start().await.is_err(), "double start fails");

        fixture.orchestrator.stop().await.expect("stop succeeds");
        assert!(!fixture.orchestrator.is_running());
    }
}
