//! Shared helpers for infra integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use petsafe_core::{EventHandler, Notifier};
use petsafe_domain::RealtimeEvent;
use petsafe_infra::api::{ApiError, CredentialProvider};
use petsafe_infra::database::DbManager;
use tempfile::TempDir;

/// Install a fmt subscriber so `RUST_LOG` controls test output (idempotent).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    pub temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with the schema applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");

        Self { manager: Arc::new(manager), temp_dir }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Static-token credential provider that records invalidation.
pub struct TestCredentials {
    invalidated: AtomicBool,
}

impl TestCredentials {
    pub fn new() -> Self {
        Self { invalidated: AtomicBool::new(false) }
    }

    pub fn was_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl Default for TestCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for TestCredentials {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok("test-token".to_string())
    }

    async fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }
}

/// Event handler that records every dispatched event.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<RealtimeEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<RealtimeEvent> {
        self.events.lock().expect("handler mutex poisoned").clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_event(&self, event: &RealtimeEvent) {
        self.events.lock().expect("handler mutex poisoned").push(event.clone());
    }
}

/// Notifier that records posted notifications.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) {
        self.notifications
            .lock()
            .expect("notifier mutex poisoned")
            .push((title.to_string(), body.to_string()));
    }
}
