//! File-backed settings store.
//!
//! Holds the single scalar the sync core persists outside the database: the
//! timestamp of the last successful full sync. Saves go through a temp file
//! and an atomic rename so a crash mid-write cannot corrupt the file.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use petsafe_domain::{PetSafeError, Result};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Settings {
    last_sync_at: Option<DateTime<Utc>>,
}

/// Key-value settings persisted next to the database.
pub struct SettingsStore {
    path: PathBuf,
    state: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from the given path. A missing file yields defaults;
    /// a corrupt file is logged and replaced with defaults on next save.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "settings file corrupt, using defaults");
                    Settings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(err) => {
                return Err(PetSafeError::Config(format!(
                    "failed to read settings {}: {err}",
                    path.display()
                )))
            }
        };

        Ok(Self { path, state: RwLock::new(state) })
    }

    /// Timestamp of the last successful full sync, if any.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().ok().and_then(|s| s.last_sync_at)
    }

    /// Persist a new last-sync timestamp.
    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<()> {
        let snapshot = {
            let mut state = self
                .state
                .write()
                .map_err(|e| PetSafeError::Internal(format!("settings lock poisoned: {e}")))?;
            state.last_sync_at = Some(at);
            state.clone()
        };

        let path = self.path.clone();
        task::spawn_blocking(move || write_atomically(&path, &snapshot))
            .await
            .map_err(|e| PetSafeError::Internal(format!("settings task panic: {e}")))?
    }
}

fn write_atomically(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PetSafeError::Internal(format!("settings serialization failed: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| {
        PetSafeError::Config(format!("failed to write settings {}: {e}", tmp.display()))
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        PetSafeError::Config(format!("failed to replace settings {}: {e}", path.display()))
    })?;

    Ok(())
}
