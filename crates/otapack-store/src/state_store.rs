use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use otapack_core::{VersionState, STATE_SCHEMA_VERSION};
use thiserror::Error;
use tracing::warn;

use crate::layout::UpdateLayout;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize version state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable home of the [`VersionState`] record.
///
/// Writes go to a temp file followed by an atomic rename, so a reader never
/// observes a torn record. All read-modify-write cycles serialize through
/// the in-process lock; concurrent writers (watchdog vs. background sync)
/// queue here.
#[derive(Debug)]
pub struct StateStore {
    layout: UpdateLayout,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(layout: UpdateLayout) -> Self {
        Self {
            layout,
            lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &UpdateLayout {
        &self.layout
    }

    /// Loads the persisted record. Missing, unreadable, unparseable, and
    /// wrong-schema-version records all degrade to the empty default: a
    /// broken state record must never block boot.
    pub fn load(&self) -> VersionState {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.load_unlocked()
    }

    /// Persists `state`, retrying once on failure before surfacing the
    /// error.
    pub fn save(&self, state: &VersionState) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.save_unlocked(state)
    }

    /// Read-modify-write under the store lock. The durable write completes
    /// before this returns, which is what lets callers order a restart
    /// strictly after the persisted transition.
    pub fn update<F>(&self, mutate: F) -> Result<VersionState, StoreError>
    where
        F: FnOnce(&mut VersionState),
    {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut state = self.load_unlocked();
        mutate(&mut state);
        state.schema_version = STATE_SCHEMA_VERSION;
        self.save_unlocked(&state)?;
        Ok(state)
    }

    fn load_unlocked(&self) -> VersionState {
        let path = self.layout.state_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return VersionState::default();
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "state record unreadable, treating as empty");
                return VersionState::default();
            }
        };

        match serde_json::from_str::<VersionState>(&raw) {
            Ok(state) if state.schema_version == STATE_SCHEMA_VERSION => state,
            Ok(state) => {
                warn!(
                    path = %path.display(),
                    schema_version = state.schema_version,
                    "unsupported state schema version, treating as empty"
                );
                VersionState::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "state record corrupt, treating as empty");
                VersionState::default()
            }
        }
    }

    fn save_unlocked(&self, state: &VersionState) -> Result<(), StoreError> {
        match self.write_record(state) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "state save failed, retrying once");
                self.write_record(state)
            }
        }
    }

    fn write_record(&self, state: &VersionState) -> Result<(), StoreError> {
        let root = self.layout.root().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io { path: root, source })?;

        let payload = serde_json::to_string_pretty(state)?;
        let tmp_path = self.layout.state_tmp_path();
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;

        let final_path = self.layout.state_path();
        fs::rename(&tmp_path, &final_path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: final_path.clone(),
                source,
            }
        })
    }
}
