use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use anyhow::{anyhow, Context};
use otapack_core::{
    CheckForUpdateRequest, InstallMode, PackageInfo, ReleaseStatus, ReportStatusRequest,
    SyncOptions, SyncStatus, UpdatePackage, UpdatePatch, VersionState,
};
use otapack_patch::{apply_patch, PatchManifest};
use otapack_store::{PackageStore, StateMachine, UpdateLayout};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::ArchiveCodec;
use crate::background::BackgroundTasks;
use crate::config::EngineConfig;
use crate::restart::Restarter;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync is already in progress")]
    InFlight,
    #[error("update check or download failed")]
    Network(#[source] anyhow::Error),
    #[error("downloaded content failed verification")]
    Integrity(#[source] anyhow::Error),
    #[error("patch application failed")]
    Patch(#[source] anyhow::Error),
    #[error("local storage failure")]
    Storage(#[source] anyhow::Error),
}

/// The download-verify-install pipeline. One engine instance serves the
/// whole process; concurrent [`UpdateEngine::sync`] calls are rejected, not
/// queued.
pub struct UpdateEngine {
    config: EngineConfig,
    machine: Arc<StateMachine>,
    packages: Arc<PackageStore>,
    transport: Arc<dyn Transport>,
    archive: Arc<dyn ArchiveCodec>,
    restarter: Arc<dyn Restarter>,
    sync_gate: Mutex<()>,
    /// Pending updates staged for "the next restart" are promoted by the
    /// first sync of a process lifetime; the engine is constructed at start,
    /// so a pending record older than this flag has survived a restart.
    first_sync_done: AtomicBool,
    background: BackgroundTasks,
}

impl UpdateEngine {
    pub fn new(
        config: EngineConfig,
        machine: Arc<StateMachine>,
        packages: Arc<PackageStore>,
        transport: Arc<dyn Transport>,
        archive: Arc<dyn ArchiveCodec>,
        restarter: Arc<dyn Restarter>,
    ) -> Self {
        Self {
            config,
            machine,
            packages,
            transport,
            archive,
            restarter,
            sync_gate: Mutex::new(()),
            first_sync_done: AtomicBool::new(false),
            background: BackgroundTasks::default(),
        }
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn current_package(&self) -> Option<PackageInfo> {
        self.machine.state().current_package
    }

    /// Runs one full sync pass and reports the outcome. Never panics and
    /// never returns an error: every failure collapses to
    /// [`SyncStatus::Error`] after logging and, when a release was already
    /// named, reporting FAILURE for it in the background.
    pub fn sync(&self, options: &SyncOptions) -> SyncStatus {
        let mut known_release: Option<String> = None;
        match self.sync_inner(options, &mut known_release) {
            Ok(status) => {
                info!(status = status.as_str(), "sync finished");
                status
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "sync failed");
                if !matches!(err, SyncError::InFlight) {
                    if let Some(release_id) = known_release {
                        self.report_status_background(release_id, ReleaseStatus::Failure);
                    }
                }
                SyncStatus::Error
            }
        }
    }

    /// Dry check against the server: what would the next sync act on.
    pub fn check(&self) -> Result<otapack_core::CheckForUpdateResponse, SyncError> {
        let state = self.machine.state();
        self.transport
            .check_for_update(&self.check_request(&state))
            .map_err(SyncError::Network)
    }

    /// Explicit rollback to the previous version. A no-op without a current
    /// package; with one, the demotion is persisted before the restart.
    pub fn rollback(&self) -> Result<(), SyncError> {
        let state = self.machine.state();
        if state.current_package.is_none() {
            info!("rollback requested with no current package, nothing to do");
            return Ok(());
        }
        self.machine
            .revert_to_previous_package()
            .map_err(|err| SyncError::Storage(err.into()))?;
        self.restarter.force_restart();
        Ok(())
    }

    /// Clears the persisted record entirely. Installed trees are left for
    /// the next garbage collection.
    pub fn reset_state(&self) -> Result<(), SyncError> {
        self.machine
            .reset_state()
            .map_err(|err| SyncError::Storage(err.into()))?;
        Ok(())
    }

    /// Removes every installed tree not referenced as current or previous.
    pub fn collect_garbage(&self) -> Result<Vec<String>, SyncError> {
        let keep = keep_set(&self.machine.state());
        self.packages
            .garbage_collect(&keep)
            .map_err(SyncError::Storage)
    }

    /// Blocks until background status reports and collections have drained.
    pub fn wait_for_background(&self) {
        self.background.wait();
    }

    fn sync_inner(
        &self,
        options: &SyncOptions,
        known_release: &mut Option<String>,
    ) -> Result<SyncStatus, SyncError> {
        let _gate = match self.sync_gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(SyncError::InFlight),
        };
        let first_sync = !self.first_sync_done.swap(true, Ordering::SeqCst);

        if let Some(status) = self.check_pending(options, first_sync)? {
            return Ok(status);
        }

        let state = self.machine.state();
        let response = self
            .transport
            .check_for_update(&self.check_request(&state))
            .map_err(SyncError::Network)?;

        let offered = if response.update_available {
            response.package
        } else {
            None
        };
        let Some(package) = offered else {
            debug!("no update available");
            self.collect_garbage_background(&state);
            return Ok(SyncStatus::UpToDate);
        };
        *known_release = Some(package.release_id.clone());

        let key = store_key(&package.hash);
        let entry_file = self.config.entry_file.clone();

        if self.packages.exists(&key) && self.packages.verify_entry_file(&key, &entry_file) {
            info!(release_id = %package.release_id, "release already materialized, skipping download");
        } else {
            self.materialize_release(&state, &package, response.patch.as_ref(), &key, &entry_file)?;
        }

        // Re-verify the entry file against the recorded key before the
        // version becomes selectable.
        if !self.packages.verify_entry_file(&key, &entry_file) {
            return Err(SyncError::Integrity(anyhow!(
                "entry file missing after materialization of release {}",
                package.release_id
            )));
        }

        let info = PackageInfo {
            release_id: package.release_id.clone(),
            hash: package.hash.clone(),
            relative_path: UpdateLayout::entry_relative_path(&key, &entry_file),
        };

        match options.resolve(package.is_mandatory) {
            InstallMode::Immediate => {
                self.machine
                    .record_new_package(info)
                    .map_err(|err| SyncError::Storage(err.into()))?;
                info!(release_id = %package.release_id, "installed release, restarting");
                self.restarter.force_restart();
            }
            InstallMode::OnNextRestart => {
                self.machine
                    .record_pending_update(info, package.is_mandatory)
                    .map_err(|err| SyncError::Storage(err.into()))?;
                info!(release_id = %package.release_id, "staged release for the next restart");
            }
        }

        Ok(SyncStatus::UpdateInstalled)
    }

    /// Step one of every sync: settle any pending update recorded by an
    /// earlier session. Returns `Some` when the pending record consumed this
    /// sync pass entirely.
    fn check_pending(
        &self,
        options: &SyncOptions,
        first_sync: bool,
    ) -> Result<Option<SyncStatus>, SyncError> {
        let state = self.machine.state();
        let Some(pending) = state.pending_update else {
            return Ok(None);
        };

        let entry = self.packages.layout().resolve(&pending.package.relative_path);
        if !entry.is_file() {
            warn!(
                release_id = %pending.package.release_id,
                path = %entry.display(),
                "pending update entry file missing, clearing record"
            );
            self.machine
                .clear_pending_update()
                .map_err(|err| SyncError::Storage(err.into()))?;
            return Ok(None);
        }

        let immediate = options.resolve(pending.is_mandatory) == InstallMode::Immediate;
        if immediate || first_sync {
            let release_id = pending.package.release_id.clone();
            self.machine
                .switch_to_version(pending.package)
                .map_err(|err| SyncError::Storage(err.into()))?;
            info!(%release_id, "promoted pending update, restarting");
            self.restarter.force_restart();
            return Ok(Some(SyncStatus::UpdateInstalled));
        }

        debug!(
            release_id = %pending.package.release_id,
            "pending update stays staged until the next restart"
        );
        Ok(None)
    }

    fn materialize_release(
        &self,
        state: &VersionState,
        package: &UpdatePackage,
        patch: Option<&UpdatePatch>,
        key: &str,
        entry_file: &str,
    ) -> Result<(), SyncError> {
        if let (Some(patch), Some(current)) = (patch, state.current_package.as_ref()) {
            let current_dir = self.packages.layout().package_dir(&store_key(&current.hash));
            if current_dir.is_dir() {
                return self.materialize_from_patch(package, patch, &current_dir, key, entry_file);
            }
            debug!(
                release_id = %package.release_id,
                "current version tree missing, ignoring offered patch"
            );
        }
        self.materialize_from_full(package, key, entry_file)
    }

    fn materialize_from_full(
        &self,
        package: &UpdatePackage,
        key: &str,
        entry_file: &str,
    ) -> Result<(), SyncError> {
        info!(release_id = %package.release_id, "downloading full package");
        let archive_path =
            self.download_verified(&package.bundle_url, &package.hash, &format!("{key}.archive"))?;

        let built = self
            .packages
            .materialize(key, entry_file, |dest| self.archive.extract(&archive_path, dest));
        let _ = fs::remove_file(&archive_path);
        built.map_err(SyncError::Integrity)
    }

    fn materialize_from_patch(
        &self,
        package: &UpdatePackage,
        patch: &UpdatePatch,
        current_dir: &Path,
        key: &str,
        entry_file: &str,
    ) -> Result<(), SyncError> {
        info!(release_id = %package.release_id, "downloading patch archive");
        let archive_path =
            self.download_verified(&patch.url, &patch.hash, &format!("{key}.patch.archive"))?;

        let payload_dir = self.packages.layout().tmp_dir().join(format!("{key}.patch"));
        let built = self.build_from_patch_payload(&archive_path, &payload_dir, current_dir, key, entry_file);
        let _ = fs::remove_file(&archive_path);
        let _ = fs::remove_dir_all(&payload_dir);
        built
    }

    fn build_from_patch_payload(
        &self,
        archive_path: &Path,
        payload_dir: &Path,
        current_dir: &Path,
        key: &str,
        entry_file: &str,
    ) -> Result<(), SyncError> {
        if payload_dir.exists() {
            fs::remove_dir_all(payload_dir)
                .with_context(|| format!("failed to clear stale patch payload: {}", payload_dir.display()))
                .map_err(SyncError::Storage)?;
        }
        self.archive
            .extract(archive_path, payload_dir)
            .map_err(SyncError::Integrity)?;

        let manifest = PatchManifest::load(payload_dir).map_err(SyncError::Patch)?;
        self.packages
            .materialize(key, entry_file, |dest| {
                apply_patch(current_dir, payload_dir, dest, &manifest)
            })
            .map_err(SyncError::Patch)
    }

    /// Downloads `url` into scratch as a `.part` file, verifies its SHA-256
    /// against `expected_hash`, then renames it into place. Nothing with an
    /// unverified digest ever exists outside `.part` files.
    fn download_verified(
        &self,
        url: &str,
        expected_hash: &str,
        file_name: &str,
    ) -> Result<PathBuf, SyncError> {
        let layout = self.packages.layout();
        layout.ensure_base_dirs().map_err(SyncError::Storage)?;

        let dest = layout.tmp_dir().join(file_name);
        let part = layout.tmp_dir().join(format!("{file_name}.part"));

        if let Err(err) = self.transport.download(url, &part) {
            let _ = fs::remove_file(&part);
            return Err(SyncError::Network(err));
        }
        if let Err(err) = otapack_security::verify_sha256_file(&part, expected_hash) {
            let _ = fs::remove_file(&part);
            return Err(SyncError::Integrity(err));
        }
        if let Err(err) = fs::rename(&part, &dest) {
            let _ = fs::remove_file(&part);
            return Err(SyncError::Storage(anyhow!(
                "failed to move verified download into place: {}: {err}",
                dest.display()
            )));
        }
        Ok(dest)
    }

    fn check_request(&self, state: &VersionState) -> CheckForUpdateRequest {
        CheckForUpdateRequest {
            app_id: self.config.app_id.clone(),
            channel: self.config.channel.clone(),
            client_binary_version: self.config.binary_version.clone(),
            current_release_hash: state.current_package.as_ref().map(|pkg| pkg.hash.clone()),
        }
    }

    fn report_status_background(&self, release_id: String, status: ReleaseStatus) {
        let transport = Arc::clone(&self.transport);
        let request = ReportStatusRequest {
            release_id,
            client_unique_id: self.config.client_id.clone(),
            status,
        };
        self.background.spawn("report-status", move || {
            transport.report_status(&request)
        });
    }

    fn collect_garbage_background(&self, state: &VersionState) {
        let keep = keep_set(state);
        let packages = Arc::clone(&self.packages);
        self.background.spawn("package-gc", move || {
            let removed = packages.garbage_collect(&keep)?;
            if !removed.is_empty() {
                info!(removed = removed.len(), "collected unreferenced package directories");
            }
            Ok(())
        });
    }
}

/// Directory key for a release hash. Digest comparison is case-insensitive,
/// so the key must be case-normalized to keep one directory per release.
fn store_key(hash: &str) -> String {
    hash.to_ascii_lowercase()
}

fn keep_set(state: &VersionState) -> BTreeSet<String> {
    [&state.current_package, &state.previous_package]
        .into_iter()
        .flatten()
        .map(|pkg| store_key(&pkg.hash))
        .collect()
}
