use otapack_core::{PackageInfo, PendingUpdate, VersionState};
use tracing::info;

use crate::state_store::{StateStore, StoreError};

/// The version state machine. Every transition is a locked
/// read-compute-persist against the [`StateStore`]; nothing else mutates
/// the record. Each operation returns the state as persisted.
#[derive(Debug)]
pub struct StateMachine {
    store: StateStore,
}

impl StateMachine {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Snapshot read of the persisted record.
    pub fn state(&self) -> VersionState {
        self.store.load()
    }

    /// Installs `pkg` immediately: the current version becomes the rollback
    /// target and the boot counter starts over.
    pub fn record_new_package(&self, pkg: PackageInfo) -> Result<VersionState, StoreError> {
        info!(release_id = %pkg.release_id, "recording new current package");
        self.store.update(|state| {
            // Re-recording the running version must not make it its own
            // rollback target.
            if state.current_package.as_ref() != Some(&pkg) {
                state.previous_package = state.current_package.take();
            }
            state.current_package = Some(pkg);
            state.failed_boot_count = 0;
        })
    }

    /// Stages `pkg` for the next natural restart, replacing any prior
    /// pending record. Does not touch the current package.
    pub fn record_pending_update(
        &self,
        pkg: PackageInfo,
        is_mandatory: bool,
    ) -> Result<VersionState, StoreError> {
        info!(release_id = %pkg.release_id, is_mandatory, "recording pending update");
        self.store.update(|state| {
            state.pending_update = Some(PendingUpdate {
                package: pkg,
                is_mandatory,
            });
        })
    }

    pub fn clear_pending_update(&self) -> Result<VersionState, StoreError> {
        self.store.update(|state| {
            state.pending_update = None;
        })
    }

    /// Promotes `pkg` to current, clearing the pending record when it names
    /// the same release. The caller must force a restart after this returns;
    /// the persisted write has already reached disk by then.
    pub fn switch_to_version(&self, pkg: PackageInfo) -> Result<VersionState, StoreError> {
        info!(release_id = %pkg.release_id, "switching to version");
        self.store.update(|state| {
            if state
                .pending_update
                .as_ref()
                .is_some_and(|pending| pending.package == pkg)
            {
                state.pending_update = None;
            }
            if state.current_package.as_ref() != Some(&pkg) {
                state.previous_package = state.current_package.take();
            }
            state.current_package = Some(pkg);
            state.failed_boot_count = 0;
        })
    }

    /// The rollback primitive. Without a previous package the current one is
    /// cleared entirely, falling back to the originally bundled payload.
    pub fn revert_to_previous_package(&self) -> Result<VersionState, StoreError> {
        info!("reverting to previous package");
        self.store.update(|state| {
            state.current_package = state.previous_package.take();
            state.failed_boot_count = 0;
        })
    }

    /// Increments the unconfirmed-boot counter and returns the new value.
    /// Touches nothing else.
    pub fn record_failed_boot(&self) -> Result<u32, StoreError> {
        let state = self.store.update(|state| {
            state.failed_boot_count = state.failed_boot_count.saturating_add(1);
        })?;
        Ok(state.failed_boot_count)
    }

    /// Zeroes the unconfirmed-boot counter. Touches nothing else.
    pub fn reset_boot_status(&self) -> Result<VersionState, StoreError> {
        self.store.update(|state| {
            state.failed_boot_count = 0;
        })
    }

    /// Diagnostic/uninstall path: the explicit reset-to-empty operation.
    pub fn reset_state(&self) -> Result<VersionState, StoreError> {
        info!("resetting version state to empty");
        self.store.update(|state| {
            *state = VersionState::default();
        })
    }
}
