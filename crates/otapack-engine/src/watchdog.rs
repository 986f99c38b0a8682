use std::sync::Arc;
use std::time::{Duration, Instant};

use otapack_core::{ReleaseStatus, ReportStatusRequest};
use otapack_store::StateMachine;
use tracing::{debug, info, warn};

use crate::restart::Restarter;
use crate::transport::Transport;

/// Rollback policy of the boot watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogPolicy {
    /// Failed boots a version may accumulate before it is rolled back.
    pub max_failed_boots: u32,
    /// Failure signals arriving later than this after startup are treated as
    /// ordinary runtime errors, not boot failures.
    pub confirmation_window: Duration,
}

impl Default for WatchdogPolicy {
    fn default() -> Self {
        Self {
            max_failed_boots: 2,
            confirmation_window: Duration::from_secs(5),
        }
    }
}

/// Boot watchdog: counts unconfirmed boots of the current version and rolls
/// back once the failure threshold is reached. One watchdog is constructed
/// per process, at startup; the confirmation window is measured from
/// construction.
pub struct BootWatchdog {
    machine: Arc<StateMachine>,
    transport: Arc<dyn Transport>,
    restarter: Arc<dyn Restarter>,
    policy: WatchdogPolicy,
    client_id: String,
    started_at: Instant,
}

impl BootWatchdog {
    pub fn new(
        machine: Arc<StateMachine>,
        transport: Arc<dyn Transport>,
        restarter: Arc<dyn Restarter>,
        policy: WatchdogPolicy,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            machine,
            transport,
            restarter,
            policy,
            client_id: client_id.into(),
            started_at: Instant::now(),
        }
    }

    /// Records one boot failure of the current version and, at the
    /// threshold, reports FAILURE, reverts to the previous version, and
    /// forces a restart. Never panics and never returns an error: once the
    /// threshold is reached the restart happens even if persisting the
    /// rollback failed, otherwise a broken state store could pin the host to
    /// a crashing version forever.
    pub fn record_failed_boot(&self) {
        if self.started_at.elapsed() > self.policy.confirmation_window {
            debug!("failure signal outside the confirmation window, ignoring");
            return;
        }

        let state = self.machine.state();
        let Some(current) = state.current_package else {
            debug!("boot failure with no installed version, nothing to roll back");
            return;
        };

        let count = match self.machine.record_failed_boot() {
            Ok(count) => count,
            Err(err) => {
                warn!(%err, "failed to persist boot failure count");
                state.failed_boot_count.saturating_add(1)
            }
        };
        warn!(
            release_id = %current.release_id,
            failed_boots = count,
            "boot failure recorded"
        );

        if count < self.policy.max_failed_boots {
            return;
        }

        info!(release_id = %current.release_id, "failure threshold reached, rolling back");
        self.report(&current.release_id, ReleaseStatus::Failure);
        if let Err(err) = self.machine.revert_to_previous_package() {
            warn!(%err, "failed to persist rollback, restarting anyway");
        }
        self.restarter.force_restart();
    }

    /// Marks the running version as healthy. When the version had pending
    /// boot failures this is its first confirmed boot, so SUCCESS is
    /// reported before the counter is cleared.
    pub fn confirm_boot(&self) {
        let state = self.machine.state();
        if state.failed_boot_count == 0 {
            return;
        }

        if let Some(current) = &state.current_package {
            info!(release_id = %current.release_id, "boot confirmed");
            self.report(&current.release_id, ReleaseStatus::Success);
        }
        if let Err(err) = self.machine.reset_boot_status() {
            warn!(%err, "failed to clear boot failure count");
        }
    }

    fn report(&self, release_id: &str, status: ReleaseStatus) {
        let request = ReportStatusRequest {
            release_id: release_id.to_string(),
            client_unique_id: self.client_id.clone(),
            status,
        };
        if let Err(err) = self.transport.report_status(&request) {
            warn!(error = %format!("{err:#}"), "status report failed");
        }
    }
}
