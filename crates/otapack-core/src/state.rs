use serde::{Deserialize, Serialize};

use crate::package::{InstallMode, PackageInfo, PendingUpdate};

/// Persisted record schema version. Any other value loads as empty state.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// The singleton version record: which bundle to load next, which one to
/// fall back to, what is staged, and how many boots have gone unconfirmed.
///
/// Mutated exclusively through the state machine transitions; persisted
/// after every mutation and before any side effect (restart) proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub current_package: Option<PackageInfo>,
    #[serde(default)]
    pub previous_package: Option<PackageInfo>,
    #[serde(default)]
    pub pending_update: Option<PendingUpdate>,
    #[serde(default)]
    pub failed_boot_count: u32,
}

impl Default for VersionState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            current_package: None,
            previous_package: None,
            pending_update: None,
            failed_boot_count: 0,
        }
    }
}

/// Outcome of one `sync` invocation, the only thing the host ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    UpToDate,
    UpdateInstalled,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpToDate => "UP_TO_DATE",
            Self::UpdateInstalled => "UPDATE_INSTALLED",
            Self::Error => "ERROR",
        }
    }
}

/// Per-call install policy. Mandatory releases use the stricter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub install_mode: InstallMode,
    pub mandatory_install_mode: InstallMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            install_mode: InstallMode::OnNextRestart,
            mandatory_install_mode: InstallMode::Immediate,
        }
    }
}

impl SyncOptions {
    pub fn resolve(&self, is_mandatory: bool) -> InstallMode {
        if is_mandatory {
            self.mandatory_install_mode
        } else {
            self.install_mode
        }
    }
}

fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}
