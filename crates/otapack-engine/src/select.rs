use std::path::PathBuf;

use otapack_core::VersionState;
use otapack_store::UpdateLayout;
use tracing::{debug, warn};

/// Boot-time payload selection. Returns the entry file of the current
/// installed version, or `None` when the host must fall back to its
/// originally bundled payload. Never mutates state and never fails.
///
/// `None` is returned when there is no current package, when the version has
/// already failed `max_failed_boots` boots and is about to be rolled back,
/// or when the recorded entry file is missing on disk.
pub fn select_bundle(
    layout: &UpdateLayout,
    state: &VersionState,
    max_failed_boots: u32,
) -> Option<PathBuf> {
    let current = state.current_package.as_ref()?;

    if state.failed_boot_count >= max_failed_boots {
        debug!(
            release_id = %current.release_id,
            failed_boots = state.failed_boot_count,
            "current version exhausted its boot attempts, using bundled payload"
        );
        return None;
    }

    let path = layout.resolve(&current.relative_path);
    if path.is_file() {
        Some(path)
    } else {
        warn!(
            release_id = %current.release_id,
            path = %path.display(),
            "recorded entry file missing, using bundled payload"
        );
        None
    }
}
