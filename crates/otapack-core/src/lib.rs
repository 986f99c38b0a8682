mod api;
mod package;
mod state;

pub use api::{
    CheckForUpdateRequest, CheckForUpdateResponse, ReleaseStatus, ReportStatusRequest,
    UpdatePackage, UpdatePatch,
};
pub use package::{InstallMode, PackageInfo, PendingUpdate};
pub use state::{SyncOptions, SyncStatus, VersionState, STATE_SCHEMA_VERSION};
