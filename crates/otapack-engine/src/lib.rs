mod archive;
mod background;
mod config;
mod restart;
mod select;
mod sync;
mod transport;
mod watchdog;

pub use archive::{ArchiveCodec, SystemArchiveCodec};
pub use config::EngineConfig;
pub use restart::{NoopRestarter, Restarter};
pub use select::select_bundle;
pub use sync::{SyncError, UpdateEngine};
pub use transport::{HttpTransport, Transport};
pub use watchdog::{BootWatchdog, WatchdogPolicy};
