use tracing::warn;

/// Host restart seam. The engine calls this after persisting a version
/// switch; the persisted state is already durable when the call is made, so
/// an implementation may terminate the process without further coordination.
pub trait Restarter: Send + Sync {
    fn force_restart(&self);
}

/// Default restarter for hosts that have not wired a restart primitive in.
/// The switch is still persisted; it takes effect on the next natural start.
#[derive(Debug, Default)]
pub struct NoopRestarter;

impl Restarter for NoopRestarter {
    fn force_restart(&self) {
        warn!("restart requested, but no restart primitive is configured");
    }
}
