use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tracing::warn;

/// Fire-and-forget work spawned off the sync path (status reports, garbage
/// collection). Handles are retained so hosts and tests can drain them; a
/// failed task is logged and dropped, never propagated.
#[derive(Debug, Default)]
pub(crate) struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let spawned = thread::Builder::new()
            .name(format!("otapack-{name}"))
            .spawn(move || {
                if let Err(err) = task() {
                    warn!(task = name, error = %format!("{err:#}"), "background task failed");
                }
            });
        match spawned {
            Ok(handle) => self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(handle),
            Err(err) => warn!(task = name, %err, "failed to spawn background task"),
        }
    }

    /// Blocks until every spawned task has finished.
    pub fn wait(&self) {
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in handles {
            let _ = handle.join();
        }
    }
}
