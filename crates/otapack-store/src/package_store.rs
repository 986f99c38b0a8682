use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::layout::UpdateLayout;

/// Content-addressed store of extracted version trees under
/// `<root>/updates/<hash>/`.
///
/// `materialize` and `garbage_collect` share one directory-level lock, so
/// collection never deletes a directory that is mid-build.
#[derive(Debug)]
pub struct PackageStore {
    layout: UpdateLayout,
    dir_lock: Mutex<()>,
}

impl PackageStore {
    pub fn new(layout: UpdateLayout) -> Self {
        Self {
            layout,
            dir_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &UpdateLayout {
        &self.layout
    }

    pub fn exists(&self, key: &str) -> bool {
        self.layout.package_dir(key).is_dir()
    }

    /// Presence check for the entry file. Content was hash-verified before
    /// extraction; this only guards against evicted or hollow directories.
    pub fn verify_entry_file(&self, key: &str, entry_file: &str) -> bool {
        self.layout.package_dir(key).join(entry_file).is_file()
    }

    /// Builds `updates/<key>` by running `producer` against a fresh
    /// directory, then verifies the entry file landed. Any failure removes
    /// the partially built directory before the error propagates.
    pub fn materialize<F>(&self, key: &str, entry_file: &str, producer: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let _guard = self.dir_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let dest = self.layout.package_dir(key);
        if dest.exists() {
            fs::remove_dir_all(&dest).with_context(|| {
                format!("failed to clear stale package dir: {}", dest.display())
            })?;
        }
        fs::create_dir_all(&dest)
            .with_context(|| format!("failed to create package dir: {}", dest.display()))?;

        let built = producer(&dest).and_then(|()| {
            let entry_path = dest.join(entry_file);
            if entry_path.is_file() {
                Ok(())
            } else {
                Err(anyhow!(
                    "entry file '{}' missing after materialization of '{}'",
                    entry_file,
                    key
                ))
            }
        });

        if let Err(err) = built {
            let _ = fs::remove_dir_all(&dest);
            return Err(err);
        }

        info!(key, "materialized package directory");
        Ok(())
    }

    /// Deletes every `updates/` subdirectory whose name is not in `keep`.
    /// Returns the removed keys.
    pub fn garbage_collect(&self, keep: &BTreeSet<String>) -> Result<Vec<String>> {
        let _guard = self.dir_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let updates_dir = self.layout.updates_dir();
        if !updates_dir.exists() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in fs::read_dir(&updates_dir)
            .with_context(|| format!("failed to read updates dir: {}", updates_dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if keep.contains(&name) {
                continue;
            }

            fs::remove_dir_all(entry.path()).with_context(|| {
                format!(
                    "failed to remove unreferenced package dir: {}",
                    entry.path().display()
                )
            })?;
            debug!(key = %name, "garbage collected package directory");
            removed.push(name);
        }

        removed.sort();
        Ok(removed)
    }
}
