use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// On-disk layout contract under one update root:
///
/// ```text
/// <root>/state.json        persisted version record
/// <root>/updates/<hash>/   one extracted tree per installed version
/// <root>/tmp/              download and staging scratch
/// ```
///
/// Hosts reading this layout directly must treat a missing or unparseable
/// `state.json` as empty state, never as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLayout {
    root: PathBuf,
}

impl UpdateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn state_tmp_path(&self) -> PathBuf {
        self.root.join("state.json.tmp")
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.root.join("updates")
    }

    pub fn package_dir(&self, key: &str) -> PathBuf {
        self.updates_dir().join(key)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Resolves a `PackageInfo::relative_path` against the root.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Relative path of a version's entry file, as recorded in the state.
    /// Root-independent, so it is an associated function.
    pub fn entry_relative_path(key: &str, entry_file: &str) -> String {
        format!("updates/{key}/{entry_file}")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.updates_dir(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
