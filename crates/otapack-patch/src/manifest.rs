use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Description of how a patch payload transforms one installed version into
/// the next: paths to delete, files shipped verbatim, and unified-diff text
/// patches keyed by relative path.
///
/// Binary files must travel through `new_files`; `patched_files` assumes
/// line-oriented UTF-8 content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchManifest {
    #[serde(default)]
    pub deleted_files: Vec<String>,
    #[serde(default)]
    pub new_files: Vec<String>,
    #[serde(default)]
    pub patched_files: BTreeMap<String, String>,
}

impl PatchManifest {
    /// File name of the manifest inside an extracted patch payload.
    pub const FILE_NAME: &'static str = "patch.json";

    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("failed to parse patch manifest")
    }

    /// Reads `patch.json` from an extracted patch payload directory.
    pub fn load(payload_dir: &Path) -> Result<Self> {
        let path = payload_dir.join(Self::FILE_NAME);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read patch manifest: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed parsing patch manifest: {}", path.display()))
    }
}
