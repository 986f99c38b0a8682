use serde::{Deserialize, Serialize};

/// One installed or installable bundle version.
///
/// `hash` doubles as the on-disk deduplication key: the extracted tree for a
/// release lives under `updates/<hash>/` and `relative_path` points at the
/// entry file inside it, relative to the update root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub release_id: String,
    pub hash: String,
    pub relative_path: String,
}

impl PackageInfo {
    /// Case-insensitive hex comparison, the only valid way to compare
    /// package hashes (servers and hashing backends disagree on casing).
    pub fn hash_matches(&self, other: &str) -> bool {
        self.hash.eq_ignore_ascii_case(other)
    }
}

/// A fully materialized version waiting for its install moment.
///
/// Serde-flattened so the persisted shape stays `{...package fields,
/// "isMandatory": bool}`, matching the record layout hosts may read directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    #[serde(flatten)]
    pub package: PackageInfo,
    pub is_mandatory: bool,
}

/// When a downloaded update should take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallMode {
    /// Promote and force a restart within the same sync call.
    Immediate,
    /// Record as pending; promoted on the next natural restart.
    OnNextRestart,
}
