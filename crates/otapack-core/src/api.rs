use serde::{Deserialize, Serialize};

/// Body of the update negotiation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckForUpdateRequest {
    pub app_id: String,
    pub channel: String,
    pub client_binary_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_release_hash: Option<String>,
}

/// A release the server offers as a full package download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackage {
    pub release_id: String,
    pub bundle_url: String,
    pub hash: String,
    #[serde(default)]
    pub is_mandatory: bool,
}

/// A smaller patch archive that transforms the currently installed version
/// into the offered one. The hash covers the patch archive itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatch {
    pub url: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckForUpdateResponse {
    pub update_available: bool,
    #[serde(default)]
    pub package: Option<UpdatePackage>,
    #[serde(default)]
    pub patch: Option<UpdatePatch>,
}

/// Install verdict reported back to the server for a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Success,
    Failure,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatusRequest {
    pub release_id: String,
    pub client_unique_id: String,
    pub status: ReleaseStatus,
}
