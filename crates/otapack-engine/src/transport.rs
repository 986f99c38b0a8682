use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use otapack_core::{CheckForUpdateRequest, CheckForUpdateResponse, ReportStatusRequest};
use tracing::debug;

/// Network seam of the engine. The shipped implementation is
/// [`HttpTransport`]; tests substitute scripted fakes.
pub trait Transport: Send + Sync {
    /// Asks the server whether a newer release exists for this install.
    fn check_for_update(&self, request: &CheckForUpdateRequest) -> Result<CheckForUpdateResponse>;

    /// Reports the final install verdict for a release.
    fn report_status(&self, request: &ReportStatusRequest) -> Result<()>;

    /// Downloads `url` into `dest`, replacing any existing file.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// [`Transport`] over plain HTTPS JSON endpoints:
///
/// ```text
/// POST <base>/check-for-update   CheckForUpdateRequest -> CheckForUpdateResponse
/// POST <base>/report-status      ReportStatusRequest   -> (ignored body)
/// GET  <url>                     raw archive bytes
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Transport for HttpTransport {
    fn check_for_update(&self, request: &CheckForUpdateRequest) -> Result<CheckForUpdateResponse> {
        let url = self.endpoint("check-for-update");
        debug!(%url, app_id = %request.app_id, "checking for update");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .with_context(|| format!("update check request failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("update check rejected by server: {url}"))?;
        response
            .json::<CheckForUpdateResponse>()
            .with_context(|| format!("failed to decode update check response from {url}"))
    }

    fn report_status(&self, request: &ReportStatusRequest) -> Result<()> {
        let url = self.endpoint("report-status");
        debug!(%url, release_id = %request.release_id, status = request.status.as_str(), "reporting release status");
        self.client
            .post(&url)
            .json(request)
            .send()
            .with_context(|| format!("status report request failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("status report rejected by server: {url}"))?;
        Ok(())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(%url, dest = %dest.display(), "downloading archive");
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("download request failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("download rejected by server: {url}"))?;

        let mut file = fs::File::create(dest)
            .with_context(|| format!("failed to create download file: {}", dest.display()))?;
        let written = response
            .copy_to(&mut file)
            .with_context(|| format!("failed while streaming {url} to {}", dest.display()))?;
        if written == 0 {
            return Err(anyhow!("server returned an empty archive: {url}"));
        }
        Ok(())
    }
}
