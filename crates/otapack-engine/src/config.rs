/// Deployment identity of the host application. Everything the engine
/// sends to the update server comes from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Server-side application identifier.
    pub app_id: String,
    /// Release channel this install follows, e.g. "production" or "beta".
    pub channel: String,
    /// Version of the host binary itself. Updates are negotiated per binary
    /// version; a new binary starts from its own bundled payload.
    pub binary_version: String,
    /// Stable identifier for this installation, used in status reports.
    pub client_id: String,
    /// File inside a version tree that the host actually loads.
    pub entry_file: String,
}

impl EngineConfig {
    pub const DEFAULT_ENTRY_FILE: &'static str = "index.bundle";

    pub fn new(
        app_id: impl Into<String>,
        channel: impl Into<String>,
        binary_version: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            channel: channel.into(),
            binary_version: binary_version.into(),
            client_id: client_id.into(),
            entry_file: Self::DEFAULT_ENTRY_FILE.to_string(),
        }
    }

    pub fn with_entry_file(mut self, entry_file: impl Into<String>) -> Self {
        self.entry_file = entry_file.into();
        self
    }
}
