// ── Core error types ──
//
// Errors from flashsync-core, grouped by the phase they abort. Consumers
// never see reqwest or wpa_cli details directly: the `From` impl below
// translates data-plane errors, and the wifi module wraps control-plane
// failures. Benign results (card absent, lock held) are outcomes, not
// errors.

use thiserror::Error;

use crate::lock::LockError;

/// Unified error type for the core crate.
#[derive(Debug, Error, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CoreError {
    // ── Control plane ────────────────────────────────────────────────
    #[error("wpa_cli {command} failed: {reason}")]
    Wifi { command: String, reason: String },

    #[error("WiFi scan failed: {reason}")]
    ScanFailed { reason: String },

    // ── Network switching ────────────────────────────────────────────
    #[error("Not associated with '{ssid}' after {timeout_secs}s")]
    ConnectionTimeout { ssid: String, timeout_secs: u64 },

    #[error("Cannot connect to '{ssid}': {reason}")]
    ConnectionFailed { ssid: String, reason: String },

    #[error("Could not return to '{ssid}': {reason}")]
    ReconnectFailure { ssid: String, reason: String },

    // ── Card data plane ──────────────────────────────────────────────
    #[error("Card HTTP server at {address} not reachable after {timeout_secs}s")]
    DeviceUnreachable { address: String, timeout_secs: u64 },

    #[error("Request to card failed: {message}")]
    RequestFailed { message: String },

    #[error("Card listing could not be parsed: {message}")]
    ListingParse { message: String },

    #[error("Download of {file} timed out after {timeout_secs}s")]
    DownloadTimeout { file: String, timeout_secs: u64 },

    #[error("Download of {file} failed: {reason}")]
    DownloadFailed { file: String, reason: String },

    // ── Relay ────────────────────────────────────────────────────────
    #[error("Transfer of {file} failed: {reason}")]
    TransferFailed { file: String, reason: String },

    // ── Local ────────────────────────────────────────────────────────
    #[error("State file {path}: {reason}")]
    State { path: String, reason: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Short machine-friendly kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Returns `true` for failures scoped to a single file.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::DownloadTimeout { .. } | Self::DownloadFailed { .. } | Self::TransferFailed { .. }
        )
    }
}

// ── Conversion from data-plane errors ────────────────────────────────

impl From<flashsync_api::Error> for CoreError {
    fn from(err: flashsync_api::Error) -> Self {
        match err {
            flashsync_api::Error::ListingParse { line, reason } => CoreError::ListingParse {
                message: format!("line {line}: {reason}"),
            },
            flashsync_api::Error::InvalidLogName(e) => CoreError::ListingParse {
                message: e.to_string(),
            },
            flashsync_api::Error::Io(e) => CoreError::Io(e),
            other => CoreError::RequestFailed {
                message: other.to_string(),
            },
        }
    }
}
