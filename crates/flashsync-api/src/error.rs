use thiserror::Error;

use crate::log_name::InvalidLogName;

/// Top-level error type for the `flashsync-api` crate.
///
/// Covers the failure modes of the card's data plane: transport,
/// listing decode, and local writes during a download.
/// `flashsync-core` maps these into phase-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset mid-body, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The card answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    // ── Data ────────────────────────────────────────────────────────
    /// The `command.cgi` listing body could not be decoded.
    #[error("Malformed directory listing (line {line}): {reason}")]
    ListingParse { line: usize, reason: String },

    /// A name that does not follow the log naming scheme.
    #[error(transparent)]
    InvalidLogName(#[from] InvalidLogName),

    // ── Local ───────────────────────────────────────────────────────
    /// Writing the downloaded body to disk failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
