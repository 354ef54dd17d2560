//! CLI error types with miette diagnostics.
//!
//! Only failures that happen before the radio is touched, or that leave
//! the state file untrustworthy, end up here. Card absence, a held lock and
//! per-file failures are normal outcomes and exit 0.

use miette::Diagnostic;
use thiserror::Error;

use flashsync_config::ConfigError;
use flashsync_core::{CoreError, LockError};

/// Process exit codes. clap itself exits 2 on usage errors.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const WIFI: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Missing required settings: {keys}")]
    #[diagnostic(
        code(flashsync::missing_settings),
        help(
            "Set them in {path}\n\
             or as FLASHSYNC_<KEY> environment variables (e.g. FLASHSYNC_DEVICE_SSID)."
        )
    )]
    MissingSettings { keys: String, path: String },

    #[error("Invalid configuration in {path}")]
    #[diagnostic(code(flashsync::config))]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    // ── Local files ──────────────────────────────────────────────────
    #[error("State file {path} is unusable: {reason}")]
    #[diagnostic(
        code(flashsync::state),
        help("Fix or remove the file. Removing it makes the next run download everything again.")
    )]
    State { path: String, reason: String },

    #[error("Cannot take the run lock")]
    #[diagnostic(code(flashsync::lock))]
    Lock(#[source] LockError),

    #[error("Cannot set up the card client: {0}")]
    #[diagnostic(code(flashsync::client))]
    Client(#[source] flashsync_api::Error),

    // ── Radio ────────────────────────────────────────────────────────
    #[error("WiFi control failed: {message}")]
    #[diagnostic(
        code(flashsync::wifi),
        help("Check that wpa_supplicant is running and the interface name is correct.")
    )]
    Wifi { message: String },

    #[error("Sync failed: {message}")]
    #[diagnostic(code(flashsync::sync))]
    Sync { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingSettings { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::Wifi { .. } => exit_code::WIFI,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the file the configuration came from.
    pub fn config(err: ConfigError, path: &std::path::Path) -> Self {
        let path = path.display().to_string();
        match err {
            ConfigError::Missing { keys } => CliError::MissingSettings {
                keys: keys.join(", "),
                path,
            },
            ConfigError::Io(e) => CliError::Io(e),
            source => CliError::Config { path, source },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::State { path, reason } => CliError::State { path, reason },
            CoreError::Lock(e) => CliError::Lock(e),
            CoreError::Io(e) => CliError::Io(e),
            e @ (CoreError::Wifi { .. } | CoreError::ScanFailed { .. }) => CliError::Wifi {
                message: e.to_string(),
            },
            other => CliError::Sync {
                message: other.to_string(),
            },
        }
    }
}
