//! Sync engine between a FlashAir-style WiFi SD card and a remote collector.
//!
//! One invocation is one short, strictly sequential run:
//!
//! - **[`Syncer`]**: The orchestrator. Takes the [`RunLock`], heals a
//!   previous crash (radio left off the home network), scans for the card,
//!   switches to it, downloads new logs, always switches back, relays
//!   pending files, and prunes old ones.
//!
//! - **[`NetworkSwitch`]**: Adds/removes the temporary card profile and
//!   owns the switch-home obligation that every exit path discharges.
//!
//! - **[`WifiControl`]**: Control-plane seam. [`WpaCli`] drives
//!   `wpa_supplicant`; tests substitute fakes.
//!
//! - **[`DeviceFiles`]** / **[`Relay`]**: Data-plane seams for the card's
//!   HTTP interface and the scp upload.
//!
//! - **[`StateStore`]**: Watermarks and cooldown timestamps, rewritten at
//!   each per-file commit.
//!
//! Core never reads configuration files: the binary builds a
//! [`SyncConfig`] and hands it in.

pub mod config;
pub mod device;
pub mod download;
pub mod error;
pub mod local;
pub mod lock;
pub mod poll;
pub mod relay;
pub mod retention;
pub mod scan;
pub mod state;
pub mod switch;
pub mod sync;
pub mod wifi;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DeviceConfig, RemoteConfig, SyncConfig, Timeouts};
pub use device::DeviceFiles;
pub use download::{DownloadSummary, download_new};
pub use error::CoreError;
pub use local::{LocalFile, local_log_files};
pub use lock::{LockError, RunLock};
pub use poll::{PollTimeout, poll_until};
pub use relay::{Relay, RelaySummary, ScpRelay, relay_pending};
pub use retention::{RetentionSummary, prune};
pub use scan::{ScanDecision, ScanProbe};
pub use state::{StateStore, SyncState};
pub use switch::{NetworkSwitch, WifiContext};
pub use sync::{DeviceVisit, RunOutcome, RunPhase, RunReport, Syncer};
pub use wifi::{ConfiguredNetwork, LinkStatus, NetworkId, ScanEntry, WifiControl, WpaCli};

pub use flashsync_api::{LogName, RemoteFileEntry};
