// ── Runtime sync configuration ──
//
// These types describe *what* to sync and *how long* to wait for it.
// They carry credential data and tuning, but never touch disk.
// The binary builds a `SyncConfig` (via flashsync-config) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// The card's access point and HTTP interface.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// SSID the card advertises while powered.
    pub ssid: String,
    /// WPA passphrase for the card's access point.
    pub password: SecretString,
    /// Card address on its own network (e.g. `192.168.0.1`).
    pub address: String,
    /// Directory on the card holding the logs (e.g. `/` or `/LOGS`).
    pub directory: String,
}

/// Where relayed files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    /// Destination directory on the collector.
    pub directory: String,
    /// Private key for non-interactive scp.
    pub identity_file: PathBuf,
}

/// Every bounded wait in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Association wait, both directions, and the card HTTP readiness wait.
    pub connect: Duration,
    /// Interval between association / readiness checks.
    pub poll_interval: Duration,
    /// Single directory listing request.
    pub listing: Duration,
    /// Per-file download budget (not shared across the batch).
    pub download: Duration,
    /// Per-file scp budget.
    pub transfer: Duration,
    /// Pause between triggering a scan and reading its results.
    pub scan_settle: Duration,
    /// Pause after reassociating home so DHCP can finish.
    pub dhcp_settle: Duration,
    /// Single `wpa_cli` command.
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            listing: Duration::from_secs(15),
            download: Duration::from_secs(120),
            transfer: Duration::from_secs(60),
            scan_settle: Duration::from_secs(5),
            dhcp_settle: Duration::from_secs(3),
            command: Duration::from_secs(10),
        }
    }
}

/// Configuration for one sync run. Immutable once built.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub device: DeviceConfig,
    /// SSID of the persistent network the host normally lives on.
    pub home_ssid: String,
    /// Wireless interface handed to `wpa_cli -i`.
    pub interface: String,
    /// Local directory for downloaded logs.
    pub local_dir: PathBuf,
    pub remote: RemoteConfig,
    /// Quiet period after the card was seen absent or fully synced.
    pub cooldown: Duration,
    /// How many of the newest local logs to keep after relay.
    pub retention: usize,
    pub timeouts: Timeouts,
    /// Persisted watermarks and cooldown timestamps.
    pub state_path: PathBuf,
    /// Advisory lock file serializing invocations.
    pub lock_path: PathBuf,
    /// Ignore the download watermark and fetch everything on the card.
    pub resync: bool,
}
