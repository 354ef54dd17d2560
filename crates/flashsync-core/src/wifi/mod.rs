// ── WiFi control plane ──
//
// The operations the sync engine needs from the host's wireless stack.
// `WpaCli` implements them over `wpa_cli`; tests plug in fakes that record
// every call.

mod wpa_cli;

use secrecy::SecretString;

use crate::error::CoreError;

pub use wpa_cli::{
    WpaCli, parse_list_networks, parse_network_id, parse_scan_results, parse_status,
};

/// `wpa_supplicant` network block id.
pub type NetworkId = u32;

/// `wpa_state` value once the link is fully up.
pub const STATE_COMPLETED: &str = "COMPLETED";

/// One row of `scan_results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub bssid: String,
    pub frequency: u32,
    pub signal_dbm: i32,
    pub flags: String,
    pub ssid: String,
}

/// Current association, from `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// `wpa_state` (e.g. `COMPLETED`, `SCANNING`, `DISCONNECTED`).
    pub state: String,
    pub ssid: Option<String>,
    pub ip_address: Option<String>,
}

impl LinkStatus {
    /// Fully associated with `ssid`, not merely selected or scanning.
    pub fn is_associated_with(&self, ssid: &str) -> bool {
        self.state == STATE_COMPLETED && self.ssid.as_deref() == Some(ssid)
    }
}

/// One row of `list_networks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredNetwork {
    pub id: NetworkId,
    pub ssid: String,
    pub flags: String,
}

/// Control-plane operations on the wireless interface.
///
/// Every call is a bounded request/response; implementations enforce their
/// own per-command timeout.
#[allow(async_fn_in_trait)]
pub trait WifiControl {
    /// Trigger a scan and return what is currently visible.
    async fn scan(&self) -> Result<Vec<ScanEntry>, CoreError>;

    /// Add a runtime (unsaved) WPA-PSK profile.
    async fn add_network(&self, ssid: &str, psk: &SecretString) -> Result<NetworkId, CoreError>;

    /// Make `id` the only enabled profile and start associating.
    async fn select_network(&self, id: NetworkId) -> Result<(), CoreError>;

    async fn remove_network(&self, id: NetworkId) -> Result<(), CoreError>;

    async fn list_networks(&self) -> Result<Vec<ConfiguredNetwork>, CoreError>;

    /// Re-read the persistent configuration, dropping runtime profiles.
    async fn reload_configuration(&self) -> Result<(), CoreError>;

    async fn status(&self) -> Result<LinkStatus, CoreError>;
}
