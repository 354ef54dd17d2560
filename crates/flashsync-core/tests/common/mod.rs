// In-memory collaborators for driving `Syncer` without a radio, a card or
// an ssh server.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use secrecy::SecretString;
use tempfile::TempDir;

use flashsync_core::wifi::STATE_COMPLETED;
use flashsync_core::{
    ConfiguredNetwork, CoreError, DeviceConfig, DeviceFiles, LinkStatus, LocalFile, LogName,
    NetworkId, Relay, RemoteConfig, RemoteFileEntry, ScanEntry, StateStore, SyncConfig, Timeouts,
    WifiControl,
};

pub const DEVICE_SSID: &str = "flashair_engine";
pub const HOME_SSID: &str = "HomeNet";

pub const A: &str = "log_20240101_0800_K01.csv";
pub const B: &str = "log_20240101_0900_K01.csv";
pub const C: &str = "log_20240101_1000_K01.csv";

pub fn name(s: &str) -> LogName {
    s.parse().unwrap()
}

// ── Config fixture ──────────────────────────────────────────────────

pub struct Fixture {
    pub dir: TempDir,
    pub config: SyncConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            device: DeviceConfig {
                ssid: DEVICE_SSID.into(),
                password: SecretString::from("card-pass".to_string()),
                address: "192.168.0.1".into(),
                directory: "/".into(),
            },
            home_ssid: HOME_SSID.into(),
            interface: "wlan0".into(),
            local_dir: dir.path().join("logs"),
            remote: RemoteConfig {
                host: "collector.example".into(),
                user: "pi".into(),
                directory: "/srv/logs".into(),
                identity_file: dir.path().join("id_ed25519"),
            },
            cooldown: Duration::ZERO,
            retention: 10,
            timeouts: Timeouts {
                connect: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
                listing: Duration::from_millis(200),
                download: Duration::from_millis(200),
                transfer: Duration::from_millis(200),
                scan_settle: Duration::ZERO,
                dhcp_settle: Duration::ZERO,
                command: Duration::from_millis(200),
            },
            state_path: dir.path().join("state.toml"),
            lock_path: dir.path().join("flashsync.lock"),
            resync: false,
        };
        Self { dir, config }
    }

    pub fn store(&self) -> StateStore {
        StateStore::load(&self.config.state_path).unwrap()
    }

    pub fn local_names(&self) -> Vec<String> {
        flashsync_core::local_log_files(&self.config.local_dir)
            .unwrap()
            .into_iter()
            .map(|f| f.name.to_string())
            .collect()
    }

    /// Put files in the local directory as if an earlier run downloaded them.
    pub fn seed_local(&self, names: &[&str]) {
        std::fs::create_dir_all(&self.config.local_dir).unwrap();
        for n in names {
            std::fs::write(self.config.local_dir.join(n), b"rpm,temp\n").unwrap();
        }
    }
}

// ── WiFi ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct WifiInner {
    calls: Vec<String>,
    status: LinkStatus,
    visible: Vec<ScanEntry>,
    networks: Vec<ConfiguredNetwork>,
    next_id: NetworkId,
    device_joinable: bool,
    home_joinable: bool,
    scan_fails: bool,
}

/// Simulated `wpa_supplicant`. Every call except `status` is recorded.
#[derive(Debug)]
pub struct FakeWifi {
    inner: Mutex<WifiInner>,
}

fn completed(ssid: &str) -> LinkStatus {
    LinkStatus {
        state: STATE_COMPLETED.into(),
        ssid: Some(ssid.into()),
        ip_address: Some("10.0.0.2".into()),
    }
}

fn scan_entry(ssid: &str, signal_dbm: i32) -> ScanEntry {
    ScanEntry {
        bssid: "e8:e8:b7:00:00:01".into(),
        frequency: 2437,
        signal_dbm,
        flags: "[WPA2-PSK-CCMP][ESS]".into(),
        ssid: ssid.into(),
    }
}

impl FakeWifi {
    /// On the home network, card in range and joinable.
    pub fn home_with_card() -> Self {
        let wifi = Self::home_without_card();
        {
            let mut inner = wifi.inner.lock().unwrap();
            inner.visible.push(scan_entry(DEVICE_SSID, -48));
        }
        wifi
    }

    /// On the home network, card not advertising.
    pub fn home_without_card() -> Self {
        Self {
            inner: Mutex::new(WifiInner {
                status: completed(HOME_SSID),
                visible: vec![scan_entry(HOME_SSID, -60)],
                networks: vec![ConfiguredNetwork {
                    id: 0,
                    ssid: HOME_SSID.into(),
                    flags: "[CURRENT]".into(),
                }],
                next_id: 1,
                device_joinable: true,
                home_joinable: true,
                ..WifiInner::default()
            }),
        }
    }

    /// Still associated with the card, as a crashed run would leave it.
    pub fn stuck_on_card(self) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.status = completed(DEVICE_SSID);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.networks.push(ConfiguredNetwork {
                id,
                ssid: DEVICE_SSID.into(),
                flags: "[CURRENT]".into(),
            });
        }
        self
    }

    pub fn card_never_associates(self) -> Self {
        self.inner.lock().unwrap().device_joinable = false;
        self
    }

    pub fn home_unreachable(self) -> Self {
        self.inner.lock().unwrap().home_joinable = false;
        self
    }

    pub fn scan_fails(self) -> Self {
        self.inner.lock().unwrap().scan_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls whose verb is `verb`.
    pub fn count(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(verb))
            .count()
    }

    /// Calls that change the radio's configuration or association.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                let verb = c.split_whitespace().next().unwrap_or_default();
                matches!(
                    verb,
                    "add_network" | "select_network" | "remove_network" | "reconfigure"
                )
            })
            .collect()
    }

    pub fn status_now(&self) -> LinkStatus {
        self.inner.lock().unwrap().status.clone()
    }

    pub fn profiles(&self) -> Vec<ConfiguredNetwork> {
        self.inner.lock().unwrap().networks.clone()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl WifiControl for FakeWifi {
    async fn scan(&self) -> Result<Vec<ScanEntry>, CoreError> {
        self.record("scan".into());
        let inner = self.inner.lock().unwrap();
        if inner.scan_fails {
            return Err(CoreError::ScanFailed {
                reason: "interface busy".into(),
            });
        }
        Ok(inner.visible.clone())
    }

    async fn add_network(&self, ssid: &str, _psk: &SecretString) -> Result<NetworkId, CoreError> {
        self.record(format!("add_network {ssid}"));
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.networks.push(ConfiguredNetwork {
            id,
            ssid: ssid.into(),
            flags: String::new(),
        });
        Ok(id)
    }

    async fn select_network(&self, id: NetworkId) -> Result<(), CoreError> {
        self.record(format!("select_network {id}"));
        let mut inner = self.inner.lock().unwrap();
        let ssid = inner
            .networks
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.ssid.clone())
            .ok_or_else(|| CoreError::Wifi {
                command: "select_network".into(),
                reason: "FAIL".into(),
            })?;
        inner.status = if ssid == DEVICE_SSID && inner.device_joinable {
            completed(&ssid)
        } else {
            LinkStatus {
                state: "SCANNING".into(),
                ..LinkStatus::default()
            }
        };
        Ok(())
    }

    async fn remove_network(&self, id: NetworkId) -> Result<(), CoreError> {
        self.record(format!("remove_network {id}"));
        let mut inner = self.inner.lock().unwrap();
        inner.networks.retain(|n| n.id != id);
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<ConfiguredNetwork>, CoreError> {
        self.record("list_networks".into());
        Ok(self.inner.lock().unwrap().networks.clone())
    }

    async fn reload_configuration(&self) -> Result<(), CoreError> {
        self.record("reconfigure".into());
        let mut inner = self.inner.lock().unwrap();
        // Runtime profiles vanish; only the persistent home profile remains.
        inner.networks.retain(|n| n.ssid == HOME_SSID);
        inner.status = if inner.home_joinable {
            completed(HOME_SSID)
        } else {
            LinkStatus {
                state: "DISCONNECTED".into(),
                ..LinkStatus::default()
            }
        };
        Ok(())
    }

    async fn status(&self) -> Result<LinkStatus, CoreError> {
        Ok(self.inner.lock().unwrap().status.clone())
    }
}

// ── Card ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DeviceInner {
    files: BTreeMap<LogName, Vec<u8>>,
    failing: HashSet<String>,
    short: HashSet<String>,
    unreachable: bool,
    listing_broken: bool,
    fetched: Vec<String>,
}

/// Simulated card HTTP interface.
#[derive(Debug, Default)]
pub struct FakeDevice {
    inner: Mutex<DeviceInner>,
}

impl FakeDevice {
    pub fn with_files(names: &[&str]) -> Self {
        let device = Self::default();
        for n in names {
            device.add_file(n);
        }
        device
    }

    pub fn add_file(&self, n: &str) {
        let body = format!("time,rpm\n{n},1800\n").into_bytes();
        self.inner.lock().unwrap().files.insert(name(n), body);
    }

    pub fn fail(&self, n: &str) {
        self.inner.lock().unwrap().failing.insert(n.into());
    }

    pub fn heal(&self, n: &str) {
        self.inner.lock().unwrap().failing.remove(n);
    }

    /// Serve only half the bytes of `n`.
    pub fn truncate(&self, n: &str) {
        self.inner.lock().unwrap().short.insert(n.into());
    }

    pub fn unreachable(self) -> Self {
        self.inner.lock().unwrap().unreachable = true;
        self
    }

    pub fn listing_broken(self) -> Self {
        self.inner.lock().unwrap().listing_broken = true;
        self
    }

    /// Files fetched so far, in order, including failed attempts.
    pub fn fetched(&self) -> Vec<String> {
        self.inner.lock().unwrap().fetched.clone()
    }

    pub fn clear_fetched(&self) {
        self.inner.lock().unwrap().fetched.clear();
    }

    pub fn body(&self, n: &str) -> Vec<u8> {
        self.inner.lock().unwrap().files[&name(n)].clone()
    }
}

impl DeviceFiles for FakeDevice {
    async fn probe(&self) -> Result<(), CoreError> {
        if self.inner.lock().unwrap().unreachable {
            return Err(CoreError::RequestFailed {
                message: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn list(&self, directory: &str) -> Result<Vec<RemoteFileEntry>, CoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.listing_broken {
            return Err(CoreError::ListingParse {
                message: "line 1: missing WLANSD_FILELIST header".into(),
            });
        }
        Ok(inner
            .files
            .iter()
            .map(|(name, body)| RemoteFileEntry {
                directory: directory.into(),
                name: name.clone(),
                size: body.len() as u64,
                attributes: 0x20,
                modified: None,
            })
            .collect())
    }

    async fn fetch(
        &self,
        entry: &RemoteFileEntry,
        dest: &Path,
        timeout: Duration,
    ) -> Result<u64, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let file = entry.name.to_string();
        inner.fetched.push(file.clone());
        if inner.failing.contains(&file) {
            return Err(CoreError::DownloadTimeout {
                file,
                timeout_secs: timeout.as_secs(),
            });
        }
        let mut body = inner.files[&entry.name].clone();
        if inner.short.contains(&file) {
            body.truncate(body.len() / 2);
        }
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

// ── Relay ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeRelay {
    failing: Mutex<HashSet<String>>,
    sent: Mutex<Vec<String>>,
}

impl FakeRelay {
    pub fn fail(&self, n: &str) {
        self.failing.lock().unwrap().insert(n.into());
    }

    pub fn heal(&self, n: &str) {
        self.failing.lock().unwrap().remove(n);
    }

    /// Every transfer attempt, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Relay for FakeRelay {
    async fn transfer(&self, file: &LocalFile) -> Result<(), CoreError> {
        let n = file.name.to_string();
        self.sent.lock().unwrap().push(n.clone());
        if self.failing.lock().unwrap().contains(&n) {
            return Err(CoreError::TransferFailed {
                file: n,
                reason: "exit status: 1: Connection timed out".into(),
            });
        }
        assert!(file.path.exists(), "relayed file must exist locally");
        Ok(())
    }
}
