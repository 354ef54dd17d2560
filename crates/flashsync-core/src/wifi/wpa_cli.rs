// wpa_cli driver
//
// Each operation shells out to `wpa_cli -i <iface> <command>` with a hard
// timeout. Replies are plain text: `OK`, `FAIL`, a bare integer, or
// tab/`=` separated tables, parsed by the free functions below so they can
// be tested without a radio.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::{ConfiguredNetwork, LinkStatus, NetworkId, ScanEntry, WifiControl};
use crate::error::CoreError;

/// `wpa_supplicant` driver over the `wpa_cli` binary.
#[derive(Debug, Clone)]
pub struct WpaCli {
    program: PathBuf,
    interface: String,
    command_timeout: Duration,
    scan_settle: Duration,
}

impl WpaCli {
    pub fn new(interface: impl Into<String>, command_timeout: Duration, scan_settle: Duration) -> Self {
        Self {
            program: PathBuf::from("wpa_cli"),
            interface: interface.into(),
            command_timeout,
            scan_settle,
        }
    }

    /// Use a different `wpa_cli` binary (e.g. an absolute path under cron).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Run one command and return its stdout.
    async fn run(&self, args: &[&str]) -> Result<String, CoreError> {
        // Only the verb is logged: set_network arguments carry the passphrase.
        let verb = args.first().copied().unwrap_or_default();
        trace!(interface = %self.interface, command = verb, "wpa_cli");

        let child = Command::new(&self.program)
            .arg("-i")
            .arg(&self.interface)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.command_timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CoreError::Wifi {
                    command: verb.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(CoreError::Wifi {
                    command: verb.into(),
                    reason: format!("timed out after {}s", self.command_timeout.as_secs()),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Wifi {
                command: verb.into(),
                reason: format!("{}: {}", output.status, first_line(&stderr, &stdout)),
            });
        }
        Ok(stdout)
    }

    /// Run a command whose only success reply is `OK`.
    async fn run_ok(&self, args: &[&str]) -> Result<(), CoreError> {
        let reply = self.run(args).await?;
        if reply.trim() == "OK" {
            Ok(())
        } else {
            Err(CoreError::Wifi {
                command: args.first().copied().unwrap_or_default().into(),
                reason: format!("unexpected reply {:?}", reply.trim()),
            })
        }
    }

    async fn set_network(&self, id: &str, key: &str, value: &str) -> Result<(), CoreError> {
        self.run_ok(&["set_network", id, key, value]).await
    }
}

impl WifiControl for WpaCli {
    async fn scan(&self) -> Result<Vec<ScanEntry>, CoreError> {
        let reply = self.run(&["scan"]).await.map_err(|e| CoreError::ScanFailed {
            reason: e.to_string(),
        })?;
        match reply.trim() {
            "OK" => {}
            // A scan is already running; its results are just as good.
            "FAIL-BUSY" => debug!("scan already in progress"),
            other => {
                return Err(CoreError::ScanFailed {
                    reason: format!("scan trigger replied {other:?}"),
                });
            }
        }

        tokio::time::sleep(self.scan_settle).await;

        let table = self
            .run(&["scan_results"])
            .await
            .map_err(|e| CoreError::ScanFailed {
                reason: e.to_string(),
            })?;
        Ok(parse_scan_results(&table))
    }

    async fn add_network(&self, ssid: &str, psk: &SecretString) -> Result<NetworkId, CoreError> {
        let reply = self.run(&["add_network"]).await?;
        let id = parse_network_id(&reply).ok_or_else(|| CoreError::Wifi {
            command: "add_network".into(),
            reason: format!("unexpected reply {:?}", reply.trim()),
        })?;
        let id_str = id.to_string();

        let configured = async {
            self.set_network(&id_str, "ssid", &quoted(ssid)).await?;
            self.set_network(&id_str, "psk", &quoted(psk.expose_secret()))
                .await
        }
        .await;

        if let Err(e) = configured {
            // Don't leave a half-configured block behind.
            if let Err(cleanup) = self.remove_network(id).await {
                warn!(network_id = id, error = %cleanup, "failed to remove half-added network");
            }
            return Err(e);
        }
        Ok(id)
    }

    async fn select_network(&self, id: NetworkId) -> Result<(), CoreError> {
        self.run_ok(&["select_network", &id.to_string()]).await
    }

    async fn remove_network(&self, id: NetworkId) -> Result<(), CoreError> {
        self.run_ok(&["remove_network", &id.to_string()]).await
    }

    async fn list_networks(&self) -> Result<Vec<ConfiguredNetwork>, CoreError> {
        let table = self.run(&["list_networks"]).await?;
        Ok(parse_list_networks(&table))
    }

    async fn reload_configuration(&self) -> Result<(), CoreError> {
        self.run_ok(&["reconfigure"]).await
    }

    async fn status(&self) -> Result<LinkStatus, CoreError> {
        let reply = self.run(&["status"]).await?;
        Ok(parse_status(&reply))
    }
}

fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

fn first_line<'a>(primary: &'a str, fallback: &'a str) -> &'a str {
    primary
        .lines()
        .chain(fallback.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
}

// ── Reply parsers ────────────────────────────────────────────────────

/// Parse the id printed by `add_network` (last non-empty line).
pub fn parse_network_id(reply: &str) -> Option<NetworkId> {
    reply
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .and_then(|l| l.parse().ok())
}

/// Parse `scan_results`:
///
/// ```text
/// bssid / frequency / signal level / flags / ssid
/// e8:e8:b7:00:00:01	2437	-52	[WPA2-PSK-CCMP][ESS]	FlashAir
/// ```
///
/// Rows with an empty SSID (hidden networks) are kept; malformed rows are
/// dropped.
pub fn parse_scan_results(table: &str) -> Vec<ScanEntry> {
    table
        .lines()
        .skip_while(|l| !l.starts_with("bssid"))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.splitn(5, '\t');
            let bssid = cols.next()?.trim();
            let frequency = cols.next()?.trim().parse().ok()?;
            let signal_dbm = cols.next()?.trim().parse().ok()?;
            let flags = cols.next()?.trim();
            let ssid = cols.next().unwrap_or_default();
            Some(ScanEntry {
                bssid: bssid.to_owned(),
                frequency,
                signal_dbm,
                flags: flags.to_owned(),
                ssid: ssid.to_owned(),
            })
        })
        .collect()
}

/// Parse `status` `key=value` lines.
pub fn parse_status(reply: &str) -> LinkStatus {
    let mut status = LinkStatus::default();
    for line in reply.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "wpa_state" => value.trim().clone_into(&mut status.state),
            "ssid" => status.ssid = Some(value.to_owned()),
            "ip_address" => status.ip_address = Some(value.trim().to_owned()),
            _ => {}
        }
    }
    status
}

/// Parse `list_networks`:
///
/// ```text
/// network id / ssid / bssid / flags
/// 0	HomeNet	any	[CURRENT]
/// ```
pub fn parse_list_networks(table: &str) -> Vec<ConfiguredNetwork> {
    table
        .lines()
        .skip_while(|l| !l.starts_with("network id"))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let id = cols.next()?.trim().parse().ok()?;
            let ssid = cols.next()?.to_owned();
            let _bssid = cols.next();
            let flags = cols.next().unwrap_or_default().trim().to_owned();
            Some(ConfiguredNetwork { id, ssid, flags })
        })
        .collect()
}
