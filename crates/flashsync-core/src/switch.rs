// ── Network switch controller ──
//
// Moves the radio between the home network and the card's access point.
// The card profile is temporary: it is added at runtime and removed on the
// way back, while the home profile is restored by reloading the persistent
// configuration. The moment the radio leaves home, a switch-home
// obligation is armed; `discharge()` honours it exactly once.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::poll::poll_until;
use crate::wifi::{NetworkId, WifiControl};

/// Which network the radio is on, or heading to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum WifiContext {
    Infrastructure,
    SwitchingToDevice,
    OnDevice,
    SwitchingToInfrastructure,
}

/// Switches the radio for one run.
pub struct NetworkSwitch<'a, W> {
    wifi: &'a W,
    config: &'a SyncConfig,
    context: WifiContext,
    temp_network: Option<NetworkId>,
    home_pending: bool,
    home_attempts: u32,
}

impl<'a, W: WifiControl> NetworkSwitch<'a, W> {
    /// Start in `Infrastructure` with no obligation.
    pub fn new(wifi: &'a W, config: &'a SyncConfig) -> Self {
        Self {
            wifi,
            config,
            context: WifiContext::Infrastructure,
            temp_network: None,
            home_pending: false,
            home_attempts: 0,
        }
    }

    pub fn context(&self) -> WifiContext {
        self.context
    }

    /// `true` while a switch home is owed.
    pub fn home_pending(&self) -> bool {
        self.home_pending
    }

    /// How many times `switch_home` has run.
    pub fn home_attempts(&self) -> u32 {
        self.home_attempts
    }

    /// Id of the temporary card profile, if one is installed.
    pub fn temp_network(&self) -> Option<NetworkId> {
        self.temp_network
    }

    fn enter(&mut self, next: WifiContext) {
        debug!(from = %self.context, to = %next, "wifi context");
        if self.context == WifiContext::Infrastructure && next != WifiContext::Infrastructure {
            self.home_pending = true;
        }
        self.context = next;
    }

    /// Associate with the card's access point.
    ///
    /// Succeeds only on confirmed association. The obligation is armed
    /// before the first mutation, so the caller must `discharge()` whatever
    /// this returns.
    pub async fn switch_to_device(&mut self) -> Result<(), CoreError> {
        let config = self.config;
        let device = &config.device;
        self.enter(WifiContext::SwitchingToDevice);

        info!(ssid = %device.ssid, "connecting to card");
        let id = self
            .wifi
            .add_network(&device.ssid, &device.password)
            .await
            .map_err(|e| CoreError::ConnectionFailed {
                ssid: device.ssid.clone(),
                reason: e.to_string(),
            })?;
        self.temp_network = Some(id);

        self.wifi
            .select_network(id)
            .await
            .map_err(|e| CoreError::ConnectionFailed {
                ssid: device.ssid.clone(),
                reason: e.to_string(),
            })?;

        self.wait_for(&device.ssid, config.timeouts.connect).await?;
        self.enter(WifiContext::OnDevice);
        info!(ssid = %device.ssid, "associated with card");
        Ok(())
    }

    /// Return to the home network.
    ///
    /// Removes the temporary card profile plus any stale one a crashed run
    /// left behind, reloads the persistent configuration, and waits for the
    /// home association. Clears the obligation whatever the outcome.
    pub async fn switch_home(&mut self) -> Result<(), CoreError> {
        let config = self.config;
        let home = &config.home_ssid;
        let timeouts = &config.timeouts;
        self.enter(WifiContext::SwitchingToInfrastructure);
        self.home_pending = false;
        self.home_attempts += 1;

        self.remove_card_profiles().await;

        info!(ssid = %home, "reconnecting to home network");
        if let Err(e) = self.wifi.reload_configuration().await {
            // Keep polling: the supplicant may still roam home on its own.
            warn!(error = %e, "reloading wifi configuration failed");
        }

        match self.wait_for(home, timeouts.connect).await {
            Ok(()) => {
                self.context = WifiContext::Infrastructure;
                info!(ssid = %home, "back on home network");
                if !timeouts.dhcp_settle.is_zero() {
                    tokio::time::sleep(timeouts.dhcp_settle).await;
                }
                Ok(())
            }
            Err(e) => {
                let err = CoreError::ReconnectFailure {
                    ssid: home.clone(),
                    reason: e.to_string(),
                };
                error!(
                    kind = err.kind(),
                    ssid = %home,
                    "RECONNECT FAILURE: radio is not back on the home network; next run will retry"
                );
                Err(err)
            }
        }
    }

    /// Heal a radio found off the home network at startup.
    pub async fn recover(&mut self) -> Result<(), CoreError> {
        self.enter(WifiContext::SwitchingToInfrastructure);
        self.switch_home().await
    }

    /// Run `switch_home` if it is owed. `None` when nothing was owed.
    pub async fn discharge(&mut self) -> Option<Result<(), CoreError>> {
        if self.home_pending {
            Some(self.switch_home().await)
        } else {
            None
        }
    }

    async fn remove_card_profiles(&mut self) {
        let mut stale: Vec<NetworkId> = self.temp_network.take().into_iter().collect();
        match self.wifi.list_networks().await {
            Ok(networks) => stale.extend(
                networks
                    .iter()
                    .filter(|n| n.ssid == self.config.device.ssid)
                    .map(|n| n.id),
            ),
            Err(e) => warn!(error = %e, "listing wifi profiles failed"),
        }
        stale.sort_unstable();
        stale.dedup();

        for id in stale {
            match self.wifi.remove_network(id).await {
                Ok(()) => debug!(network_id = id, "removed card profile"),
                Err(e) => warn!(network_id = id, error = %e, "removing card profile failed"),
            }
        }
    }

    async fn wait_for(&self, ssid: &str, timeout: Duration) -> Result<(), CoreError> {
        let wifi = self.wifi;
        poll_until(self.config.timeouts.poll_interval, timeout, || async move {
            match wifi.status().await {
                Ok(status) if status.is_associated_with(ssid) => Some(()),
                Ok(status) => {
                    debug!(state = %status.state, ssid = ?status.ssid, "waiting for association");
                    None
                }
                Err(e) => {
                    debug!(error = %e, "status query failed while waiting");
                    None
                }
            }
        })
        .await
        .map_err(|_| CoreError::ConnectionTimeout {
            ssid: ssid.to_owned(),
            timeout_secs: timeout.as_secs(),
        })
    }
}
