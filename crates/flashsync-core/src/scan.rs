// ── Scan probe ──
//
// Decides whether this run should touch the card at all. Inside the
// cooldown window nothing is scanned; otherwise one scan answers "is the
// card's access point up?".

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::state::{StateStore, SyncState};
use crate::wifi::WifiControl;

/// Outcome of the scan phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// The card was seen absent or synced recently; no scan was made.
    CoolingDown { remaining: Duration },
    /// Scan ran and the card's SSID was not in it.
    Absent,
    /// The card is advertising. Strongest reported signal, if any.
    Present { signal_dbm: Option<i32> },
}

pub struct ScanProbe<'a, W> {
    wifi: &'a W,
    config: &'a SyncConfig,
}

impl<'a, W: WifiControl> ScanProbe<'a, W> {
    pub fn new(wifi: &'a W, config: &'a SyncConfig) -> Self {
        Self { wifi, config }
    }

    /// SSIDs visible right now. Hidden networks are left out.
    pub async fn visible_networks(&self) -> Result<HashSet<String>, CoreError> {
        let entries = self.wifi.scan().await?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.ssid.is_empty())
            .map(|e| e.ssid)
            .collect())
    }

    /// Time left in the cooldown window at `now`, if it is still open.
    ///
    /// A timestamp in the future (clock stepped back) does not hold the
    /// window open.
    pub fn cooldown_remaining(&self, state: &SyncState, now: DateTime<Utc>) -> Option<Duration> {
        let anchor = state.cooldown_anchor()?;
        let elapsed = (now - anchor).to_std().ok()?;
        self.config.cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Cooldown check, then scan. Records `last_absent` when the card is
    /// not found. `--resync` bypasses the cooldown.
    pub async fn decide(
        &self,
        store: &mut StateStore,
        now: DateTime<Utc>,
    ) -> Result<ScanDecision, CoreError> {
        let ssid = &self.config.device.ssid;

        if !self.config.resync {
            if let Some(remaining) = self.cooldown_remaining(store.state(), now) {
                debug!(
                    remaining_secs = remaining.as_secs(),
                    "in cooldown, skipping scan"
                );
                return Ok(ScanDecision::CoolingDown { remaining });
            }
        }

        let entries = self.wifi.scan().await?;
        let signal = entries
            .iter()
            .filter(|e| &e.ssid == ssid)
            .map(|e| e.signal_dbm)
            .max();

        if entries.iter().any(|e| &e.ssid == ssid) {
            info!(ssid = %ssid, signal_dbm = ?signal, "card in range");
            Ok(ScanDecision::Present { signal_dbm: signal })
        } else {
            debug!(ssid = %ssid, visible = entries.len(), "card not in range");
            store.record_absent(now)?;
            Ok(ScanDecision::Absent)
        }
    }
}
