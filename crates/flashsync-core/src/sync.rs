// ── Run orchestrator ──
//
// One invocation, start to finish:
//
//   lock → heal → scan → [switch to card → wait for HTTP → list →
//   download] → switch home → relay → prune
//
// The bracketed device phase may fail at any step; whatever happens,
// `NetworkSwitch::discharge()` runs right after it, so a run that left the
// home network always tries to get back before doing anything else.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::device::DeviceFiles;
use crate::download::{DownloadSummary, download_new};
use crate::error::CoreError;
use crate::lock::{LockError, RunLock};
use crate::poll::poll_until;
use crate::relay::{Relay, RelaySummary, relay_pending};
use crate::retention::{RetentionSummary, prune};
use crate::scan::{ScanDecision, ScanProbe};
use crate::state::StateStore;
use crate::switch::NetworkSwitch;
use crate::wifi::WifiControl;

/// Steps of a run, in the order they can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RunPhase {
    Idle,
    LockAcquired,
    /// Radio found off the home network at startup.
    Recovering,
    Scanning,
    /// Card absent or cooling down; device phase skipped.
    ShortCircuit,
    DeviceDetected,
    SwitchedToDevice,
    Listed,
    Downloaded,
    SwitchedHome,
    Relayed,
    Cleaned,
    Done,
}

/// What happened with the card this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeviceVisit {
    /// Listed and downloaded; per-file failures are in the report.
    Synced,
    Absent,
    CoolingDown,
    /// The device phase aborted (association, readiness or listing).
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run holds the lock; nothing was done.
    LockHeld,
    Completed { device: DeviceVisit },
    /// The radio could not be brought back to the home network.
    Stranded,
}

/// Everything one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub phases: Vec<RunPhase>,
    pub download: Option<DownloadSummary>,
    pub relay: Option<RelaySummary>,
    pub retention: Option<RetentionSummary>,
    /// How many times the radio was sent home (0 or 1).
    pub switch_home_attempts: u32,
}

impl RunReport {
    fn new() -> Self {
        Self {
            outcome: RunOutcome::LockHeld,
            phases: vec![RunPhase::Idle],
            download: None,
            relay: None,
            retention: None,
            switch_home_attempts: 0,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(phase = %phase, "run phase");
        self.phases.push(phase);
    }

    fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self.enter(RunPhase::Done);
        self
    }

    /// Whether the run went through `phase`.
    pub fn visited(&self, phase: RunPhase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Drives one sync run against its collaborators.
pub struct Syncer<'a, W, D, R> {
    config: &'a SyncConfig,
    wifi: &'a W,
    device: &'a D,
    relay: &'a R,
}

impl<'a, W, D, R> Syncer<'a, W, D, R>
where
    W: WifiControl,
    D: DeviceFiles,
    R: Relay,
{
    pub fn new(config: &'a SyncConfig, wifi: &'a W, device: &'a D, relay: &'a R) -> Self {
        Self {
            config,
            wifi,
            device,
            relay,
        }
    }

    /// Run once, using the wall clock for cooldown decisions.
    pub async fn run(&self) -> Result<RunReport, CoreError> {
        self.run_at(Utc::now()).await
    }

    /// Run once as if the current time were `now`.
    ///
    /// Returns `Err` only for failures that leave nothing to recover: lock
    /// I/O, state file, status or scan errors before any network change.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport, CoreError> {
        let config = self.config;
        let mut report = RunReport::new();

        let _lock = match RunLock::acquire(&config.lock_path) {
            Ok(lock) => lock,
            Err(LockError::AlreadyHeld { path }) => {
                debug!(path = %path.display(), "another run is active, exiting");
                report.outcome = RunOutcome::LockHeld;
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };
        report.enter(RunPhase::LockAcquired);

        let mut store = StateStore::load(&config.state_path)?;
        let mut switch = NetworkSwitch::new(self.wifi, config);

        let status = self.wifi.status().await?;
        if !status.is_associated_with(&config.home_ssid) {
            report.enter(RunPhase::Recovering);
            warn!(
                state = %status.state,
                ssid = ?status.ssid,
                "radio is not on the home network, recovering"
            );
            let healed = switch.recover().await;
            report.switch_home_attempts = switch.home_attempts();
            if healed.is_err() {
                return Ok(report.finish(RunOutcome::Stranded));
            }
        }

        report.enter(RunPhase::Scanning);
        let probe = ScanProbe::new(self.wifi, config);
        let visit = match probe.decide(&mut store, now).await? {
            ScanDecision::CoolingDown { remaining } => {
                info!(
                    remaining_mins = remaining.as_secs().div_ceil(60),
                    "card checked recently, skipping"
                );
                report.enter(RunPhase::ShortCircuit);
                DeviceVisit::CoolingDown
            }
            ScanDecision::Absent => {
                info!(ssid = %config.device.ssid, "card not in range");
                report.enter(RunPhase::ShortCircuit);
                DeviceVisit::Absent
            }
            ScanDecision::Present { .. } => {
                report.enter(RunPhase::DeviceDetected);
                let session = self
                    .device_phase(&mut switch, &mut store, &mut report)
                    .await;

                let home = switch.discharge().await;
                report.switch_home_attempts = switch.home_attempts();
                if let Some(home) = home {
                    report.enter(RunPhase::SwitchedHome);
                    if home.is_err() {
                        return Ok(report.finish(RunOutcome::Stranded));
                    }
                }

                match session {
                    Ok(clean) => {
                        if clean {
                            store.record_device_sync(now)?;
                        }
                        DeviceVisit::Synced
                    }
                    Err(e @ CoreError::State { .. }) => return Err(e),
                    Err(e) => {
                        error!(kind = e.kind(), error = %e, "device phase aborted");
                        DeviceVisit::Failed
                    }
                }
            }
        };

        let relayed = relay_pending(self.relay, &config.local_dir, &mut store).await?;
        report.relay = Some(relayed);
        report.enter(RunPhase::Relayed);

        report.retention = Some(prune(&config.local_dir, config.retention, store.state()));
        report.enter(RunPhase::Cleaned);

        Ok(report.finish(RunOutcome::Completed { device: visit }))
    }

    /// Switch to the card and download. `Ok(true)` when every file made it.
    async fn device_phase(
        &self,
        switch: &mut NetworkSwitch<'a, W>,
        store: &mut StateStore,
        report: &mut RunReport,
    ) -> Result<bool, CoreError> {
        let config = self.config;

        switch.switch_to_device().await?;
        report.enter(RunPhase::SwitchedToDevice);

        self.wait_for_http().await?;

        let entries = self.device.list(&config.device.directory).await?;
        info!(
            count = entries.len(),
            directory = %config.device.directory,
            "listed logs on card"
        );
        report.enter(RunPhase::Listed);

        let summary = download_new(
            self.device,
            &entries,
            &config.local_dir,
            config.timeouts.download,
            config.resync,
            store,
        )
        .await?;
        report.enter(RunPhase::Downloaded);

        let clean = !summary.has_failures();
        report.download = Some(summary);
        Ok(clean)
    }

    /// The card associates before its web server is up.
    async fn wait_for_http(&self) -> Result<(), CoreError> {
        let config = self.config;
        let device = self.device;
        poll_until(
            config.timeouts.poll_interval,
            config.timeouts.connect,
            || async move { device.probe().await.ok() },
        )
        .await
        .map_err(|_| CoreError::DeviceUnreachable {
            address: config.device.address.clone(),
            timeout_secs: config.timeouts.connect.as_secs(),
        })
    }
}
