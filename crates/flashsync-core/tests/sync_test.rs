// End-to-end runs of `Syncer` against in-memory collaborators.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use pretty_assertions::assert_eq;

use common::{A, B, C, FakeDevice, FakeRelay, FakeWifi, Fixture, name};
use flashsync_core::{CoreError, DeviceVisit, RunLock, RunOutcome, RunPhase, RunReport, Syncer};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

async fn run(
    fx: &Fixture,
    wifi: &FakeWifi,
    device: &FakeDevice,
    relay: &FakeRelay,
    at: DateTime<Utc>,
) -> RunReport {
    Syncer::new(&fx.config, wifi, device, relay)
        .run_at(at)
        .await
        .unwrap()
}

fn completed(device: DeviceVisit) -> RunOutcome {
    RunOutcome::Completed { device }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_card_downloads_everything_in_order() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[C, A, B]);
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
    assert_eq!(device.fetched(), [A, B, C]);
    assert_eq!(fx.store().state().last_synced, Some(name(C)));
    assert_eq!(fx.local_names(), [A, B, C]);
    assert_eq!(
        std::fs::read(fx.config.local_dir.join(B)).unwrap(),
        device.body(B)
    );
    assert_eq!(
        report.phases,
        [
            RunPhase::Idle,
            RunPhase::LockAcquired,
            RunPhase::Scanning,
            RunPhase::DeviceDetected,
            RunPhase::SwitchedToDevice,
            RunPhase::Listed,
            RunPhase::Downloaded,
            RunPhase::SwitchedHome,
            RunPhase::Relayed,
            RunPhase::Cleaned,
            RunPhase::Done,
        ]
    );
    assert_eq!(relay.attempts(), [A, B, C]);
    assert_eq!(fx.store().state().last_relayed, Some(name(C)));
}

#[tokio::test]
async fn failed_download_holds_watermark_and_is_retried() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B, C]);
    let relay = FakeRelay::default();
    device.fail(B);

    let report = run(&fx, &wifi, &device, &relay, t0()).await;
    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
    let download = report.download.unwrap();
    assert_eq!(download.downloaded, [name(A), name(C)]);
    assert_eq!(download.failed.len(), 1);
    assert_eq!(fx.store().state().last_synced, Some(name(A)));

    device.heal(B);
    device.clear_fetched();
    run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(device.fetched(), [B, C]);
    assert_eq!(fx.store().state().last_synced, Some(name(C)));
    assert_eq!(fx.local_names(), [A, B, C]);
}

#[tokio::test]
async fn absent_card_short_circuits_without_touching_the_radio() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_without_card();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    let started = Instant::now();
    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.outcome, completed(DeviceVisit::Absent));
    assert!(report.visited(RunPhase::ShortCircuit));
    assert!(!report.visited(RunPhase::SwitchedToDevice));
    assert!(wifi.mutations().is_empty(), "{:?}", wifi.calls());
    assert!(device.fetched().is_empty());
    assert_eq!(report.switch_home_attempts, 0);
    assert_eq!(fx.store().state().last_absent, Some(t0()));
}

#[tokio::test]
async fn relay_failure_only_resends_the_failed_file() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_without_card();
    let device = FakeDevice::default();
    let relay = FakeRelay::default();
    fx.seed_local(&[A, B]);
    fx.store().commit_synced(&name(B)).unwrap();
    relay.fail(A);

    run(&fx, &wifi, &device, &relay, t0()).await;
    let state = fx.store().state().clone();
    assert_eq!(state.last_relayed, None);
    assert!(state.is_relayed(&name(B)));
    assert!(!state.is_relayed(&name(A)));

    relay.heal(A);
    relay.clear();
    run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(relay.attempts(), [A]);
    let state = fx.store().state().clone();
    assert_eq!(state.last_relayed, Some(name(B)));
    assert!(state.relayed_ahead.is_empty());
}

// ── Properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_without_new_files_changes_nothing() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B]);
    let relay = FakeRelay::default();

    run(&fx, &wifi, &device, &relay, t0()).await;
    let state_before = fx.store().state().clone();
    let local_before = fx.local_names();
    device.clear_fetched();
    relay.clear();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
    assert!(device.fetched().is_empty());
    assert!(relay.attempts().is_empty());
    assert_eq!(fx.local_names(), local_before);
    let state_after = fx.store().state().clone();
    assert_eq!(state_after.last_synced, state_before.last_synced);
    assert_eq!(state_after.last_relayed, state_before.last_relayed);
}

#[tokio::test]
async fn watermark_only_moves_forward_across_runs() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    let mut seen = Vec::new();
    for next in [B, C] {
        run(&fx, &wifi, &device, &relay, t0()).await;
        seen.push(fx.store().state().last_synced.clone().unwrap());
        device.add_file(next);
    }
    run(&fx, &wifi, &device, &relay, t0()).await;
    seen.push(fx.store().state().last_synced.clone().unwrap());

    assert_eq!(seen, [name(A), name(B), name(C)]);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn resync_refetches_without_regressing_the_watermark() {
    let mut fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B, C]);
    let relay = FakeRelay::default();

    run(&fx, &wifi, &device, &relay, t0()).await;
    device.clear_fetched();
    device.fail(A);
    fx.config.resync = true;

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(device.fetched(), [A, B, C]);
    assert_eq!(report.download.unwrap().downloaded, [name(B), name(C)]);
    assert_eq!(fx.store().state().last_synced, Some(name(C)));
}

#[tokio::test]
async fn held_lock_means_no_work_at_all() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    let _held = RunLock::acquire(&fx.config.lock_path).unwrap();
    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, RunOutcome::LockHeld);
    assert_eq!(report.phases, [RunPhase::Idle]);
    assert!(wifi.calls().is_empty());
    assert!(device.fetched().is_empty());
    assert!(!fx.config.state_path.exists());
    assert!(!fx.config.local_dir.exists());
}

#[tokio::test]
async fn lock_is_free_again_after_a_run() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_without_card();
    let device = FakeDevice::default();
    let relay = FakeRelay::default();

    run(&fx, &wifi, &device, &relay, t0()).await;
    assert!(RunLock::acquire(&fx.config.lock_path).is_ok());
}

#[tokio::test]
async fn retention_keeps_newest_after_relay() {
    let mut fx = Fixture::new();
    fx.config.retention = 2;
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B, C]);
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(relay.attempts(), [A, B, C]);
    assert_eq!(fx.local_names(), [B, C]);
    assert_eq!(report.retention.unwrap().deleted, [name(A)]);
}

#[tokio::test]
async fn truncated_download_leaves_no_partial_file() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B]);
    let relay = FakeRelay::default();
    device.truncate(B);

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    let download = report.download.unwrap();
    assert_eq!(download.failed[0].0, name(B));
    assert_eq!(fx.local_names(), [A]);
    let leftovers: Vec<_> = std::fs::read_dir(&fx.config.local_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "{leftovers:?}");
}

// ── Cooldown ────────────────────────────────────────────────────────

#[tokio::test]
async fn absent_card_starts_cooldown() {
    let mut fx = Fixture::new();
    fx.config.cooldown = Duration::from_secs(30 * 60);
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    run(&fx, &FakeWifi::home_without_card(), &device, &relay, t0()).await;

    let wifi = FakeWifi::home_with_card();
    let report = run(&fx, &wifi, &device, &relay, t0() + TimeDelta::minutes(10)).await;
    assert_eq!(report.outcome, completed(DeviceVisit::CoolingDown));
    assert!(wifi.calls().is_empty(), "{:?}", wifi.calls());

    let report = run(&fx, &wifi, &device, &relay, t0() + TimeDelta::minutes(31)).await;
    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
}

#[tokio::test]
async fn clean_device_session_starts_cooldown_unless_resyncing() {
    let mut fx = Fixture::new();
    fx.config.cooldown = Duration::from_secs(30 * 60);
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    run(&fx, &wifi, &device, &relay, t0()).await;
    assert_eq!(fx.store().state().last_device_sync, Some(t0()));

    let later = t0() + TimeDelta::minutes(5);
    let report = run(&fx, &wifi, &device, &relay, later).await;
    assert_eq!(report.outcome, completed(DeviceVisit::CoolingDown));

    fx.config.resync = true;
    let report = run(&fx, &wifi, &device, &relay, later).await;
    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
}

#[tokio::test]
async fn session_with_failures_does_not_start_cooldown() {
    let mut fx = Fixture::new();
    fx.config.cooldown = Duration::from_secs(30 * 60);
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B]);
    let relay = FakeRelay::default();
    device.fail(B);

    run(&fx, &wifi, &device, &relay, t0()).await;
    assert_eq!(fx.store().state().last_device_sync, None);

    device.heal(B);
    let report = run(&fx, &wifi, &device, &relay, t0() + TimeDelta::minutes(5)).await;
    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
    assert_eq!(fx.store().state().last_synced, Some(name(B)));
}

#[tokio::test]
async fn clock_stepped_back_does_not_hold_cooldown() {
    let mut fx = Fixture::new();
    fx.config.cooldown = Duration::from_secs(30 * 60);
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    run(&fx, &FakeWifi::home_without_card(), &device, &relay, t0()).await;

    let wifi = FakeWifi::home_with_card();
    let report = run(&fx, &wifi, &device, &relay, t0() - TimeDelta::hours(2)).await;
    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
}

// ── Guaranteed switch home ──────────────────────────────────────────

fn assert_back_home(wifi: &FakeWifi, report: &RunReport) {
    assert_eq!(report.switch_home_attempts, 1);
    assert_eq!(wifi.count("reconfigure"), 1, "{:?}", wifi.calls());
    assert_eq!(wifi.status_now().ssid.as_deref(), Some(common::HOME_SSID));
    assert!(
        wifi.profiles().iter().all(|p| p.ssid != common::DEVICE_SSID),
        "{:?}",
        wifi.profiles()
    );
    assert_eq!(
        report
            .phases
            .iter()
            .filter(|p| **p == RunPhase::SwitchedHome)
            .count(),
        1
    );
}

#[tokio::test]
async fn association_timeout_still_switches_home() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card().card_never_associates();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Failed));
    assert!(!report.visited(RunPhase::SwitchedToDevice));
    assert_back_home(&wifi, &report);
    assert!(device.fetched().is_empty());
}

#[tokio::test]
async fn unreachable_http_server_still_switches_home() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A]).unreachable();
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Failed));
    assert!(report.visited(RunPhase::SwitchedToDevice));
    assert!(!report.visited(RunPhase::Listed));
    assert_back_home(&wifi, &report);
}

#[tokio::test]
async fn broken_listing_still_switches_home_and_relays_backlog() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[B]).listing_broken();
    let relay = FakeRelay::default();
    fx.seed_local(&[A]);
    fx.store().commit_synced(&name(A)).unwrap();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Failed));
    assert!(!report.visited(RunPhase::Listed));
    assert_back_home(&wifi, &report);
    assert_eq!(relay.attempts(), [A]);
}

#[tokio::test]
async fn per_file_failures_switch_home_once() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card();
    let device = FakeDevice::with_files(&[A, B, C]);
    let relay = FakeRelay::default();
    device.fail(A);
    device.fail(C);

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Synced));
    assert_back_home(&wifi, &report);
}

#[tokio::test]
async fn failing_to_get_home_is_stranded() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card().home_unreachable();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, RunOutcome::Stranded);
    assert_eq!(report.switch_home_attempts, 1);
    assert_eq!(wifi.count("reconfigure"), 1);
    assert!(relay.attempts().is_empty());
    // The download itself was committed before the switch back.
    assert_eq!(fx.store().state().last_synced, Some(name(A)));
}

// ── Startup recovery ────────────────────────────────────────────────

#[tokio::test]
async fn run_left_on_card_is_healed_first() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_without_card().stuck_on_card();
    let device = FakeDevice::default();
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, completed(DeviceVisit::Absent));
    assert_eq!(
        &report.phases[..4],
        [
            RunPhase::Idle,
            RunPhase::LockAcquired,
            RunPhase::Recovering,
            RunPhase::Scanning,
        ]
    );
    assert_eq!(report.switch_home_attempts, 1);
    assert_eq!(wifi.count("reconfigure"), 1);
    assert_eq!(wifi.profiles().len(), 1);
}

#[tokio::test]
async fn unhealable_radio_is_stranded_before_scanning() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card().stuck_on_card().home_unreachable();
    let device = FakeDevice::with_files(&[A]);
    let relay = FakeRelay::default();

    let report = run(&fx, &wifi, &device, &relay, t0()).await;

    assert_eq!(report.outcome, RunOutcome::Stranded);
    assert!(!report.visited(RunPhase::Scanning));
    assert_eq!(wifi.count("scan"), 0);
    assert!(device.fetched().is_empty());
}

#[tokio::test]
async fn scan_failure_is_a_hard_error_without_mutations() {
    let fx = Fixture::new();
    let wifi = FakeWifi::home_with_card().scan_fails();
    let device = FakeDevice::default();
    let relay = FakeRelay::default();

    let err = Syncer::new(&fx.config, &wifi, &device, &relay)
        .run_at(t0())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ScanFailed { .. }), "{err:?}");
    assert!(wifi.mutations().is_empty());
}
