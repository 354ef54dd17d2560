// ── Relay uploader ──
//
// Pushes downloaded logs to the collector, oldest first, with the same
// per-file commit discipline as the downloader. `last_relayed` covers a
// gap-free prefix and never passes `last_synced`, since an older file may
// still arrive from the card. Files that go through above either gap are
// remembered in the relayed-ahead set so a rerun only resends what is
// missing.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, error, info};

use flashsync_api::LogName;

use crate::config::RemoteConfig;
use crate::error::CoreError;
use crate::local::{LocalFile, local_log_files};
use crate::state::StateStore;

/// Moves one local file to the collector.
#[allow(async_fn_in_trait)]
pub trait Relay {
    async fn transfer(&self, file: &LocalFile) -> Result<(), CoreError>;
}

/// [`Relay`] over `scp` with key-based, non-interactive auth.
#[derive(Debug, Clone)]
pub struct ScpRelay {
    program: PathBuf,
    remote: RemoteConfig,
    timeout: Duration,
}

impl ScpRelay {
    pub fn new(remote: RemoteConfig, timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("scp"),
            remote,
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// `user@host:dir/name`
    pub fn destination(&self, name: &LogName) -> String {
        let dir = self.remote.directory.trim_end_matches('/');
        format!("{}@{}:{dir}/{name}", self.remote.user, self.remote.host)
    }

    /// Full argument list for one transfer.
    pub fn args(&self, file: &LocalFile) -> Vec<OsString> {
        vec![
            "-i".into(),
            self.remote.identity_file.clone().into_os_string(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
            "-o".into(),
            "ConnectTimeout=10".into(),
            file.path.clone().into_os_string(),
            self.destination(&file.name).into(),
        ]
    }
}

impl Relay for ScpRelay {
    async fn transfer(&self, file: &LocalFile) -> Result<(), CoreError> {
        let failed = |reason: String| CoreError::TransferFailed {
            file: file.name.to_string(),
            reason,
        };

        info!(file = %file.name, host = %self.remote.host, "relaying");
        let child = Command::new(&self.program)
            .args(self.args(file))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Err(_) => {
                return Err(failed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(failed(format!("{}: {}", output.status, stderr.trim())))
        }
    }
}

/// What one relay pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    pub relayed: Vec<LogName>,
    pub failed: Vec<(LogName, String)>,
}

/// Relay every local log the collector has not seen yet.
///
/// Transfer failures are collected in the summary; later files are still
/// attempted. Only local listing and state errors abort the pass.
pub async fn relay_pending<R: Relay>(
    relay: &R,
    local_dir: &Path,
    store: &mut StateStore,
) -> Result<RelaySummary, CoreError> {
    let mut summary = RelaySummary::default();

    let candidates: Vec<LocalFile> = local_log_files(local_dir)?
        .into_iter()
        .filter(|f| {
            store
                .state()
                .last_relayed
                .as_ref()
                .is_none_or(|w| &f.name > w)
        })
        .collect();

    let pending = candidates
        .iter()
        .filter(|f| !store.state().relayed_ahead.contains(&f.name))
        .count();
    if pending == 0 {
        debug!("no files pending relay");
    } else {
        info!(count = pending, "files pending relay");
    }

    let mut blocked = false;
    for file in &candidates {
        let held = blocked || store.state().needs_download(&file.name);
        if store.state().relayed_ahead.contains(&file.name) {
            if !held {
                store.commit_relayed(&file.name)?;
            }
            continue;
        }

        match relay.transfer(file).await {
            Ok(()) => {
                if held {
                    store.mark_relayed_ahead(&file.name)?;
                } else {
                    store.commit_relayed(&file.name)?;
                }
                summary.relayed.push(file.name.clone());
            }
            Err(e) => {
                error!(file = %file.name, kind = e.kind(), error = %e, "relay failed");
                blocked = true;
                summary.failed.push((file.name.clone(), e.to_string()));
            }
        }
    }

    if pending > 0 {
        info!(
            relayed = summary.relayed.len(),
            failed = summary.failed.len(),
            "relay pass finished"
        );
    }
    Ok(summary)
}
