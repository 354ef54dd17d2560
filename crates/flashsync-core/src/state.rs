// ── Persisted sync state ──
//
// Watermarks and cooldown timestamps survive between runs in a small TOML
// file next to the configuration. Every mutation is written through at
// once (temp file + rename), so a crash between two files never loses a
// commit that already happened.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flashsync_api::LogName;

use crate::error::CoreError;

/// Everything a run needs to remember for the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Newest file downloaded with no gap before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<LogName>,

    /// Newest file relayed with no gap before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_relayed: Option<LogName>,

    /// Files relayed above `last_relayed` while an older one failed.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub relayed_ahead: BTreeSet<LogName>,

    /// Last time the scan confirmed the card absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_absent: Option<DateTime<Utc>>,

    /// Last time a card session finished without per-file failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_device_sync: Option<DateTime<Utc>>,
}

impl SyncState {
    /// `true` if `name` is strictly newer than the download watermark.
    pub fn needs_download(&self, name: &LogName) -> bool {
        self.last_synced.as_ref().is_none_or(|w| name > w)
    }

    /// `true` if `name` has already reached the collector.
    pub fn is_relayed(&self, name: &LogName) -> bool {
        self.last_relayed.as_ref().is_some_and(|w| name <= w) || self.relayed_ahead.contains(name)
    }

    /// Most recent cooldown-starting event.
    pub fn cooldown_anchor(&self) -> Option<DateTime<Utc>> {
        self.last_absent.max(self.last_device_sync)
    }
}

/// File-backed [`SyncState`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: SyncState,
}

impl StateStore {
    /// Load state from `path`; a missing file is a fresh start.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|e| CoreError::State {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file yet");
                SyncState::default()
            }
            Err(e) => {
                return Err(CoreError::State {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advance the download watermark to `name` if that moves it forward.
    ///
    /// Returns whether the watermark moved. Never moves it backwards.
    pub fn commit_synced(&mut self, name: &LogName) -> Result<bool, CoreError> {
        if !self.state.needs_download(name) {
            return Ok(false);
        }
        self.state.last_synced = Some(name.clone());
        self.persist()?;
        info!(watermark = %name, "updated last_synced");
        Ok(true)
    }

    /// Advance the relay watermark to `name`, absorbing ahead entries it passes.
    pub fn commit_relayed(&mut self, name: &LogName) -> Result<bool, CoreError> {
        if self.state.last_relayed.as_ref().is_some_and(|w| name <= w) {
            return Ok(false);
        }
        self.state.last_relayed = Some(name.clone());
        self.state.relayed_ahead.retain(|n| n > name);
        self.persist()?;
        info!(watermark = %name, "updated last_relayed");
        Ok(true)
    }

    /// Remember that `name` reached the collector past a gap.
    pub fn mark_relayed_ahead(&mut self, name: &LogName) -> Result<(), CoreError> {
        if self.state.is_relayed(name) {
            return Ok(());
        }
        self.state.relayed_ahead.insert(name.clone());
        self.persist()?;
        debug!(file = %name, "relayed ahead of watermark");
        Ok(())
    }

    pub fn record_absent(&mut self, at: DateTime<Utc>) -> Result<(), CoreError> {
        self.state.last_absent = Some(at);
        self.persist()
    }

    pub fn record_device_sync(&mut self, at: DateTime<Utc>) -> Result<(), CoreError> {
        self.state.last_device_sync = Some(at);
        self.persist()
    }

    fn persist(&self) -> Result<(), CoreError> {
        let err = |reason: String| CoreError::State {
            path: self.path.display().to_string(),
            reason,
        };
        let text = toml::to_string_pretty(&self.state).map_err(|e| err(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(|e| err(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| err(e.to_string()))?;
        Ok(())
    }
}
