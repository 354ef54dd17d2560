// ── Incremental downloader ──
//
// Fetches listing entries newer than `last_synced`, oldest first. Each file
// goes to a hidden `.part` path, is checked against the listed size, and is
// renamed into place before the watermark moves. The watermark only ever
// covers a gap-free prefix: after the first failure, later files still
// download but are fetched again next run along with the failed one.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use flashsync_api::{LogName, RemoteFileEntry};

use crate::device::DeviceFiles;
use crate::error::CoreError;
use crate::local::part_path;
use crate::state::StateStore;

/// What one download pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: Vec<LogName>,
    /// Files that failed, with the reason.
    pub failed: Vec<(LogName, String)>,
    /// Listing entries at or below the watermark.
    pub skipped: usize,
}

impl DownloadSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Download every entry newer than the watermark (or all of them with
/// `resync`) into `local_dir`.
///
/// Per-file failures are collected in the summary. Only state persistence
/// and local directory errors abort the pass.
pub async fn download_new<D: DeviceFiles>(
    device: &D,
    entries: &[RemoteFileEntry],
    local_dir: &Path,
    timeout: Duration,
    resync: bool,
    store: &mut StateStore,
) -> Result<DownloadSummary, CoreError> {
    let mut summary = DownloadSummary::default();

    let mut selected: Vec<&RemoteFileEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if resync || store.state().needs_download(&entry.name) {
            selected.push(entry);
        } else {
            summary.skipped += 1;
        }
    }
    selected.sort_by(|a, b| a.name.cmp(&b.name));

    if summary.skipped > 0 {
        info!(count = summary.skipped, "skipped already-synced files");
    }
    if selected.is_empty() {
        info!("no new files to download");
        return Ok(summary);
    }

    tokio::fs::create_dir_all(local_dir).await?;
    info!(count = selected.len(), "downloading new files");

    let mut blocked = false;
    for entry in selected {
        match fetch_one(device, entry, local_dir, timeout).await {
            Ok(bytes) => {
                info!(file = %entry.name, bytes, "downloaded");
                if blocked {
                    debug!(file = %entry.name, "watermark held behind an earlier failure");
                } else {
                    store.commit_synced(&entry.name)?;
                }
                summary.downloaded.push(entry.name.clone());
            }
            Err(e) => {
                error!(file = %entry.name, kind = e.kind(), error = %e, "download failed");
                // Only a failure above the watermark leaves a gap.
                if store.state().needs_download(&entry.name) {
                    blocked = true;
                }
                summary.failed.push((entry.name.clone(), e.to_string()));
            }
        }
    }

    info!(
        downloaded = summary.downloaded.len(),
        failed = summary.failed.len(),
        "download pass finished"
    );
    Ok(summary)
}

async fn fetch_one<D: DeviceFiles>(
    device: &D,
    entry: &RemoteFileEntry,
    local_dir: &Path,
    timeout: Duration,
) -> Result<u64, CoreError> {
    let part = part_path(local_dir, &entry.name);
    let dest = local_dir.join(entry.name.as_str());

    // A previous run may have died mid-transfer.
    remove_if_present(&part).await;

    let result = async {
        let bytes = device.fetch(entry, &part, timeout).await?;
        if bytes < entry.size {
            return Err(CoreError::DownloadFailed {
                file: entry.name.to_string(),
                reason: format!("short transfer: {bytes} of {} bytes", entry.size),
            });
        }
        tokio::fs::rename(&part, &dest)
            .await
            .map_err(|e| CoreError::DownloadFailed {
                file: entry.name.to_string(),
                reason: format!("rename into place: {e}"),
            })?;
        Ok(bytes)
    }
    .await;

    if result.is_err() {
        remove_if_present(&part).await;
    }
    result
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial download"),
    }
}
