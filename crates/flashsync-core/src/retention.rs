// Retention cleaner

use std::path::Path;

use tracing::{debug, info, warn};

use flashsync_api::LogName;

use crate::local::local_log_files;
use crate::state::SyncState;

/// What one prune pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionSummary {
    pub kept: usize,
    pub deleted: Vec<LogName>,
    pub failed: Vec<(LogName, String)>,
}

/// Delete all but the `keep` newest local logs.
///
/// Runs after relay. Deleting a file the collector never received is
/// allowed but logged as a warning. Failures never abort the run.
pub fn prune(local_dir: &Path, keep: usize, state: &SyncState) -> RetentionSummary {
    let mut summary = RetentionSummary::default();

    let files = match local_log_files(local_dir) {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %local_dir.display(), error = %e, "cannot list local logs for cleanup");
            return summary;
        }
    };

    let excess = files.len().saturating_sub(keep);
    summary.kept = files.len() - excess;
    for file in files.into_iter().take(excess) {
        if !state.is_relayed(&file.name) {
            warn!(file = %file.name, "deleting a file that was never relayed");
        }
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                debug!(file = %file.name, "cleaned up");
                summary.deleted.push(file.name);
            }
            Err(e) => {
                warn!(file = %file.name, error = %e, "cleanup failed");
                summary.failed.push((file.name, e.to_string()));
            }
        }
    }

    if !summary.deleted.is_empty() {
        info!(
            deleted = summary.deleted.len(),
            kept = summary.kept,
            "pruned local logs"
        );
    }
    summary
}
