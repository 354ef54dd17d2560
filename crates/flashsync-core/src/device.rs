// ── Card data plane ──
//
// What the sync engine needs from the card once associated: a readiness
// probe, a directory listing, and a per-file download. Errors come back
// already scoped: a failed fetch names the file it was fetching.

use std::path::Path;
use std::time::Duration;

use flashsync_api::{FlashAirClient, RemoteFileEntry};

use crate::error::CoreError;

#[allow(async_fn_in_trait)]
pub trait DeviceFiles {
    /// Succeeds once the card's web server answers.
    async fn probe(&self) -> Result<(), CoreError>;

    /// Log files in `directory`, oldest first.
    async fn list(&self, directory: &str) -> Result<Vec<RemoteFileEntry>, CoreError>;

    /// Write `entry` to `dest`, bounded by `timeout`. Returns bytes written.
    async fn fetch(
        &self,
        entry: &RemoteFileEntry,
        dest: &Path,
        timeout: Duration,
    ) -> Result<u64, CoreError>;
}

impl DeviceFiles for FlashAirClient {
    async fn probe(&self) -> Result<(), CoreError> {
        FlashAirClient::probe(self).await.map_err(CoreError::from)
    }

    async fn list(&self, directory: &str) -> Result<Vec<RemoteFileEntry>, CoreError> {
        FlashAirClient::list(self, directory)
            .await
            .map_err(CoreError::from)
    }

    async fn fetch(
        &self,
        entry: &RemoteFileEntry,
        dest: &Path,
        timeout: Duration,
    ) -> Result<u64, CoreError> {
        self.download_to(&entry.directory, entry.name.as_str(), dest, timeout)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::DownloadTimeout {
                        file: entry.name.to_string(),
                        timeout_secs: timeout.as_secs(),
                    }
                } else {
                    CoreError::DownloadFailed {
                        file: entry.name.to_string(),
                        reason: e.to_string(),
                    }
                }
            })
    }
}
