// FlashAir HTTP client
//
// Wraps `reqwest::Client` with the card's URL layout. Listing requests use
// the transport timeout; each download carries its own timeout so one
// slow file cannot eat the budget of the rest of the batch.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::listing::{RemoteFileEntry, parse_listing};
use crate::transport::TransportConfig;

/// Default address of the card on its own access point.
pub const DEFAULT_ADDRESS: &str = "192.168.0.1";

/// Raw HTTP client for the card's data plane.
pub struct FlashAirClient {
    http: reqwest::Client,
    base_url: Url,
}

impl FlashAirClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the card root, e.g. `http://192.168.0.1`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Build the base URL for a card address (`192.168.0.1` or `host:port`).
    pub fn base_url_for(address: &str) -> Result<Url, Error> {
        let address = address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            Ok(Url::parse(address)?)
        } else {
            Ok(Url::parse(&format!("http://{address}"))?)
        }
    }

    /// The card base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/command.cgi?op=100&DIR={directory}`
    ///
    /// Built by hand rather than with `query_pairs_mut` so the directory
    /// slashes go out literally, the way the card firmware expects them.
    pub fn listing_url(&self, directory: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/command.cgi?op=100&DIR={directory}"))?)
    }

    /// `{base}/{directory}/{filename}`, or `{base}/{filename}` for the root.
    pub fn file_url(&self, directory: &str, filename: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let dir = directory.trim_matches('/');
        let full = if dir.is_empty() {
            format!("{base}/{filename}")
        } else {
            format!("{base}/{dir}/{filename}")
        };
        Ok(Url::parse(&full)?)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// List log files in `directory`, sorted by natural order.
    pub async fn list(&self, directory: &str) -> Result<Vec<RemoteFileEntry>, Error> {
        let url = self.listing_url(directory)?;
        debug!("GET {}", url);

        let resp = self.http.get(url.clone()).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await.map_err(classify)?;
        parse_listing(&body)
    }

    /// Check that the card's web server answers.
    ///
    /// Association comes up before the card's HTTP server does; callers
    /// poll this until it succeeds.
    pub async fn probe(&self) -> Result<(), Error> {
        let url = self.listing_url("/")?;
        let resp = self.http.get(url.clone()).send().await.map_err(classify)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http {
                status: resp.status().as_u16(),
                url: url.to_string(),
            })
        }
    }

    /// Stream `{directory}/{filename}` into `dest`, returning the byte count.
    ///
    /// `dest` is created (truncated) and synced before returning. The whole
    /// transfer, headers and body, is bounded by `timeout`.
    pub async fn download_to(
        &self,
        directory: &str,
        filename: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<u64, Error> {
        let url = self.file_url(directory, filename)?;
        debug!("GET {}", url);

        let transfer = async {
            let mut resp = self
                .http
                .get(url.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(classify)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let mut file = tokio::fs::File::create(dest).await?;
            let mut written: u64 = 0;
            while let Some(chunk) = resp.chunk().await.map_err(classify)? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(written)
        };

        match tokio::time::timeout(timeout, transfer).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Surface reqwest timeouts as `Error::Timeout` so callers can tell a slow
/// card from a dead one.
fn classify(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout { timeout_secs: 0 }
    } else {
        Error::Transport(err)
    }
}
