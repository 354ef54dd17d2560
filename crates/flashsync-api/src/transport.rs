// Transport configuration for building the reqwest::Client used against
// the card. The card speaks plain HTTP on its own access point, so there
// is no TLS or cookie handling here, only timeouts and identification.

use std::time::Duration;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for a single request (listing, readiness probe).
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("flashsync/", env!("CARGO_PKG_VERSION")))
            // The card's access point has no route anywhere else.
            .no_proxy()
            .build()
            .map_err(|e| crate::error::Error::Client(e.to_string()))
    }

    /// Same config with a different request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
