//! Derives online/offline from periodic HTTP probes.

use std::time::Duration;

use log::*;
use record_sync::Connectivity;
use service::config::Config;
use tokio::task::JoinHandle;

use crate::error::Error;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Any HTTP response counts as online; a transport error counts as offline.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(PROBE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(config.connectivity_probe_url())
    }

    pub async fn is_online(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                trace!("Probe {} answered {}", self.url, response.status());
                true
            }
            Err(e) => {
                debug!("Probe {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Probes every `interval` and feeds the result into `connectivity`.
pub fn spawn_probe(probe: HttpProbe, connectivity: Connectivity, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let online = probe.is_online().await;
            if connectivity.set_online(online) {
                info!("Host is now {}", if online { "online" } else { "offline" });
            }
        }
    })
}
