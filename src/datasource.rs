//! Network metadata retrieval
//!
//! Fetches `network_data.json` from the OpenStack metadata service.
//! https://docs.openstack.org/nova/latest/user/metadata.html

use crate::NetApplyError;
use crate::network::NetworkData;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of the canonical network model
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name of this source (e.g., "OpenStack")
    fn name(&self) -> &'static str;

    /// Fetch and decode the network model
    async fn fetch_network_data(&self) -> Result<NetworkData, NetApplyError>;

    /// Fetch again after networking was restarted, waiting longer for the
    /// service to come back
    async fn refetch_after_restart(&self) -> Result<NetworkData, NetApplyError> {
        self.fetch_network_data().await
    }
}

/// Client and attempt budget for one kind of fetch
struct FetchBudget {
    client: Client,
    attempts: u32,
}

impl FetchBudget {
    /// `retries` counts retries after the first attempt
    fn new(timeout: Duration, retries: u32) -> Result<Self, NetApplyError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .build()?;
        Ok(Self {
            client,
            attempts: retries.saturating_add(1),
        })
    }
}

/// Timeout used when refetching after a network restart
pub const RECOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Retries used when refetching after a network restart
pub const RECOVERY_RETRIES: u32 = 30;

/// OpenStack `network_data.json` over HTTP
pub struct OpenStackNetworkData {
    url: String,
    normal: FetchBudget,
    recovery: FetchBudget,
    retry_delay: Duration,
}

impl OpenStackNetworkData {
    /// Create a source for a `network_data.json` URL.
    ///
    /// `retries` counts retries after the first request.
    pub fn with_url(url: &str, timeout: Duration, retries: u32) -> Result<Self, NetApplyError> {
        Ok(Self {
            url: url.to_string(),
            normal: FetchBudget::new(timeout, retries)?,
            recovery: FetchBudget::new(RECOVERY_TIMEOUT, RECOVERY_RETRIES)?,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Create with a custom metadata base URL (for testing)
    pub fn with_base_url(base_url: &str) -> Result<Self, NetApplyError> {
        let url = format!(
            "{}/openstack/latest/network_data.json",
            base_url.trim_end_matches('/')
        );
        let mut source = Self::with_url(&url, Duration::from_secs(2), 0)?;
        source.recovery = FetchBudget::new(Duration::from_secs(2), 0)?;
        source.retry_delay = Duration::ZERO;
        Ok(source)
    }

    /// Override the retries of a normal fetch
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.normal.attempts = retries.saturating_add(1);
        self
    }

    /// Override the budget of the fetch that follows a network restart
    pub fn with_recovery(mut self, timeout: Duration, retries: u32) -> Result<Self, NetApplyError> {
        self.recovery = FetchBudget::new(timeout, retries)?;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_with(&self, budget: &FetchBudget) -> Result<NetworkData, NetApplyError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(&budget.client).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() && attempt < budget.attempts => {
                    warn!("Metadata fetch {}/{} failed: {}", attempt, budget.attempts, e);
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, client: &Client) -> Result<NetworkData, NetApplyError> {
        debug!("Fetching network data from {}", self.url);

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| NetApplyError::Datasource(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(NetApplyError::Datasource(format!(
                "Failed to fetch {}: {}",
                self.url,
                response.status()
            )));
        }

        let body = response.text().await?;
        NetworkData::decode(&body)
    }
}

#[async_trait]
impl MetadataSource for OpenStackNetworkData {
    fn name(&self) -> &'static str {
        "OpenStack"
    }

    async fn fetch_network_data(&self) -> Result<NetworkData, NetApplyError> {
        self.fetch_with(&self.normal).await
    }

    async fn refetch_after_restart(&self) -> Result<NetworkData, NetApplyError> {
        debug!(
            "Refetching with {} attempts after network restart",
            self.recovery.attempts
        );
        self.fetch_with(&self.recovery).await
    }
}

/// A fixed model, used when the payload is handed in directly
pub struct StaticNetworkData(pub NetworkData);

#[async_trait]
impl MetadataSource for StaticNetworkData {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_network_data(&self) -> Result<NetworkData, NetApplyError> {
        Ok(self.0.clone())
    }
}
