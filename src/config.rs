//! Tool settings
//!
//! Settings come from an optional YAML file; CLI flags and environment
//! variables override individual values in `main`.

use crate::NetApplyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// OpenStack network metadata endpoint
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/openstack/latest/network_data.json";

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Attempts of the whole pipeline before giving up
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_delay_secs: u64,
    /// Render and apply DHCP networks with a DHCP client
    pub reset_to_dhcp: bool,
    /// Restart the distro network service after applying
    pub restart_network: bool,
    /// Renderer hint overriding distro detection
    pub renderer: Option<String>,
    /// Metadata endpoint used when no payload is given
    pub metadata_url: String,
    /// Per-request metadata timeout
    pub metadata_timeout_secs: u64,
    /// Metadata fetch retries after the first request
    pub metadata_retries: u32,
    /// Per-request timeout of the refetch that follows a network restart
    pub metadata_recovery_timeout_secs: u64,
    /// Retries of the refetch that follows a network restart
    pub metadata_recovery_retries: u32,
    /// Do nothing while cloud-init itself is running
    pub skip_when_cloud_init_running: bool,
    /// Filesystem root for rendered artifacts and os-release
    pub root: PathBuf,
    /// sysfs network class directory
    pub sys_class_net: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_secs: 5,
            reset_to_dhcp: false,
            restart_network: true,
            renderer: None,
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            metadata_timeout_secs: 3,
            metadata_retries: 3,
            metadata_recovery_timeout_secs: 5,
            metadata_recovery_retries: 30,
            skip_when_cloud_init_running: true,
            root: PathBuf::from("/"),
            sys_class_net: PathBuf::from(crate::network::resolver::SYS_CLASS_NET),
        }
    }
}

impl Settings {
    /// Parse settings from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Load settings from a file; a missing file yields defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetApplyError> {
        let path = path.as_ref();

        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
            .map_err(|e| NetApplyError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn metadata_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_recovery_timeout_secs)
    }
}
