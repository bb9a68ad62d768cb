//! Error types for cloud-net-apply

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cloud-net-apply operations
#[derive(Error, Debug)]
pub enum NetApplyError {
    #[error("Failed to decode network data: {0}")]
    Decode(String),

    #[error("Invalid netmask: {0}")]
    InvalidMask(String),

    #[error("No live interface found for MAC address {0}")]
    LinkNotFound(String),

    #[error("Network '{network}' references unknown link '{link}'")]
    UnknownLink { network: String, link: String },

    #[error("Unsupported network type: {0}")]
    UnsupportedNetworkType(String),

    #[error("No default gateway found for network '{0}'")]
    NoGatewayFound(String),

    #[error("{step} failed: {stderr}")]
    CommandFailed { step: String, stderr: String },

    #[error("Failed to write {}: {source}", path.display())]
    RenderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported distribution: {0}")]
    UnsupportedDistro(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Datasource error: {0}")]
    Datasource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<base64::DecodeError> for NetApplyError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Decode(format!("invalid base64: {}", e))
    }
}

impl NetApplyError {
    /// Create a command failure for the named step
    pub fn command(step: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            step: step.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an artifact write failure
    pub fn render_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RenderIo {
            path: path.into(),
            source,
        }
    }

    /// Whether a fresh attempt of the pipeline could succeed.
    ///
    /// Interfaces may still be appearing, commands may race with udev or a
    /// DHCP client, and the metadata service may be briefly unreachable.
    /// Malformed input and validation failures never fix themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LinkNotFound(_)
                | Self::CommandFailed { .. }
                | Self::RenderIo { .. }
                | Self::Datasource(_)
                | Self::Io(_)
                | Self::Http(_)
        )
    }
}
