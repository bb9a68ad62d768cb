//! Well-known filesystem paths
//!
//! Artifacts are always described by their absolute host path. [`Paths`]
//! re-roots them so tests and image builders can target a staging tree.

use std::path::{Path, PathBuf};

/// Flat Debian interfaces file
pub const ENI_INTERFACES: &str = "/etc/network/interfaces";

/// Debian drop-in with the `.cfg` suffix sourced by the stock config
pub const ENI_DROPIN_CFG: &str = "/etc/network/interfaces.d/50-cloud-init.cfg";

/// Debian drop-in for releases that source every file in interfaces.d
pub const ENI_DROPIN: &str = "/etc/network/interfaces.d/50-cloud-init";

/// Netplan document
pub const NETPLAN_CONFIG: &str = "/etc/netplan/50-cloud-init.yaml";

/// RHEL/CentOS network scripts directory
pub const SYSCONFIG_DIR: &str = "/etc/sysconfig/network-scripts";

/// Distribution identification
pub const OS_RELEASE: &str = "/etc/os-release";

/// Tool settings
pub const SETTINGS_FILE: &str = "/etc/cloud-net-apply/config.yaml";

/// `/etc/sysconfig/network-scripts/ifcfg-<iface>`
pub fn ifcfg_path(iface: &str) -> PathBuf {
    Path::new(SYSCONFIG_DIR).join(format!("ifcfg-{}", iface))
}

/// `/etc/sysconfig/network-scripts/route-<iface>` (route6 for IPv6)
pub fn route_path(iface: &str, ipv6: bool) -> PathBuf {
    let prefix = if ipv6 { "route6" } else { "route" };
    Path::new(SYSCONFIG_DIR).join(format!("{}-{}", prefix, iface))
}

/// Host filesystem root used for every artifact
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// Paths on the running host
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    /// Create with a custom root (useful for testing)
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Map an absolute host path below the root
    pub fn host_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }

    pub fn os_release(&self) -> PathBuf {
        self.host_path(OS_RELEASE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.host_path(SETTINGS_FILE)
    }

    pub fn eni_dropin_cfg(&self) -> PathBuf {
        self.host_path(ENI_DROPIN_CFG)
    }
}
