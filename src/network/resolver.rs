//! Interface resolution
//!
//! Maps metadata links to live OS interface names by MAC address. The
//! mapping is recomputed on every run since interface enumeration can
//! change between boots and hotplug events.

use super::{Link, Network, NetworkData};
use crate::NetApplyError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default sysfs location of network devices
pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// A live network interface and its hardware address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInterface {
    pub name: String,
    pub mac_address: String,
}

impl OsInterface {
    pub fn new(name: impl Into<String>, mac_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac_address: mac_address.into(),
        }
    }
}

/// Enumerates live interfaces
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    async fn interfaces(&self) -> Result<Vec<OsInterface>, NetApplyError>;
}

/// Reads interfaces from `/sys/class/net/<name>/address`
#[derive(Debug, Clone)]
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl SysfsInterfaces {
    pub fn new() -> Self {
        Self::with_root(SYS_CLASS_NET)
    }

    /// Create with a custom sysfs directory (useful for testing)
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl Default for SysfsInterfaces {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterfaceSource for SysfsInterfaces {
    async fn interfaces(&self) -> Result<Vec<OsInterface>, NetApplyError> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist, no interfaces", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();

        let mut interfaces = Vec::with_capacity(names.len());
        for name in names {
            let address_path = self.root.join(&name).join("address");
            match fs::read_to_string(&address_path).await {
                Ok(address) => interfaces.push(OsInterface::new(name, address.trim())),
                Err(e) => debug!("Skipping {}: {}", name, e),
            }
        }

        Ok(interfaces)
    }
}

/// A fixed interface list, for callers that already enumerated interfaces
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces(pub Vec<OsInterface>);

#[async_trait]
impl InterfaceSource for StaticInterfaces {
    async fn interfaces(&self) -> Result<Vec<OsInterface>, NetApplyError> {
        Ok(self.0.clone())
    }
}

/// Snapshot of live interfaces used to answer MAC lookups
#[derive(Debug, Clone)]
pub struct InterfaceResolver {
    interfaces: Vec<OsInterface>,
}

impl InterfaceResolver {
    /// Enumerate interfaces once from the given source
    pub async fn scan(source: &dyn InterfaceSource) -> Result<Self, NetApplyError> {
        let interfaces = source.interfaces().await?;
        debug!("Found {} live interfaces", interfaces.len());
        Ok(Self { interfaces })
    }

    pub fn from_interfaces(interfaces: Vec<OsInterface>) -> Self {
        Self { interfaces }
    }

    /// Exact, case-sensitive MAC match. First match wins.
    pub fn resolve(&self, mac_address: &str) -> Result<&str, NetApplyError> {
        self.interfaces
            .iter()
            .find(|iface| iface.mac_address == mac_address)
            .map(|iface| iface.name.as_str())
            .ok_or_else(|| NetApplyError::LinkNotFound(mac_address.to_string()))
    }
}

/// A link bound to its live interface name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub link_id: String,
    pub name: String,
    pub mac_address: String,
    pub mtu: Option<u32>,
}

/// Side table of link id to live interface, in link declaration order
#[derive(Debug, Clone, Default)]
pub struct ResolvedLinks {
    links: Vec<ResolvedLink>,
}

impl ResolvedLinks {
    /// Resolve every link of the model; any unresolvable MAC fails the run
    pub fn resolve(data: &NetworkData, resolver: &InterfaceResolver) -> Result<Self, NetApplyError> {
        let mut links = Vec::with_capacity(data.links.len());
        for link in &data.links {
            let name = resolver.resolve(&link.mac_address)?;
            info!("Link {} ({}) is {}", link.id, link.mac_address, name);
            links.push(Self::bind(link, name));
        }
        Ok(Self { links })
    }

    fn bind(link: &Link, name: &str) -> ResolvedLink {
        ResolvedLink {
            link_id: link.id.clone(),
            name: name.to_string(),
            mac_address: link.mac_address.clone(),
            mtu: link.mtu,
        }
    }

    pub fn get(&self, link_id: &str) -> Option<&ResolvedLink> {
        self.links.iter().find(|link| link.link_id == link_id)
    }

    /// The resolved link a network is bound to
    pub fn for_network(&self, network: &Network) -> Result<&ResolvedLink, NetApplyError> {
        self.get(&network.link)
            .ok_or_else(|| NetApplyError::UnknownLink {
                network: network.id.clone(),
                link: network.link.clone(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedLink> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SAMPLE_NETWORK_DATA;
    use tempfile::TempDir;

    fn fake_sysfs(entries: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, mac) in entries {
            let iface = dir.path().join(name);
            std::fs::create_dir_all(&iface).unwrap();
            std::fs::write(iface.join("address"), format!("{}\n", mac)).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_sysfs_enumeration() {
        let dir = fake_sysfs(&[("lo", "00:00:00:00:00:00"), ("eth0", "fa:16:3e:7a:61:64")]);
        let source = SysfsInterfaces::with_root(dir.path());
        let interfaces = source.interfaces().await.unwrap();
        assert_eq!(
            interfaces,
            vec![
                OsInterface::new("eth0", "fa:16:3e:7a:61:64"),
                OsInterface::new("lo", "00:00:00:00:00:00"),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_sysfs_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = SysfsInterfaces::with_root(dir.path().join("nope"));
        assert!(source.interfaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_by_mac() {
        let dir = fake_sysfs(&[("ens3", "fa:16:3e:7a:61:64"), ("ens4", "fa:16:3e:00:00:02")]);
        let resolver = InterfaceResolver::scan(&SysfsInterfaces::with_root(dir.path()))
            .await
            .unwrap();
        assert_eq!(resolver.resolve("fa:16:3e:00:00:02").unwrap(), "ens4");
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let resolver =
            InterfaceResolver::from_interfaces(vec![OsInterface::new("eth0", "fa:16:3e:7a:61:64")]);
        assert!(matches!(
            resolver.resolve("FA:16:3E:7A:61:64"),
            Err(NetApplyError::LinkNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_no_interfaces() {
        let resolver = InterfaceResolver::from_interfaces(Vec::new());
        assert!(matches!(
            resolver.resolve("fa:16:3e:7a:61:64"),
            Err(NetApplyError::LinkNotFound(mac)) if mac == "fa:16:3e:7a:61:64"
        ));
    }

    #[test]
    fn test_resolved_links() {
        let data = NetworkData::decode(SAMPLE_NETWORK_DATA).unwrap();
        let resolver =
            InterfaceResolver::from_interfaces(vec![OsInterface::new("eth0", "fa:16:3e:7a:61:64")]);
        let links = ResolvedLinks::resolve(&data, &resolver).unwrap();
        assert_eq!(links.len(), 1);
        let link = links.for_network(&data.networks[1]).unwrap();
        assert_eq!(link.name, "eth0");
        assert_eq!(link.mtu, Some(1420));
    }
}
