//! Debian ENI (Ethernet Network Interfaces) renderer
//!
//! Generates /etc/network/interfaces format configuration, either as the
//! flat file or as a drop-in under /etc/network/interfaces.d.

use super::{RenderOptions, RenderedFile, Renderer, RendererType};
use crate::NetApplyError;
use crate::network::netmask::AddressFamily;
use crate::network::resolver::ResolvedLinks;
use crate::network::{Network, NetworkData};
use crate::paths::{self, Paths};
use std::collections::HashSet;
use std::fmt::Write;
use std::io::ErrorKind;
use tracing::{debug, info};

/// Where the document goes and how default routes are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EniStyle {
    /// /etc/network/interfaces
    Flat,
    /// /etc/network/interfaces.d/50-cloud-init.cfg
    DropIn,
    /// /etc/network/interfaces.d/50-cloud-init, default routes as
    /// post-up/pre-down commands since `gateway` is not honoured there
    PostUp,
}

impl EniStyle {
    fn path(&self) -> &'static str {
        match self {
            Self::Flat => paths::ENI_INTERFACES,
            Self::DropIn => paths::ENI_DROPIN_CFG,
            Self::PostUp => paths::ENI_DROPIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Static,
    Dhcp,
}

/// One `iface` stanza
#[derive(Debug)]
struct Stanza<'a> {
    name: &'a str,
    family: AddressFamily,
    method: Method,
    auto: bool,
    hwaddress: Option<&'a str>,
    address: Option<String>,
    mtu: Option<u32>,
    gateway: Option<&'a str>,
    dns: Vec<String>,
    post_up: Vec<String>,
    pre_down: Vec<String>,
}

impl<'a> Stanza<'a> {
    fn new(name: &'a str, family: AddressFamily, method: Method) -> Self {
        Self {
            name,
            family,
            method,
            auto: false,
            hwaddress: None,
            address: None,
            mtu: None,
            gateway: None,
            dns: Vec::new(),
            post_up: Vec::new(),
            pre_down: Vec::new(),
        }
    }

    fn write_to(&self, content: &mut String) {
        let inet = match self.family {
            AddressFamily::Ipv4 => "inet",
            AddressFamily::Ipv6 => "inet6",
        };
        let method = match self.method {
            Method::Static => "static",
            Method::Dhcp => "dhcp",
        };

        if self.auto {
            writeln!(content, "auto {}", self.name).unwrap();
        }
        writeln!(content, "iface {} {} {}", self.name, inet, method).unwrap();
        if let Some(mac) = self.hwaddress {
            writeln!(content, "    hwaddress ether {}", mac).unwrap();
        }
        if let Some(address) = &self.address {
            writeln!(content, "    address {}", address).unwrap();
        }
        if let Some(mtu) = self.mtu {
            writeln!(content, "    mtu {}", mtu).unwrap();
        }
        if let Some(gateway) = self.gateway {
            writeln!(content, "    gateway {}", gateway).unwrap();
        }
        if !self.dns.is_empty() {
            writeln!(content, "    dns-nameservers {}", self.dns.join(" ")).unwrap();
        }
        for cmd in &self.post_up {
            writeln!(content, "    post-up {}", cmd).unwrap();
        }
        for cmd in &self.pre_down {
            writeln!(content, "    pre-down {}", cmd).unwrap();
        }
        writeln!(content).unwrap();
    }
}

/// Debian ENI renderer
pub struct EniRenderer {
    style: EniStyle,
}

impl EniRenderer {
    pub fn new(style: EniStyle) -> Self {
        Self { style }
    }

    fn route_commands(
        family: AddressFamily,
        destination: &str,
        gateway: &str,
        dev: &str,
    ) -> (String, String) {
        let flag = family.ip_flag();
        (
            format!(
                "ip {} route add {} via {} dev {} || true",
                flag, destination, gateway, dev
            ),
            format!(
                "ip {} route del {} via {} dev {} || true",
                flag, destination, gateway, dev
            ),
        )
    }

    fn static_stanza<'a>(
        &self,
        network: &'a Network,
        name: &'a str,
        family: AddressFamily,
        routes_done: &mut HashSet<String>,
    ) -> Result<Stanza<'a>, NetApplyError> {
        let gateway = network.require_gateway()?;

        let mut stanza = Stanza::new(name, family, Method::Static);
        stanza.address = Some(network.address_cidr()?);

        for route in network.ordered_routes()? {
            let destination = route.destination()?;
            if !routes_done.insert(destination.clone()) {
                debug!("Route {} already rendered, skipping", destination);
                continue;
            }

            if route.is_default()? && self.style != EniStyle::PostUp {
                stanza.gateway = Some(gateway);
                continue;
            }

            let destination = if route.is_default()? {
                "default".to_string()
            } else {
                destination
            };
            let (up, down) = Self::route_commands(family, &destination, &route.gateway, name);
            stanza.post_up.push(up);
            stanza.pre_down.push(down);
        }

        Ok(stanza)
    }

    fn render_document(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &RenderOptions,
    ) -> Result<String, NetApplyError> {
        let mut content = String::new();

        // Header
        writeln!(content, "# This file is generated by cloud-net-apply").unwrap();
        writeln!(content, "# See interfaces(5) for file format").unwrap();
        writeln!(content).unwrap();

        // Loopback
        writeln!(content, "auto lo").unwrap();
        writeln!(content, "iface lo inet loopback").unwrap();
        writeln!(content).unwrap();

        let mut configured: HashSet<&str> = HashSet::new();
        let mut routes_done: HashSet<String> = HashSet::new();

        for network in &data.networks {
            let family = network.family()?;
            let link = links.for_network(network)?;
            let name = link.name.as_str();

            let mut stanza = if network.network_type.is_dhcp() {
                if !options.reset_to_dhcp {
                    debug!("Leaving DHCP network {} to the running client", network.id);
                    continue;
                }
                Stanza::new(name, family, Method::Dhcp)
            } else {
                self.static_stanza(network, name, family, &mut routes_done)?
            };

            // First stanza of an interface carries the link level settings,
            // later ones only add addresses.
            if configured.insert(name) {
                stanza.auto = true;
                stanza.hwaddress = Some(link.mac_address.as_str());
                stanza.mtu = link.mtu;
                if stanza.method == Method::Static {
                    stanza.dns = data.dns_for_link(&link.link_id);
                }
            }

            stanza.write_to(&mut content);
        }

        Ok(content)
    }
}

impl Renderer for EniRenderer {
    fn render(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &RenderOptions,
    ) -> Result<Vec<RenderedFile>, NetApplyError> {
        let content = self.render_document(data, links, options)?;
        Ok(vec![RenderedFile::new(self.style.path(), content)])
    }

    fn renderer_type(&self) -> RendererType {
        match self.style {
            EniStyle::Flat => RendererType::Eni,
            EniStyle::DropIn => RendererType::EniDropIn,
            EniStyle::PostUp => RendererType::EniPostUp,
        }
    }
}

/// Switch a removed interface's static stanzas to `manual` in the drop-in.
///
/// Returns whether the drop-in existed.
pub async fn mark_interface_manual(paths: &Paths, iface: &str) -> Result<bool, NetApplyError> {
    let path = paths.eni_dropin_cfg();
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} not present, nothing to mark", path.display());
            return Ok(false);
        }
        Err(e) => return Err(NetApplyError::render_io(&path, e)),
    };

    let static4 = format!("iface {} inet static", iface);
    let static6 = format!("iface {} inet6 static", iface);

    let mut updated = String::with_capacity(content.len());
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == static4 || trimmed == static6 {
            updated.push_str(&line.replacen("static", "manual", 1));
        } else {
            updated.push_str(line);
        }
        updated.push('\n');
    }

    tokio::fs::write(&path, updated)
        .await
        .map_err(|e| NetApplyError::render_io(&path, e))?;
    info!("Marked {} as manual in {}", iface, path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::render::test_support::{resolve, sample};
    use tempfile::TempDir;

    fn render(style: EniStyle, data: &NetworkData, links: &ResolvedLinks) -> RenderedFile {
        let files = EniRenderer::new(style)
            .render(data, links, &RenderOptions::default())
            .unwrap();
        assert_eq!(files.len(), 1);
        files.into_iter().next().unwrap()
    }

    #[test]
    fn test_render_sample_flat() {
        let (data, links) = sample();
        let file = render(EniStyle::Flat, &data, &links);

        assert_eq!(file.path, std::path::PathBuf::from("/etc/network/interfaces"));
        let expected = "\
# This file is generated by cloud-net-apply
# See interfaces(5) for file format

auto lo
iface lo inet loopback

auto eth0
iface eth0 inet static
    hwaddress ether fa:16:3e:7a:61:64
    address 192.168.5.22/24
    mtu 1420
    gateway 192.168.5.1
    dns-nameservers 8.8.8.8 2001:4860:4860::8888

iface eth0 inet6 static
    address fe80::9/64
    gateway fe80::1ff:fe23:4567:890a

";
        assert_eq!(file.content, expected);
    }

    #[test]
    fn test_render_dropin_path() {
        let (data, links) = sample();
        let file = render(EniStyle::DropIn, &data, &links);
        assert_eq!(
            file.path,
            std::path::PathBuf::from("/etc/network/interfaces.d/50-cloud-init.cfg")
        );
        assert!(file.content.contains("gateway 192.168.5.1"));
    }

    #[test]
    fn test_render_postup_default_routes() {
        let (data, links) = sample();
        let file = render(EniStyle::PostUp, &data, &links);

        assert_eq!(
            file.path,
            std::path::PathBuf::from("/etc/network/interfaces.d/50-cloud-init")
        );
        assert!(!file.content.contains("    gateway "));
        assert!(file.content.contains(
            "    post-up ip -4 route add default via 192.168.5.1 dev eth0 || true"
        ));
        assert!(file.content.contains(
            "    pre-down ip -4 route del default via 192.168.5.1 dev eth0 || true"
        ));
        assert!(file.content.contains(
            "    post-up ip -6 route add default via fe80::1ff:fe23:4567:890a dev eth0 || true"
        ));
    }

    #[test]
    fn test_secondary_address_skips_mtu() {
        let (data, links) = resolve(
            r#"{
            "links": [{"id": "l0", "mtu": 9000, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [
                {"id": "n0", "link": "l0", "type": "ipv4", "netmask": "255.255.255.0",
                 "ip_address": "10.0.0.5",
                 "routes": [{"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.0.1"}]},
                {"id": "n1", "link": "l0", "type": "ipv4", "netmask": "255.255.255.0",
                 "ip_address": "10.0.1.5",
                 "routes": [{"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.1.1"}]}
            ]
        }"#,
        );
        let file = render(EniStyle::Flat, &data, &links);

        assert_eq!(file.content.matches("mtu 9000").count(), 1);
        assert_eq!(file.content.matches("auto eth0").count(), 1);
        assert_eq!(file.content.matches("iface eth0 inet static").count(), 2);
        assert!(file.content.contains("address 10.0.1.5/24"));
        assert_eq!(file.content.matches("gateway ").count(), 1);
    }

    #[test]
    fn test_static_routes_deduplicated() {
        let (data, links) = resolve(
            r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [
                {"id": "n0", "link": "l0", "type": "ipv4", "netmask": "255.255.255.0",
                 "ip_address": "10.0.0.5",
                 "routes": [{"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.0.1"},
                            {"network": "172.16.0.0", "netmask": "255.240.0.0", "gateway": "10.0.0.254"}]},
                {"id": "n1", "link": "l0", "type": "ipv4", "netmask": "255.255.255.0",
                 "ip_address": "10.0.1.5",
                 "routes": [{"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.1.1"},
                            {"network": "172.16.0.0", "netmask": "12", "gateway": "10.0.1.254"}]}
            ]
        }"#,
        );
        let file = render(EniStyle::Flat, &data, &links);
        assert_eq!(file.content.matches("route add 172.16.0.0/12").count(), 1);
        assert!(file.content.contains("via 10.0.0.254 dev eth0"));
    }

    #[test]
    fn test_no_gateway_fails() {
        let (data, links) = resolve(
            r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv4",
                          "netmask": "255.255.255.0", "ip_address": "10.0.0.5"}]
        }"#,
        );
        let err = EniRenderer::new(EniStyle::Flat)
            .render(&data, &links, &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, NetApplyError::NoGatewayFound(id) if id == "n0"));
    }

    #[test]
    fn test_unsupported_type_fails() {
        let (data, links) = resolve(
            r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv6_slaac"}]
        }"#,
        );
        let err = EniRenderer::new(EniStyle::Flat)
            .render(&data, &links, &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, NetApplyError::UnsupportedNetworkType(t) if t == "ipv6_slaac"));
    }

    #[test]
    fn test_dhcp_follows_reset_flag() {
        let json = r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv4_dhcp"},
                         {"id": "n1", "link": "l0", "type": "ipv6_dhcp"}]
        }"#;
        let (data, links) = resolve(json);
        let renderer = EniRenderer::new(EniStyle::DropIn);

        let skipped = renderer
            .render(&data, &links, &RenderOptions::default())
            .unwrap();
        assert!(!skipped[0].content.contains("eth0"));

        let reset = renderer
            .render(&data, &links, &RenderOptions { reset_to_dhcp: true })
            .unwrap();
        assert!(reset[0].content.contains("auto eth0\niface eth0 inet dhcp\n"));
        assert!(reset[0].content.contains("iface eth0 inet6 dhcp\n"));
        assert!(!reset[0].content.contains("gateway"));
    }

    #[tokio::test]
    async fn test_mark_interface_manual() {
        let root = TempDir::new().unwrap();
        let paths = Paths::with_root(root.path());
        let (data, links) = resolve(
            r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"},
                      {"id": "l1", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:02"}],
            "networks": [
                {"id": "n0", "link": "l0", "type": "ipv4", "netmask": "24", "ip_address": "10.0.0.5",
                 "routes": [{"network": "0.0.0.0", "netmask": "0", "gateway": "10.0.0.1"}]},
                {"id": "n1", "link": "l1", "type": "ipv4", "netmask": "24", "ip_address": "10.1.0.5",
                 "routes": [{"network": "0.0.0.0", "netmask": "0", "gateway": "10.1.0.1"}]}
            ]
        }"#,
        );
        let files = EniRenderer::new(EniStyle::DropIn)
            .render(&data, &links, &RenderOptions::default())
            .unwrap();
        crate::network::render::write_rendered(&files, &paths)
            .await
            .unwrap();

        assert!(mark_interface_manual(&paths, "eth1").await.unwrap());

        let content = std::fs::read_to_string(paths.eni_dropin_cfg()).unwrap();
        assert!(content.contains("iface eth0 inet static"));
        assert!(content.contains("iface eth1 inet manual"));
        assert!(!content.contains("iface eth1 inet static"));
    }

    #[tokio::test]
    async fn test_mark_interface_manual_without_dropin() {
        let root = TempDir::new().unwrap();
        let paths = Paths::with_root(root.path());
        assert!(!mark_interface_manual(&paths, "eth0").await.unwrap());
    }
}
