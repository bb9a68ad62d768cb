//! RHEL/CentOS sysconfig renderer
//!
//! Generates one `ifcfg-<iface>` file per resolved interface, plus
//! `route-<iface>`/`route6-<iface>` files for non-default static routes.

use super::{RenderOptions, RenderedFile, Renderer, RendererType};
use crate::NetApplyError;
use crate::network::NetworkData;
use crate::network::netmask::AddressFamily;
use crate::network::resolver::{ResolvedLink, ResolvedLinks};
use crate::paths;
use std::collections::HashSet;
use std::fmt::Write;
use tracing::debug;

/// Contents of one ifcfg file
#[derive(Debug, Default)]
struct IfcfgFile {
    device: String,
    hwaddr: String,
    mtu: Option<u32>,
    dhcp4: bool,
    dhcp6: bool,
    /// (address, prefix) pairs rendered as IPADDRn/PREFIXn
    ipv4: Vec<(String, u8)>,
    gateway4: Option<String>,
    ipv6: Vec<String>,
    gateway6: Option<String>,
    dns: Vec<String>,
    routes4: Vec<String>,
    routes6: Vec<String>,
}

impl IfcfgFile {
    fn for_link(link: &ResolvedLink) -> Self {
        Self {
            device: link.name.clone(),
            hwaddr: link.mac_address.clone(),
            mtu: link.mtu,
            ..Default::default()
        }
    }

    fn ifcfg(&self) -> String {
        let mut content = String::new();
        writeln!(content, "# Created by cloud-net-apply").unwrap();
        writeln!(content, "DEVICE={}", self.device).unwrap();
        writeln!(content, "HWADDR={}", self.hwaddr).unwrap();
        writeln!(content, "TYPE=Ethernet").unwrap();
        writeln!(content, "ONBOOT=yes").unwrap();
        writeln!(content, "USERCTL=no").unwrap();
        writeln!(content, "NM_CONTROLLED=no").unwrap();
        writeln!(
            content,
            "BOOTPROTO={}",
            if self.dhcp4 { "dhcp" } else { "none" }
        )
        .unwrap();

        if let Some(mtu) = self.mtu {
            writeln!(content, "MTU={}", mtu).unwrap();
        }

        for (i, (address, prefix)) in self.ipv4.iter().enumerate() {
            writeln!(content, "IPADDR{}={}", i, address).unwrap();
            writeln!(content, "PREFIX{}={}", i, prefix).unwrap();
        }
        if let Some(gateway) = &self.gateway4 {
            writeln!(content, "GATEWAY={}", gateway).unwrap();
        }

        if self.dhcp6 || !self.ipv6.is_empty() {
            writeln!(content, "IPV6INIT=yes").unwrap();
        }
        if self.dhcp6 {
            writeln!(content, "DHCPV6C=yes").unwrap();
        }
        if let Some((primary, secondaries)) = self.ipv6.split_first() {
            writeln!(content, "IPV6ADDR={}", primary).unwrap();
            if !secondaries.is_empty() {
                writeln!(content, "IPV6ADDR_SECONDARIES=\"{}\"", secondaries.join(" ")).unwrap();
            }
        }
        if let Some(gateway) = &self.gateway6 {
            writeln!(content, "IPV6_DEFAULTGW={}", gateway).unwrap();
        }

        for (i, dns) in self.dns.iter().enumerate() {
            writeln!(content, "DNS{}={}", i + 1, dns).unwrap();
        }

        content
    }

    fn files(&self) -> Vec<RenderedFile> {
        let mut files = vec![RenderedFile::new(
            paths::ifcfg_path(&self.device),
            self.ifcfg(),
        )];
        for (routes, ipv6) in [(&self.routes4, false), (&self.routes6, true)] {
            if !routes.is_empty() {
                let mut content = routes.join("\n");
                content.push('\n');
                files.push(RenderedFile::new(
                    paths::route_path(&self.device, ipv6),
                    content,
                ));
            }
        }
        files
    }
}

/// RHEL/CentOS network-scripts renderer
pub struct SysconfigRenderer;

impl SysconfigRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SysconfigRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for SysconfigRenderer {
    fn render(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &RenderOptions,
    ) -> Result<Vec<RenderedFile>, NetApplyError> {
        let mut ifcfgs: Vec<IfcfgFile> = links.iter().map(IfcfgFile::for_link).collect();
        let mut routes_done: HashSet<String> = HashSet::new();

        for network in &data.networks {
            let family = network.family()?;
            let link = links.for_network(network)?;
            let Some(ifcfg) = ifcfgs.iter_mut().find(|f| f.device == link.name) else {
                continue;
            };

            if network.network_type.is_dhcp() {
                if !options.reset_to_dhcp {
                    debug!("Leaving DHCP network {} to the running client", network.id);
                    continue;
                }
                match family {
                    AddressFamily::Ipv4 => ifcfg.dhcp4 = true,
                    AddressFamily::Ipv6 => ifcfg.dhcp6 = true,
                }
                continue;
            }

            let gateway = network.require_gateway()?;
            let address = network.ip_address.clone().unwrap_or_default();
            let prefix = network.prefix_length()?;

            match family {
                AddressFamily::Ipv4 => {
                    ifcfg.ipv4.push((address, prefix));
                    ifcfg.gateway4.get_or_insert_with(|| gateway.to_string());
                }
                AddressFamily::Ipv6 => {
                    ifcfg.ipv6.push(network.address_cidr()?);
                    ifcfg.gateway6.get_or_insert_with(|| gateway.to_string());
                }
            }

            for route in network.ordered_routes()? {
                let destination = route.destination()?;
                if !routes_done.insert(destination.clone()) || route.is_default()? {
                    continue;
                }
                let line = format!("{} via {} dev {}", destination, route.gateway, link.name);
                match route.family() {
                    AddressFamily::Ipv4 => ifcfg.routes4.push(line),
                    AddressFamily::Ipv6 => ifcfg.routes6.push(line),
                }
            }
        }

        for ifcfg in &mut ifcfgs {
            let link_id = links
                .iter()
                .find(|l| l.name == ifcfg.device)
                .map(|l| l.link_id.as_str())
                .unwrap_or_default();
            ifcfg.dns = data.dns_for_link(link_id);
        }

        Ok(ifcfgs.iter().flat_map(IfcfgFile::files).collect())
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Sysconfig
    }
}
