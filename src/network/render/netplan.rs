//! Netplan renderer
//!
//! Builds a version 2 netplan document keyed by interface name and
//! serializes it to /etc/netplan/50-cloud-init.yaml.

use super::{RenderOptions, RenderedFile, Renderer, RendererType};
use crate::NetApplyError;
use crate::network::NetworkData;
use crate::network::netmask::AddressFamily;
use crate::network::resolver::ResolvedLinks;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Top-level netplan document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetplanDocument {
    pub network: NetplanConfig,
}

/// Network configuration (v2 format)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetplanConfig {
    pub version: u8,
    #[serde(default)]
    pub ethernets: BTreeMap<String, EthernetConfig>,
}

/// Ethernet interface configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EthernetConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp4: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp6: Option<bool>,
    #[serde(rename = "match")]
    pub match_config: MatchConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<NameserverConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,
    #[serde(rename = "set-name")]
    pub set_name: String,
}

/// Interface matching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchConfig {
    pub macaddress: String,
}

/// Nameserver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameserverConfig {
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Route configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    pub to: String,
    pub via: String,
}

/// Netplan renderer
pub struct NetplanRenderer;

impl NetplanRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Build the netplan document without serializing it
    pub fn build(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &RenderOptions,
    ) -> Result<NetplanDocument, NetApplyError> {
        let mut ethernets = BTreeMap::new();

        for link in links.iter() {
            let dns = data.dns_for_link(&link.link_id);
            ethernets.insert(
                link.name.clone(),
                EthernetConfig {
                    match_config: MatchConfig {
                        macaddress: link.mac_address.clone(),
                    },
                    set_name: link.name.clone(),
                    mtu: link.mtu,
                    nameservers: (!dns.is_empty()).then_some(NameserverConfig { addresses: dns }),
                    ..Default::default()
                },
            );
        }

        let mut routes_done: HashSet<String> = HashSet::new();

        for network in &data.networks {
            let family = network.family()?;
            let link = links.for_network(network)?;
            let Some(eth) = ethernets.get_mut(&link.name) else {
                continue;
            };

            if network.network_type.is_dhcp() {
                if !options.reset_to_dhcp {
                    debug!("Leaving DHCP network {} to the running client", network.id);
                    continue;
                }
                match family {
                    AddressFamily::Ipv4 => eth.dhcp4 = Some(true),
                    AddressFamily::Ipv6 => eth.dhcp6 = Some(true),
                }
                continue;
            }

            eth.addresses.push(network.address_cidr()?);

            for route in network.ordered_routes()? {
                let destination = route.destination()?;
                if !routes_done.insert(destination.clone()) {
                    debug!("Route {} already rendered, skipping", destination);
                    continue;
                }
                eth.routes.push(RouteConfig {
                    to: destination,
                    via: route.gateway.clone(),
                });
            }
        }

        Ok(NetplanDocument {
            network: NetplanConfig {
                version: 2,
                ethernets,
            },
        })
    }
}

impl Default for NetplanRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for NetplanRenderer {
    fn render(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &RenderOptions,
    ) -> Result<Vec<RenderedFile>, NetApplyError> {
        let document = self.build(data, links, options)?;
        let mut content = String::from("# This file is generated by cloud-net-apply\n");
        content.push_str(&serde_yaml::to_string(&document)?);

        Ok(vec![RenderedFile {
            path: paths::NETPLAN_CONFIG.into(),
            content,
            mode: 0o600,
        }])
    }

    fn renderer_type(&self) -> RendererType {
        RendererType::Netplan
    }
}
