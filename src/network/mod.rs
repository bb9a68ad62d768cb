//! Canonical network model
//!
//! Parses OpenStack style `network_data.json` (links, networks, routes and
//! services) into an immutable model that renderers and the applier read.
//! The model is built once per run and never persisted.

pub mod apply;
pub mod netmask;
pub mod render;
pub mod resolver;

use crate::NetApplyError;
use base64::Engine;
use netmask::{AddressFamily, prefix_length_for};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Root of the parsed network metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkData {
    pub links: Vec<Link>,
    pub networks: Vec<Network>,
    pub services: Vec<Service>,
}

/// A virtual NIC, identified on the host by its MAC address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    /// OpenStack reports `null` when the MTU is left to the guest
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(rename = "ethernet_mac_address")]
    pub mac_address: String,
}

/// Addressing for one link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub link: String,
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    #[serde(default)]
    pub netmask: Option<Netmask>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// Network type as declared in metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkType {
    Ipv4,
    Ipv6,
    Ipv4Dhcp,
    Ipv6Dhcp,
    /// Anything else (`ipv6_slaac`, `ipv6_dhcpv6-stateless`, ...)
    Unsupported(String),
}

impl From<String> for NetworkType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ipv4" => Self::Ipv4,
            "ipv6" => Self::Ipv6,
            "ipv4_dhcp" => Self::Ipv4Dhcp,
            "ipv6_dhcp" => Self::Ipv6Dhcp,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<NetworkType> for String {
    fn from(value: NetworkType) -> Self {
        match value {
            NetworkType::Ipv4 => "ipv4".to_string(),
            NetworkType::Ipv6 => "ipv6".to_string(),
            NetworkType::Ipv4Dhcp => "ipv4_dhcp".to_string(),
            NetworkType::Ipv6Dhcp => "ipv6_dhcp".to_string(),
            NetworkType::Unsupported(other) => other,
        }
    }
}

impl NetworkType {
    /// Address family, or `UnsupportedNetworkType` for unknown types
    pub fn family(&self) -> Result<AddressFamily, NetApplyError> {
        match self {
            Self::Ipv4 | Self::Ipv4Dhcp => Ok(AddressFamily::Ipv4),
            Self::Ipv6 | Self::Ipv6Dhcp => Ok(AddressFamily::Ipv6),
            Self::Unsupported(other) => Err(NetApplyError::UnsupportedNetworkType(other.clone())),
        }
    }

    pub fn is_dhcp(&self) -> bool {
        matches!(self, Self::Ipv4Dhcp | Self::Ipv6Dhcp)
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Self::Ipv4 | Self::Ipv6)
    }
}

/// A netmask as found in metadata: either a prefix number or a mask string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Netmask {
    Prefix(u8),
    Mask(String),
}

impl Netmask {
    pub fn prefix_length(&self, family: AddressFamily) -> Result<u8, NetApplyError> {
        match self {
            Self::Prefix(prefix) => Ok(*prefix),
            Self::Mask(mask) => prefix_length_for(mask, family),
        }
    }
}

impl From<&str> for Netmask {
    fn from(value: &str) -> Self {
        Self::Mask(value.to_string())
    }
}

/// A static route attached to a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub network: String,
    pub netmask: Netmask,
    pub gateway: String,
}

impl Route {
    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.network)
    }

    pub fn prefix_length(&self) -> Result<u8, NetApplyError> {
        self.netmask.prefix_length(self.family())
    }

    /// A zero-length prefix marks the default route
    pub fn is_default(&self) -> Result<bool, NetApplyError> {
        Ok(self.prefix_length()? == 0)
    }

    /// `network/prefixlen`, also used as the route dedup key
    pub fn destination(&self) -> Result<String, NetApplyError> {
        Ok(format!("{}/{}", self.network, self.prefix_length()?))
    }
}

/// A service advertised by the metadata (only `dns` is consumed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "type")]
    pub service_type: String,
    pub address: String,
}

impl Service {
    pub fn is_dns(&self) -> bool {
        self.service_type == "dns"
    }
}

impl Network {
    pub fn family(&self) -> Result<AddressFamily, NetApplyError> {
        self.network_type.family()
    }

    /// Prefix length of the network's own address
    pub fn prefix_length(&self) -> Result<u8, NetApplyError> {
        let family = self.family()?;
        let netmask = self.netmask.as_ref().ok_or_else(|| {
            NetApplyError::Decode(format!("network '{}' has no netmask", self.id))
        })?;
        netmask.prefix_length(family)
    }

    /// Address in `ip/prefixlen` form
    pub fn address_cidr(&self) -> Result<String, NetApplyError> {
        let ip = self.ip_address.as_deref().ok_or_else(|| {
            NetApplyError::Decode(format!("network '{}' has no ip_address", self.id))
        })?;
        Ok(format!("{}/{}", ip, self.prefix_length()?))
    }

    /// First route with a zero-length prefix, in declaration order
    pub fn default_route(&self) -> Result<Option<&Route>, NetApplyError> {
        for route in &self.routes {
            if route.is_default()? {
                return Ok(Some(route));
            }
        }
        Ok(None)
    }

    /// Gateway of the default route, required by gateway-keyword renderers
    pub fn require_gateway(&self) -> Result<&str, NetApplyError> {
        self.default_route()?
            .map(|route| route.gateway.as_str())
            .ok_or_else(|| NetApplyError::NoGatewayFound(self.id.clone()))
    }

    /// Routes with the default route first, the rest in declaration order
    pub fn ordered_routes(&self) -> Result<Vec<&Route>, NetApplyError> {
        let mut defaults = Vec::new();
        let mut others = Vec::new();
        for route in &self.routes {
            if route.is_default()? {
                defaults.push(route);
            } else {
                others.push(route);
            }
        }
        defaults.extend(others);
        Ok(defaults)
    }
}

impl NetworkData {
    /// Decode a payload given either as raw JSON or as base64 encoded JSON.
    ///
    /// Blank input, `null` and `{}` all decode to an empty model.
    pub fn decode(payload: &str) -> Result<Self, NetApplyError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(Self::default());
        }

        let json = if payload.starts_with('{') || payload == "null" {
            payload.to_string()
        } else {
            debug!("Network data is not raw JSON, decoding as base64");
            let compact: String = payload.split_whitespace().collect();
            let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
            String::from_utf8(bytes)
                .map_err(|e| NetApplyError::Decode(format!("payload is not UTF-8: {}", e)))?
        };

        let data: Option<Self> = serde_json::from_str(&json)
            .map_err(|e| NetApplyError::Decode(format!("invalid JSON: {}", e)))?;
        let data = data.unwrap_or_default();
        data.validate()?;
        Ok(data)
    }

    /// Build from an already parsed JSON document
    pub fn from_value(value: serde_json::Value) -> Result<Self, NetApplyError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let data: Self = serde_json::from_value(value)
            .map_err(|e| NetApplyError::Decode(format!("invalid network data: {}", e)))?;
        data.validate()?;
        Ok(data)
    }

    /// Nothing to configure
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.networks.is_empty()
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.id == id)
    }

    /// Networks bound to a link, in declaration order
    pub fn networks_for_link<'a>(&'a self, link_id: &'a str) -> impl Iterator<Item = &'a Network> {
        self.networks.iter().filter(move |net| net.link == link_id)
    }

    /// DNS servers for a link, deduplicated in declaration order.
    ///
    /// Falls back to the top-level services when none of the link's
    /// networks declare DNS.
    pub fn dns_for_link(&self, link_id: &str) -> Vec<String> {
        let from_networks: Vec<&Service> = self
            .networks_for_link(link_id)
            .flat_map(|net| net.services.iter())
            .filter(|svc| svc.is_dns())
            .collect();

        let services: Vec<&Service> = if from_networks.is_empty() {
            self.services.iter().filter(|svc| svc.is_dns()).collect()
        } else {
            from_networks
        };

        let mut seen = HashSet::new();
        services
            .into_iter()
            .filter(|svc| seen.insert(svc.address.as_str()))
            .map(|svc| svc.address.clone())
            .collect()
    }

    /// Check referential integrity and required static fields
    pub fn validate(&self) -> Result<(), NetApplyError> {
        for network in &self.networks {
            if self.link(&network.link).is_none() {
                return Err(NetApplyError::UnknownLink {
                    network: network.id.clone(),
                    link: network.link.clone(),
                });
            }
            if network.network_type.is_static() {
                network.address_cidr()?;
            }
        }
        Ok(())
    }
}

/// The canonical two-network example used across unit tests
#[cfg(test)]
pub(crate) const SAMPLE_NETWORK_DATA: &str = r#"
{
    "links": [
        {"id": "tapef0ec56c-88", "mtu": 1420, "ethernet_mac_address": "fa:16:3e:7a:61:64"}
    ],
    "networks": [
        {
            "id": "network0", "link": "tapef0ec56c-88", "type": "ipv4",
            "netmask": "255.255.255.0", "ip_address": "192.168.5.22",
            "routes": [{"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "192.168.5.1"}],
            "services": [{"type": "dns", "address": "8.8.8.8"}]
        },
        {
            "id": "network1", "link": "tapef0ec56c-88", "type": "ipv6",
            "netmask": "ffff:ffff:ffff:ffff::", "ip_address": "fe80::9",
            "routes": [{"network": "::", "netmask": "::", "gateway": "fe80::1ff:fe23:4567:890a"}],
            "services": [{"type": "dns", "address": "2001:4860:4860::8888"}]
        }
    ],
    "services": [{"type": "dns", "address": "1.1.1.1"}]
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_raw_json() {
        let data = NetworkData::decode(SAMPLE_NETWORK_DATA).unwrap();
        assert_eq!(data.links.len(), 1);
        assert_eq!(data.links[0].mtu, Some(1420));
        assert_eq!(data.links[0].mac_address, "fa:16:3e:7a:61:64");
        assert_eq!(data.networks.len(), 2);
        assert_eq!(data.networks[0].network_type, NetworkType::Ipv4);
        assert_eq!(data.networks[1].address_cidr().unwrap(), "fe80::9/64");
    }

    #[test]
    fn test_decode_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(SAMPLE_NETWORK_DATA);
        let data = NetworkData::decode(&encoded).unwrap();
        assert_eq!(data, NetworkData::decode(SAMPLE_NETWORK_DATA).unwrap());
    }

    #[test]
    fn test_decode_empty() {
        assert!(NetworkData::decode("").unwrap().is_empty());
        assert!(NetworkData::decode("{}").unwrap().is_empty());
        assert!(NetworkData::decode("null").unwrap().is_empty());
        let encoded = base64::engine::general_purpose::STANDARD.encode("{}");
        assert!(NetworkData::decode(&encoded).unwrap().is_empty());
        assert!(NetworkData::from_value(serde_json::Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            NetworkData::decode("not base64 at all!"),
            Err(NetApplyError::Decode(_))
        ));
        assert!(matches!(
            NetworkData::decode("{\"links\": ["),
            Err(NetApplyError::Decode(_))
        ));
        let encoded = base64::engine::general_purpose::STANDARD.encode("{oops");
        assert!(matches!(
            NetworkData::decode(&encoded),
            Err(NetApplyError::Decode(_))
        ));
    }

    #[test]
    fn test_overlong_netmask_rejected_at_decode() {
        let json = format!(
            r#"{{"links": [{{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}}],
                "networks": [{{"id": "n0", "link": "l0", "type": "ipv6",
                               "netmask": "{}", "ip_address": "fe80::9"}}]}}"#,
            vec!["ffff"; 17].join(":")
        );
        assert!(matches!(
            NetworkData::decode(&json),
            Err(NetApplyError::InvalidMask(_))
        ));
    }

    #[test]
    fn test_unknown_link_rejected() {
        let json = r#"{"links": [], "networks": [
            {"id": "n0", "link": "missing", "type": "ipv4_dhcp"}
        ]}"#;
        assert!(matches!(
            NetworkData::decode(json),
            Err(NetApplyError::UnknownLink { .. })
        ));
    }

    #[test]
    fn test_numeric_netmask_and_null_mtu() {
        let json = r#"{
            "links": [{"id": "l0", "mtu": null, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv4",
                          "netmask": 24, "ip_address": "10.0.0.5",
                          "routes": [{"network": "0.0.0.0", "netmask": 0, "gateway": "10.0.0.1"}]}]
        }"#;
        let data = NetworkData::decode(json).unwrap();
        assert_eq!(data.links[0].mtu, None);
        assert_eq!(data.networks[0].address_cidr().unwrap(), "10.0.0.5/24");
        assert_eq!(data.networks[0].require_gateway().unwrap(), "10.0.0.1");
    }

    #[test]
    fn test_unsupported_type_preserved() {
        let json = r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv6_slaac"}]
        }"#;
        let data = NetworkData::decode(json).unwrap();
        assert_eq!(
            data.networks[0].network_type,
            NetworkType::Unsupported("ipv6_slaac".to_string())
        );
        assert!(matches!(
            data.networks[0].family(),
            Err(NetApplyError::UnsupportedNetworkType(_))
        ));
    }

    #[test]
    fn test_default_route_first_found() {
        let json = r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv4",
                          "netmask": "255.255.255.0", "ip_address": "10.0.0.5",
                          "routes": [
                            {"network": "172.16.0.0", "netmask": "255.240.0.0", "gateway": "10.0.0.254"},
                            {"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.0.1"},
                            {"network": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.0.2"}
                          ]}]
        }"#;
        let data = NetworkData::decode(json).unwrap();
        let net = &data.networks[0];
        assert_eq!(net.require_gateway().unwrap(), "10.0.0.1");

        let ordered: Vec<&str> = net
            .ordered_routes()
            .unwrap()
            .iter()
            .map(|r| r.gateway.as_str())
            .collect();
        assert_eq!(ordered, vec!["10.0.0.1", "10.0.0.2", "10.0.0.254"]);
        assert_eq!(net.routes[0].destination().unwrap(), "172.16.0.0/12");
    }

    #[test]
    fn test_no_gateway() {
        let json = r#"{
            "links": [{"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"}],
            "networks": [{"id": "n0", "link": "l0", "type": "ipv4",
                          "netmask": "255.255.255.0", "ip_address": "10.0.0.5"}]
        }"#;
        let data = NetworkData::decode(json).unwrap();
        assert!(matches!(
            data.networks[0].require_gateway(),
            Err(NetApplyError::NoGatewayFound(id)) if id == "n0"
        ));
    }

    #[test]
    fn test_dns_dedup_and_global_fallback() {
        let json = r#"{
            "links": [
                {"id": "l0", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:01"},
                {"id": "l1", "mtu": 1500, "ethernet_mac_address": "fa:16:3e:00:00:02"}
            ],
            "networks": [
                {"id": "n0", "link": "l0", "type": "ipv4_dhcp",
                 "services": [{"type": "dns", "address": "8.8.8.8"}, {"type": "ntp", "address": "10.0.0.9"}]},
                {"id": "n1", "link": "l0", "type": "ipv6_dhcp",
                 "services": [{"type": "dns", "address": "8.8.4.4"}, {"type": "dns", "address": "8.8.8.8"}]},
                {"id": "n2", "link": "l1", "type": "ipv4_dhcp"}
            ],
            "services": [{"type": "dns", "address": "1.1.1.1"}]
        }"#;
        let data = NetworkData::decode(json).unwrap();
        assert_eq!(data.dns_for_link("l0"), vec!["8.8.8.8", "8.8.4.4"]);
        assert_eq!(data.dns_for_link("l1"), vec!["1.1.1.1"]);
    }
}
