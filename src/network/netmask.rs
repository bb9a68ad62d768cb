//! Netmask to CIDR prefix length conversion
//!
//! Metadata services hand out masks as dotted IPv4 masks, colon separated
//! IPv6 masks, or plain prefix lengths. Every address and route line that
//! gets rendered or applied goes through [`prefix_length`].

use crate::NetApplyError;

/// Contiguous leading-one patterns for a single IPv6 hextet, indexed by
/// the number of set bits.
const HEXTET_PREFIXES: [u16; 17] = [
    0x0000, 0x8000, 0xc000, 0xe000, 0xf000, 0xf800, 0xfc00, 0xfe00, 0xff00, 0xff80, 0xffc0,
    0xffe0, 0xfff0, 0xfff8, 0xfffc, 0xfffe, 0xffff,
];

/// Address family of a mask or address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Guess the family from textual form: anything with a ':' is IPv6
    pub fn of(value: &str) -> Self {
        if value.contains(':') {
            Self::Ipv6
        } else {
            Self::Ipv4
        }
    }

    /// `ip` command family flag
    pub fn ip_flag(&self) -> &'static str {
        match self {
            Self::Ipv4 => "-4",
            Self::Ipv6 => "-6",
        }
    }
}

/// Convert a netmask or prefix string into a prefix length.
///
/// A string that already parses as an integer is returned unchanged.
/// Otherwise the family is picked from the presence of ':'.
pub fn prefix_length(mask: &str) -> Result<u8, NetApplyError> {
    prefix_length_for(mask, AddressFamily::of(mask))
}

/// Convert a netmask into a prefix length for an explicit family
pub fn prefix_length_for(mask: &str, family: AddressFamily) -> Result<u8, NetApplyError> {
    let mask = mask.trim();
    if let Ok(prefix) = mask.parse::<u8>() {
        return Ok(prefix);
    }

    match family {
        AddressFamily::Ipv4 => ipv4_prefix_length(mask),
        AddressFamily::Ipv6 => ipv6_prefix_length(mask),
    }
}

fn ipv4_prefix_length(mask: &str) -> Result<u8, NetApplyError> {
    let octets: Vec<&str> = mask.split('.').collect();
    if octets.len() != 4 {
        return Err(NetApplyError::InvalidMask(format!(
            "'{}' has {} parts, expected 4",
            mask,
            octets.len()
        )));
    }

    let mut prefix = 0u8;
    for octet in octets {
        let value: u8 = octet.parse().map_err(|_| {
            NetApplyError::InvalidMask(format!("'{}' has invalid octet '{}'", mask, octet))
        })?;
        prefix += value.count_ones() as u8;
    }
    Ok(prefix)
}

fn ipv6_prefix_length(mask: &str) -> Result<u8, NetApplyError> {
    let mut prefix = 0u8;
    for (index, word) in mask.split(':').enumerate() {
        if index >= 8 {
            return Err(NetApplyError::InvalidMask(format!(
                "'{}' has more than 8 hextets",
                mask
            )));
        }
        if word.is_empty() {
            break;
        }
        let value = u16::from_str_radix(word, 16).map_err(|_| {
            NetApplyError::InvalidMask(format!("'{}' has invalid hextet '{}'", mask, word))
        })?;
        if value == 0 {
            break;
        }
        let bits = HEXTET_PREFIXES
            .iter()
            .position(|&pattern| pattern == value)
            .ok_or_else(|| {
                NetApplyError::InvalidMask(format!(
                    "'{}' has non-contiguous hextet '{}'",
                    mask, word
                ))
            })?;
        prefix += bits as u8;
    }
    Ok(prefix)
}
