//! IP prefix type with containment and specificity helpers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or 2001:db8::/32).
///
/// The stored address is always the network address: host bits are
/// cleared on construction, so `10.1.2.3/24` and `10.1.2.0/24` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddr,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new IP prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length is invalid for the address type
    /// (>32 for IPv4, >128 for IPv6).
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = Self::max_len_for(&address);
        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {} for address type",
                prefix_len, max_len
            )));
        }

        let address = match address {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4) & Self::v4_mask(prefix_len);
                IpAddr::V4(Ipv4Addr::from(bits))
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6) & Self::v6_mask(prefix_len);
                IpAddr::V6(Ipv6Addr::from(bits))
            }
        };

        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// Creates a host prefix (/32 or /128) for a single address.
    pub fn host(address: IpAddr) -> Self {
        IpPrefix {
            prefix_len: Self::max_len_for(&address),
            address,
        }
    }

    /// Builds a prefix from an address and a contiguous netmask
    /// (e.g. `255.255.255.0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the families differ or the mask is not contiguous.
    pub fn from_mask(address: IpAddr, mask: IpAddr) -> Result<Self, ParseError> {
        let (ones, contiguous) = match (address, mask) {
            (IpAddr::V4(_), IpAddr::V4(m)) => {
                let bits = u32::from(m);
                (bits.count_ones(), bits.leading_ones() == bits.count_ones())
            }
            (IpAddr::V6(_), IpAddr::V6(m)) => {
                let bits = u128::from(m);
                (bits.count_ones(), bits.leading_ones() == bits.count_ones())
            }
            _ => {
                return Err(ParseError::InvalidIpPrefix(format!(
                    "address {} and mask {} are different families",
                    address, mask
                )))
            }
        };

        if !contiguous {
            return Err(ParseError::InvalidIpPrefix(format!(
                "mask {} is not contiguous",
                mask
            )));
        }

        IpPrefix::new(address, ones as u8)
    }

    /// Returns the network address of this prefix.
    pub const fn address(&self) -> &IpAddr {
        &self.address
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if this is an IPv4 prefix.
    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    /// Returns true if this is a host route (/32 for IPv4, /128 for IPv6).
    pub fn is_host_route(&self) -> bool {
        self.prefix_len == Self::max_len_for(&self.address)
    }

    /// Returns true if `addr` falls inside this prefix.
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.address, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                u32::from(*a) & Self::v4_mask(self.prefix_len) == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                u128::from(*a) & Self::v6_mask(self.prefix_len) == u128::from(net)
            }
            _ => false,
        }
    }

    fn max_len_for(address: &IpAddr) -> u8 {
        match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    fn v4_mask(len: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0)
    }

    fn v6_mask(len: u8) -> u128 {
        u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    /// Accepts `addr/len`, `addr/netmask` or a bare address (host prefix).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((addr_str, len_str)) = s.rsplit_once('/') else {
            let address: IpAddr = s
                .parse()
                .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))?;
            return Ok(IpPrefix::host(address));
        };

        let address: IpAddr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr_str.to_string()))?;

        if let Ok(prefix_len) = len_str.parse::<u8>() {
            return IpPrefix::new(address, prefix_len);
        }

        let mask: IpAddr = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        IpPrefix::from_mask(address, mask)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> Self {
        prefix.to_string()
    }
}
