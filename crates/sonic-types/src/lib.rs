//! Common SONiC network primitives.
//!
//! Shared by the DTEL report engine and its daemon:
//!
//! - [`IpPrefix`]: IPv4/IPv6 network prefixes with containment checks
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`Ternary`]: value/mask matcher used by watchlist keys
//! - [`PortRange`]: inclusive L4 port range

mod ip;
mod mac;
mod ternary;

pub use ip::IpPrefix;
pub use mac::MacAddress;
pub use ternary::{PortRange, Ternary};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid ternary value: {0}")]
    InvalidTernary(String),

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),
}
