//! Outer Ethernet/IPv4/UDP encapsulation of report packets.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use sonic_types::MacAddress;
use std::io;
use std::net::Ipv4Addr;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
/// Offset of the telemetry report within a report frame.
pub const OUTER_HEADER_LEN: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IP_PROTOCOL_UDP: u8 = 17;

/// Byte offset of the IPv4 total length field in a report frame.
pub const IPV4_TOTAL_LENGTH_OFFSET: usize = ETHERNET_HEADER_LEN + 2;
/// Byte offset of the UDP source port field in a report frame.
pub const UDP_SRC_PORT_OFFSET: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN;
/// Byte offset of the UDP length field in a report frame.
pub const UDP_LENGTH_OFFSET: usize = UDP_SRC_PORT_OFFSET + 4;

/// Addressing of one outer report header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterHeader {
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub ttl: u8,
    pub tos: u8,
    pub udp_src_port: u16,
    pub udp_dst_port: u16,
}

/// Writes Ethernet, IPv4 and UDP headers for a payload of `payload_len`
/// bytes. The IPv4 checksum is filled in; the UDP checksum is left zero.
pub fn write_outer_header(
    out: &mut Vec<u8>,
    header: &OuterHeader,
    payload_len: usize,
) -> io::Result<()> {
    let udp_len = u16::try_from(UDP_HEADER_LEN + payload_len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "report exceeds UDP size"))?;
    let ip_len = u16::try_from(IPV4_HEADER_LEN + usize::from(udp_len))
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "report exceeds IPv4 size"))?;

    out.extend_from_slice(header.dst_mac.as_bytes());
    out.extend_from_slice(header.src_mac.as_bytes());
    out.write_u16::<BigEndian>(ETHERTYPE_IPV4)?;

    let ip_start = out.len();
    out.write_u8(0x45)?;
    out.write_u8(header.tos)?;
    out.write_u16::<BigEndian>(ip_len)?;
    out.write_u16::<BigEndian>(0)?; // identification
    out.write_u16::<BigEndian>(0)?; // flags + fragment offset
    out.write_u8(header.ttl)?;
    out.write_u8(IP_PROTOCOL_UDP)?;
    out.write_u16::<BigEndian>(0)?;
    out.extend_from_slice(&header.src_ip.octets());
    out.extend_from_slice(&header.dst_ip.octets());
    let checksum = ipv4_checksum(&out[ip_start..ip_start + IPV4_HEADER_LEN]);
    BigEndian::write_u16(&mut out[ip_start + 10..ip_start + 12], checksum);

    out.write_u16::<BigEndian>(header.udp_src_port)?;
    out.write_u16::<BigEndian>(header.udp_dst_port)?;
    out.write_u16::<BigEndian>(udp_len)?;
    out.write_u16::<BigEndian>(0)?;
    Ok(())
}

/// RFC 1071 ones'-complement checksum over an IPv4 header.
pub fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(*hi) << 8 | u32::from(*lo),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
