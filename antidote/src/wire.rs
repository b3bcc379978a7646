//! Ethernet + ARP frame decoding.
//!
//! The capture filter only hands over frames matching the `arp`
//! expression, so decoding is classification rather than validation:
//! pull the opcode and the four address fields out, and map everything
//! that is not a well-formed ARP request or reply over Ethernet/IPv4 to
//! [`ArpOp::Other`] (reverse ARP included).
//!
//! The sender MAC is kept twice on purpose: once from the Ethernet
//! header and once from the ARP body. A sender that cannot (or forgets
//! to) forge both is exactly what the audit engine wants to see.

use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    Ipv4Address,
};

/// Placeholder MAC for addresses no reply has been observed from yet.
pub const UNKNOWN_MAC: EthernetAddress = EthernetAddress([0; 6]);

/// ARP opcode, as far as the monitor cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Other,
}

/// One decoded ARP sighting. Transient; the audit engine folds it into
/// the state table and the value is never kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpObservation {
    pub op: ArpOp,
    /// Source MAC from the Ethernet header.
    pub sender_mac_eth: EthernetAddress,
    /// Sender hardware address from the ARP body.
    pub sender_mac_arp: EthernetAddress,
    pub sender_ip: Ipv4Address,
    pub target_ip: Ipv4Address,
}

impl ArpObservation {
    fn other() -> Self {
        ArpObservation {
            op: ArpOp::Other,
            sender_mac_eth: UNKNOWN_MAC,
            sender_mac_arp: UNKNOWN_MAC,
            sender_ip: Ipv4Address::UNSPECIFIED,
            target_ip: Ipv4Address::UNSPECIFIED,
        }
    }
}

/// Decode a raw captured frame. Infallible: anything too short or not an
/// Ethernet/IPv4 ARP request or reply classifies as [`ArpOp::Other`].
pub fn decode(frame: &[u8]) -> ArpObservation {
    let eth = match EthernetFrame::new_checked(frame) {
        Ok(eth) => eth,
        Err(_) => return ArpObservation::other(),
    };
    if eth.ethertype() != EthernetProtocol::Arp {
        return ArpObservation::other();
    }
    let packet = match ArpPacket::new_checked(eth.payload()) {
        Ok(packet) => packet,
        Err(_) => return ArpObservation::other(),
    };
    let repr = match ArpRepr::parse(&packet) {
        Ok(repr) => repr,
        Err(_) => return ArpObservation::other(),
    };
    let (operation, source_hardware_addr, source_protocol_addr, target_protocol_addr) = match repr
    {
        ArpRepr::EthernetIpv4 {
            operation,
            source_hardware_addr,
            source_protocol_addr,
            target_protocol_addr,
            ..
        } => (
            operation,
            source_hardware_addr,
            source_protocol_addr,
            target_protocol_addr,
        ),
        _ => return ArpObservation::other(),
    };
    let op = match operation {
        ArpOperation::Request => ArpOp::Request,
        ArpOperation::Reply => ArpOp::Reply,
        _ => return ArpObservation::other(),
    };
    ArpObservation {
        op,
        sender_mac_eth: eth.src_addr(),
        sender_mac_arp: source_hardware_addr,
        sender_ip: source_protocol_addr,
        target_ip: target_protocol_addr,
    }
}

/// Colon-separated lowercase hex, the way operators read MACs.
/// smoltcp's own `Display` uses dashes.
pub fn format_mac(mac: &EthernetAddress) -> String {
    let b = mac.0;
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    )
}

/// Build a complete Ethernet + ARP frame.
///
/// The Ethernet source and the ARP sender hardware address are separate
/// arguments so callers can forge the mismatch the audit engine checks
/// for.
pub fn build_frame(
    operation: ArpOperation,
    eth_src: EthernetAddress,
    arp_sha: EthernetAddress,
    sender_ip: Ipv4Address,
    target_ip: Ipv4Address,
) -> Vec<u8> {
    let repr = ArpRepr::EthernetIpv4 {
        operation,
        source_hardware_addr: arp_sha,
        source_protocol_addr: sender_ip,
        target_hardware_addr: EthernetAddress::BROADCAST,
        target_protocol_addr: target_ip,
    };
    let mut buf = vec![0u8; EthernetFrame::<&[u8]>::header_len() + repr.buffer_len()];
    let mut eth = EthernetFrame::new_unchecked(&mut buf[..]);
    eth.set_dst_addr(EthernetAddress::BROADCAST);
    eth.set_src_addr(eth_src);
    eth.set_ethertype(EthernetProtocol::Arp);
    let mut packet = ArpPacket::new_unchecked(eth.payload_mut());
    repr.emit(&mut packet);
    buf
}
