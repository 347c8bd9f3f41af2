//! Structural classification of IP addresses.
//!
//! Addresses are classified from their parsed octets/segments, never from
//! their textual form, so alternate notations cannot slip past.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Why an address counts as internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpClass {
    /// `0.0.0.0/8` or `::`.
    Unspecified,
    /// `127.0.0.0/8` or `::1`.
    Loopback,
    /// `169.254.0.0/16` or `fe80::/10`.
    LinkLocal,
    /// Cloud instance metadata endpoints.
    Metadata,
    /// RFC 1918: `10/8`, `172.16/12`, `192.168/16`.
    Private,
    /// IPv6 unique local, `fc00::/7`.
    UniqueLocal,
    /// Carrier-grade NAT, `100.64.0.0/10`.
    SharedAddress,
    /// `224.0.0.0/4` or `ff00::/8`.
    Multicast,
    /// `240.0.0.0/4`, the limited broadcast address included.
    Reserved,
}

impl IpClass {
    pub fn reason(self) -> &'static str {
        match self {
            IpClass::Unspecified => "unspecified address",
            IpClass::Loopback => "loopback address",
            IpClass::LinkLocal => "link-local address",
            IpClass::Metadata => "cloud metadata endpoint",
            IpClass::Private => "private-use address",
            IpClass::UniqueLocal => "unique local address (fc00::/7)",
            IpClass::SharedAddress => "shared address space (100.64.0.0/10)",
            IpClass::Multicast => "multicast address",
            IpClass::Reserved => "reserved or broadcast address",
        }
    }
}

impl fmt::Display for IpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// AWS IPv6 instance metadata service.
const AWS_METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Classify an address. `None` means publicly routable as far as we care.
pub fn classify_ip(ip: IpAddr) -> Option<IpClass> {
    match ip {
        IpAddr::V4(ipv4) => classify_ipv4(ipv4),
        IpAddr::V6(ipv6) => classify_ipv6(ipv6),
    }
}

fn classify_ipv4(ip: Ipv4Addr) -> Option<IpClass> {
    // 0.0.0.0/8 reaches the local host on most stacks
    if ip.octets()[0] == 0 {
        return Some(IpClass::Unspecified);
    }

    if ip.is_loopback() {
        return Some(IpClass::Loopback);
    }

    // Checked before link-local so 169.254.169.254 reports as metadata.
    if is_metadata_ipv4(ip) {
        return Some(IpClass::Metadata);
    }

    if ip.is_link_local() {
        return Some(IpClass::LinkLocal);
    }

    if ip.is_private() {
        return Some(IpClass::Private);
    }

    // after metadata: 100.100.100.200 sits inside this range
    if is_shared_ipv4(ip) {
        return Some(IpClass::SharedAddress);
    }

    if ip.is_multicast() {
        return Some(IpClass::Multicast);
    }

    if ip.octets()[0] >= 240 {
        return Some(IpClass::Reserved);
    }

    None
}

fn classify_ipv6(ip: Ipv6Addr) -> Option<IpClass> {
    if ip.is_unspecified() {
        return Some(IpClass::Unspecified);
    }

    // ::1 before the IPv4-compatible check, which would read it as 0.0.0.1
    if ip.is_loopback() {
        return Some(IpClass::Loopback);
    }

    if let Some(ipv4) = embedded_ipv4(ip) {
        return classify_ipv4(ipv4);
    }

    if ip == AWS_METADATA_V6 {
        return Some(IpClass::Metadata);
    }

    if is_ipv6_link_local(ip) {
        return Some(IpClass::LinkLocal);
    }

    if is_ipv6_unique_local(ip) {
        return Some(IpClass::UniqueLocal);
    }

    if ip.is_multicast() {
        return Some(IpClass::Multicast);
    }

    None
}

/// Extract an IPv4 address carried inside an IPv6 one.
///
/// Covers IPv4-mapped (`::ffff:a.b.c.d`), the deprecated IPv4-compatible
/// form (`::a.b.c.d`) and the NAT64 well-known prefix (`64:ff9b::/96`).
pub(crate) fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return Some(ipv4);
    }

    let segments = ip.segments();
    let tail = Ipv4Addr::new(
        (segments[6] >> 8) as u8,
        segments[6] as u8,
        (segments[7] >> 8) as u8,
        segments[7] as u8,
    );

    if segments[0..6] == [0, 0, 0, 0, 0, 0] {
        return Some(tail);
    }

    if segments[0..6] == [0x0064, 0xff9b, 0, 0, 0, 0] {
        return Some(tail);
    }

    None
}

fn is_metadata_ipv4(ip: Ipv4Addr) -> bool {
    // AWS/GCP/Azure, then Alibaba Cloud
    ip == Ipv4Addr::new(169, 254, 169, 254) || ip == Ipv4Addr::new(100, 100, 100, 200)
}

/// 100.64.0.0/10 (`is_shared` is unstable).
fn is_shared_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 100 && (b & 0xc0) == 0x40
}

/// fe80::/10 (`is_unicast_link_local` is unstable).
fn is_ipv6_link_local(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// fc00::/7
fn is_ipv6_unique_local(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}
