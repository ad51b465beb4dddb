//! SSRF protection: classify a hostname or URL as safe or blocked.
//!
//! Mirrors the validate-then-classify shape of a path-security check, but
//! over hosts and IP literals instead of filesystem paths: resolve the
//! input to a concrete form, then run it through an ordered set of block
//! rules, returning the first matching reason.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::Url;

/// Why a host was blocked. Grouped into the four categories §4.A names;
/// callers should not need finer detail than this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Localhost,
    PrivateNetwork,
    CloudMetadata,
    Other,
}

impl BlockReason {
    pub fn message(&self, host: &str) -> String {
        match self {
            BlockReason::Localhost => format!("'{host}' is a loopback address"),
            BlockReason::PrivateNetwork => format!("'{host}' is in a private network range"),
            BlockReason::CloudMetadata => {
                format!("'{host}' is a cloud metadata endpoint")
            }
            BlockReason::Other => format!("'{host}' is blocked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Safe,
    Blocked(BlockReason),
    InvalidUrlFormat,
}

const METADATA_HOSTNAMES: &[&str] = &["metadata.google.internal", "instance-data.ec2.internal"];

/// Classify a bare hostname or IP literal (no scheme, no path).
pub fn classify(host: &str) -> Classification {
    let lower = host.to_ascii_lowercase();

    if METADATA_HOSTNAMES.contains(&lower.as_str()) {
        return Classification::Blocked(BlockReason::CloudMetadata);
    }

    match parse_ip_literal(&lower) {
        Some(ip) => classify_ip(ip),
        None => Classification::Safe,
    }
}

/// Classify the host embedded in a URL. Parses first; a malformed URL is
/// reported as `InvalidUrlFormat` rather than panicking or defaulting to
/// safe.
pub fn classify_url(url: &str) -> Classification {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return Classification::InvalidUrlFormat,
    };
    match parsed.host_str() {
        Some(host) => classify(host),
        None => Classification::InvalidUrlFormat,
    }
}

fn classify_ip(ip: IpAddr) -> Classification {
    match ip {
        IpAddr::V4(v4) => classify_ipv4(v4),
        IpAddr::V6(v6) => classify_ipv6(v6),
    }
}

fn classify_ipv4(ip: Ipv4Addr) -> Classification {
    let octets = ip.octets();

    if ip.is_loopback() || ip == Ipv4Addr::new(0, 0, 0, 0) {
        return Classification::Blocked(BlockReason::Localhost);
    }
    if octets == [169, 254, 169, 254] || octets == [169, 254, 169, 253] {
        return Classification::Blocked(BlockReason::CloudMetadata);
    }
    if ip.is_private() {
        return Classification::Blocked(BlockReason::PrivateNetwork);
    }
    if ip.is_link_local() {
        return Classification::Blocked(BlockReason::PrivateNetwork);
    }
    if ip.is_multicast() {
        return Classification::Blocked(BlockReason::Other);
    }
    Classification::Safe
}

fn classify_ipv6(ip: Ipv6Addr) -> Classification {
    // IPv4-mapped IPv6 (::ffff:a.b.c.d): unwrap and recheck against IPv4 rules.
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return classify_ipv4(mapped);
    }

    if ip.is_loopback() {
        return Classification::Blocked(BlockReason::Localhost);
    }

    let segments = ip.segments();

    // fd00:ec2::254 — AWS IMDSv2 link-local IPv6 metadata address.
    if segments == [0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254] {
        return Classification::Blocked(BlockReason::CloudMetadata);
    }

    // fe80::/10 link-local.
    if (segments[0] & 0xffc0) == 0xfe80 {
        return Classification::Blocked(BlockReason::PrivateNetwork);
    }
    // fc00::/7 unique local addresses.
    if (segments[0] & 0xfe00) == 0xfc00 {
        return Classification::Blocked(BlockReason::PrivateNetwork);
    }
    // ff00::/8 multicast.
    if (segments[0] & 0xff00) == 0xff00 {
        return Classification::Blocked(BlockReason::Other);
    }
    // 2002::/16 6to4 tunneling.
    if segments[0] == 0x2002 {
        return Classification::Blocked(BlockReason::Other);
    }
    // 2001:db8::/32 documentation range.
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return Classification::Blocked(BlockReason::Other);
    }
    // 2001::/32 Teredo tunneling.
    if segments[0] == 0x2001 && segments[1] == 0x0000 {
        return Classification::Blocked(BlockReason::Other);
    }
    // 64:ff9b::/96 NAT64 well-known prefix.
    if segments[0] == 0x0064 && segments[1] == 0xff9b && segments[2] == 0 && segments[3] == 0 {
        return Classification::Blocked(BlockReason::Other);
    }

    Classification::Safe
}

/// Accept dotted-decimal, bare-decimal, dotted-octal, and dotted-hex IPv4
/// encodings in addition to what `std::net::Ipv4Addr::from_str` parses, plus
/// bracket-free IPv6 literals. Anything that isn't an IP literal at all
/// (an ordinary DNS hostname) returns `None` and is treated as safe — DNS
/// resolution is the caller's/OS's job, not this filter's.
fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    parse_alternative_ipv4(host).map(IpAddr::V4)
}

fn parse_alternative_ipv4(host: &str) -> Option<Ipv4Addr> {
    // Bare decimal integer: the whole 32-bit address as one number.
    if !host.is_empty() && host.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = host.parse::<u32>() {
            return Some(Ipv4Addr::from(n));
        }
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() != 4 {
        return None;
    }

    let mut octets = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        octets[i] = parse_octet(part)?;
    }
    Some(Ipv4Addr::from(octets))
}

/// Parse a single octet written in decimal, `0x`-prefixed hex, or
/// leading-zero octal.
fn parse_octet(part: &str) -> Option<u8> {
    if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(|v| u8::try_from(v).ok());
    }
    if part.len() > 1 && part.starts_with('0') && part.bytes().all(|b| b.is_ascii_digit()) {
        return u32::from_str_radix(part, 8).ok().and_then(|v| u8::try_from(v).ok());
    }
    part.parse::<u8>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_blocked() {
        assert_eq!(
            classify("127.0.0.1"),
            Classification::Blocked(BlockReason::Localhost)
        );
        assert_eq!(
            classify("::1"),
            Classification::Blocked(BlockReason::Localhost)
        );
        assert_eq!(
            classify("0.0.0.0"),
            Classification::Blocked(BlockReason::Localhost)
        );
    }

    #[test]
    fn rfc1918_blocked() {
        assert_eq!(
            classify("10.0.0.5"),
            Classification::Blocked(BlockReason::PrivateNetwork)
        );
        assert_eq!(
            classify("172.16.0.1"),
            Classification::Blocked(BlockReason::PrivateNetwork)
        );
        assert_eq!(
            classify("192.168.1.1"),
            Classification::Blocked(BlockReason::PrivateNetwork)
        );
    }

    #[test]
    fn cloud_metadata_blocked() {
        assert_eq!(
            classify("169.254.169.254"),
            Classification::Blocked(BlockReason::CloudMetadata)
        );
        assert_eq!(
            classify("metadata.google.internal"),
            Classification::Blocked(BlockReason::CloudMetadata)
        );
        assert_eq!(
            classify("METADATA.GOOGLE.INTERNAL"),
            Classification::Blocked(BlockReason::CloudMetadata)
        );
        assert_eq!(
            classify("fd00:ec2::254"),
            Classification::Blocked(BlockReason::CloudMetadata)
        );
    }

    #[test]
    fn ipv4_mapped_ipv6_recheck() {
        assert_eq!(
            classify("::ffff:127.0.0.1"),
            Classification::Blocked(BlockReason::Localhost)
        );
    }

    #[test]
    fn alternative_ipv4_encodings_blocked() {
        // 127.0.0.1 as a bare decimal integer.
        assert_eq!(
            classify("2130706433"),
            Classification::Blocked(BlockReason::Localhost)
        );
        // dotted-octal 10.0.0.1
        assert_eq!(
            classify("012.0.0.1"),
            Classification::Blocked(BlockReason::PrivateNetwork)
        );
        // dotted-hex 10.0.0.1
        assert_eq!(
            classify("0xa.0x0.0x0.0x1"),
            Classification::Blocked(BlockReason::PrivateNetwork)
        );
    }

    #[test]
    fn public_address_safe() {
        assert_eq!(classify("8.8.8.8"), Classification::Safe);
        assert_eq!(classify("example.com"), Classification::Safe);
    }

    #[test]
    fn classify_url_variants() {
        assert_eq!(
            classify_url("http://169.254.169.254/latest/meta-data/"),
            Classification::Blocked(BlockReason::CloudMetadata)
        );
        assert_eq!(classify_url("http://8.8.8.8/"), Classification::Safe);
        assert_eq!(classify_url("not a url"), Classification::InvalidUrlFormat);
    }

    #[test]
    fn classify_is_deterministic_and_case_stable() {
        for _ in 0..3 {
            assert_eq!(classify("Metadata.Google.Internal"), classify("METADATA.GOOGLE.INTERNAL"));
        }
    }
}
