//! Destination allow-list
//!
//! A fixed set of CIDR ranges, built once from configuration. IPv4 and
//! IPv6 ranges are kept apart: `0.0.0.0/0` allows every IPv4 destination
//! and nothing else.

use crate::error::RelayError;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;

/// Immutable set of permitted destination ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
}

impl AllowList {
    /// Build from range strings such as `"10.0.0.0/8"` or `"2001:db8::/32"`
    ///
    /// A bare address is a single-host range. Blank entries are skipped.
    pub fn from_ranges<I, S>(ranges: I) -> Result<Self, RelayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = AllowList::default();

        for range in ranges {
            let range = range.as_ref().trim();
            if range.is_empty() {
                continue;
            }
            let net = parse_range(range)?;
            match net {
                IpNet::V4(n) => list.v4.push(n.trunc()),
                IpNet::V6(n) => list.v6.push(n.trunc()),
            }
        }

        Ok(list)
    }

    /// Build from a semicolon-separated list
    pub fn parse(ranges: &str) -> Result<Self, RelayError> {
        Self::from_ranges(ranges.split(';'))
    }

    /// Whether `ip` falls inside at least one configured range
    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.v4.iter().any(|n| n.contains(&v4)),
            IpAddr::V6(v6) => self.v6.iter().any(|n| n.contains(&v6)),
        }
    }

    /// Textual variant of [`contains`](Self::contains); unparseable input is not allowed
    pub fn contains_str(&self, ip: &str) -> bool {
        ip.trim()
            .parse::<IpAddr>()
            .map(|ip| self.contains(ip))
            .unwrap_or(false)
    }

    /// Number of configured ranges
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Whether no range is configured, denying every destination
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_range(range: &str) -> Result<IpNet, RelayError> {
    if let Ok(net) = range.parse::<IpNet>() {
        return Ok(net);
    }
    let invalid = || RelayError::Config(format!("invalid allow-list range: {}", range));
    let ip: IpAddr = range.parse().map_err(|_| invalid())?;
    let host_prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, host_prefix).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ipv4_range() {
        let list = AllowList::from_ranges(["192.0.2.0/24"]).unwrap();
        assert!(list.contains_str("192.0.2.10"));
        assert!(list.contains_str("192.0.2.255"));
        assert!(!list.contains_str("203.0.113.5"));
        assert!(!list.contains_str("192.0.3.1"));
    }

    #[test]
    fn test_ipv4_wildcard_does_not_cover_ipv6() {
        let list = AllowList::parse("0.0.0.0/0").unwrap();
        assert!(list.contains_str("8.8.8.8"));
        assert!(list.contains_str("0.0.0.0"));
        assert!(!list.contains_str("::1"));
        assert!(!list.contains_str("2001:db8::1"));

        let list = AllowList::parse("0.0.0.0/0;::/0").unwrap();
        assert!(list.contains_str("2001:db8::1"));
    }

    #[test]
    fn test_ipv6_range() {
        let list = AllowList::parse("2001:db8::/32").unwrap();
        assert!(list.contains_str("2001:db8:1234::1"));
        assert!(!list.contains_str("2001:db9::1"));
        assert!(!list.contains_str("10.0.0.1"));
    }

    #[test]
    fn test_unparseable_input_is_not_allowed() {
        let list = AllowList::parse("0.0.0.0/0;::/0").unwrap();
        assert!(!list.contains_str("example.test"));
        assert!(!list.contains_str(""));
        assert!(!list.contains_str("300.1.1.1"));
    }

    #[test]
    fn test_bare_address_is_single_host() {
        let list = AllowList::parse("198.51.100.7;::1").unwrap();
        assert!(list.contains_str("198.51.100.7"));
        assert!(!list.contains_str("198.51.100.8"));
        assert!(list.contains_str("::1"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_host_bits_are_truncated() {
        let list = AllowList::parse("10.1.2.3/8").unwrap();
        assert!(list.contains_str("10.200.0.1"));
    }

    #[test]
    fn test_blank_entries_skipped() {
        let list = AllowList::parse(" ; 10.0.0.0/8 ;").unwrap();
        assert_eq!(list.len(), 1);

        let empty = AllowList::parse("").unwrap();
        assert!(empty.is_empty());
        assert!(!empty.contains_str("10.0.0.1"));
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(AllowList::parse("10.0.0.0/33").is_err());
        assert!(AllowList::parse("not-a-range").is_err());
        assert!(AllowList::from_ranges(["10.0.0.0/8", "fe80::/129"]).is_err());
    }
}
