use std::collections::BTreeSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use anyhow::{Context, Result};
use ipnet::IpNet;
use tracing::{debug, info, warn};

use crate::error::ConfigError;

const MAX_RANGE_ADDRESSES: u32 = 10_000;
const MAX_IPV6_HOSTS: usize = 1_000;
/// IPv4 networks larger than this are reduced to their first and last host.
const MAX_IPV4_NETWORK_ADDRESSES: u64 = 65_536;

/// Expand a target specification into a sorted, deduplicated address list.
///
/// Accepts single addresses, CIDR blocks (prefix or dotted netmask),
/// `start-end` IPv4 ranges and comma-separated combinations of these.
pub fn parse_targets(target_spec: &str) -> Result<Vec<IpAddr>, ConfigError> {
    let mut targets = BTreeSet::new();

    for part in target_spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('/') {
            targets.extend(parse_cidr(part)?);
        } else if part.contains('-') && !part.contains(':') {
            targets.extend(parse_ip_range(part)?);
        } else {
            targets.insert(parse_single_target(part)?);
        }
    }

    Ok(targets.into_iter().collect())
}

/// Read target specifications from a file, one per line.
pub fn load_targets_file(path: &Path) -> Result<Vec<IpAddr>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read target file {}", path.display()))?;

    let mut targets = BTreeSet::new();
    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_targets(line) {
            Ok(parsed) => targets.extend(parsed),
            Err(e) => warn!(line = line_number + 1, "Skipping target line: {}", e),
        }
    }

    info!("Loaded {} unique targets from {}", targets.len(), path.display());
    Ok(targets.into_iter().collect())
}

/// Merge several target lists, keeping addresses unique and sorted.
pub fn merge_targets<I>(lists: I) -> Vec<IpAddr>
where
    I: IntoIterator<Item = Vec<IpAddr>>,
{
    lists.into_iter().flatten().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Drop loopback, private and link-local addresses.
pub fn filter_local(targets: Vec<IpAddr>) -> Vec<IpAddr> {
    let before = targets.len();
    let kept: Vec<IpAddr> = targets.into_iter().filter(|ip| !is_local_ip(*ip)).collect();
    let removed = before - kept.len();
    if removed > 0 {
        info!("Removed {} local addresses", removed);
    }
    kept
}

/// Check if IP is in a loopback, private or link-local range
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_loopback() || ipv4.is_private() || ipv4.is_link_local(),
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || (first & 0xffc0) == 0xfe80 // link-local
                || (first & 0xfe00) == 0xfc00 // unique local
        }
    }
}

fn parse_cidr(cidr: &str) -> Result<Vec<IpAddr>, ConfigError> {
    let normalized = normalize_netmask(cidr)?;
    let network: IpNet = normalized
        .parse()
        .map_err(|_| ConfigError::InvalidTarget(format!("invalid CIDR notation: {}", cidr)))?;

    match network {
        IpNet::V4(net) => {
            let size = 1u64 << (32 - u32::from(net.prefix_len()));
            if size <= MAX_IPV4_NETWORK_ADDRESSES {
                return Ok(net.hosts().map(IpAddr::V4).collect());
            }
            let first = Ipv4Addr::from(u32::from(net.network()) + 1);
            let last = Ipv4Addr::from(u32::from(net.broadcast()) - 1);
            warn!(
                "Network {} has {} addresses; scanning only {} and {}",
                cidr, size, first, last
            );
            Ok(vec![IpAddr::V4(first), IpAddr::V4(last)])
        }
        IpNet::V6(net) => {
            let hosts: Vec<IpAddr> = net.hosts().take(MAX_IPV6_HOSTS).map(IpAddr::V6).collect();
            if hosts.len() == MAX_IPV6_HOSTS {
                debug!("IPv6 network {} truncated to {} hosts", cidr, MAX_IPV6_HOSTS);
            }
            Ok(hosts)
        }
    }
}

/// Rewrite `a.b.c.d/255.255.255.0` as `a.b.c.d/24`.
fn normalize_netmask(cidr: &str) -> Result<String, ConfigError> {
    let Some((address, mask)) = cidr.split_once('/') else {
        return Ok(cidr.to_string());
    };
    let (address, mask) = (address.trim(), mask.trim());

    if !mask.contains('.') {
        return Ok(format!("{}/{}", address, mask));
    }

    let mask: Ipv4Addr = mask
        .parse()
        .map_err(|_| ConfigError::InvalidTarget(format!("invalid netmask in {}", cidr)))?;
    let bits = u32::from(mask);
    // Contiguous masks only: ones followed by zeros.
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(ConfigError::InvalidTarget(format!("non-contiguous netmask in {}", cidr)));
    }
    Ok(format!("{}/{}", address, bits.leading_ones()))
}

fn parse_ip_range(range: &str) -> Result<Vec<IpAddr>, ConfigError> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| ConfigError::InvalidTarget(format!("invalid IP range format: {}", range)))?;

    let start_ip: IpAddr = start
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidTarget(format!("invalid start IP: {}", start)))?;
    let end_ip: IpAddr = end
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidTarget(format!("invalid end IP: {}", end)))?;

    match (start_ip, end_ip) {
        (IpAddr::V4(start), IpAddr::V4(end)) => {
            let start_u32 = u32::from(start);
            let end_u32 = u32::from(end);

            if start_u32 > end_u32 {
                return Err(ConfigError::InvalidTarget(format!(
                    "start IP must not be greater than end IP: {}",
                    range
                )));
            }

            if end_u32 - start_u32 >= MAX_RANGE_ADDRESSES {
                return Err(ConfigError::InvalidTarget(format!(
                    "IP range too large (max {} addresses): {}",
                    MAX_RANGE_ADDRESSES, range
                )));
            }

            Ok((start_u32..=end_u32).map(|ip| IpAddr::V4(Ipv4Addr::from(ip))).collect())
        }
        _ => Err(ConfigError::InvalidTarget(format!("unsupported range: {}", range))),
    }
}

fn parse_single_target(target: &str) -> Result<IpAddr, ConfigError> {
    target
        .parse::<IpAddr>()
        .map_err(|_| ConfigError::InvalidTarget(format!("not an IP address: {}", target)))
}
