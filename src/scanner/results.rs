use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::Credential;
use crate::scanner::classifier::{DeviceType, Vendor};

/// Application protocols tracked by the protocol surface probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Ssh,
    Telnet,
    Http,
    Https,
    Snmp,
    Netconf,
    Ftp,
    Tftp,
    Syslog,
    Radius,
    Tacacs,
    Dns,
    Ntp,
    Ldap,
    Kerberos,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Ssh => "ssh",
            Service::Telnet => "telnet",
            Service::Http => "http",
            Service::Https => "https",
            Service::Snmp => "snmp",
            Service::Netconf => "netconf",
            Service::Ftp => "ftp",
            Service::Tftp => "tftp",
            Service::Syslog => "syslog",
            Service::Radius => "radius",
            Service::Tacacs => "tacacs",
            Service::Dns => "dns",
            Service::Ntp => "ntp",
            Service::Ldap => "ldap",
            Service::Kerberos => "kerberos",
        };
        write!(f, "{}", name)
    }
}

/// Services reported as device capabilities, in report order.
pub const CAPABILITY_SERVICES: [Service; 8] = [
    Service::Ssh,
    Service::Telnet,
    Service::Http,
    Service::Https,
    Service::Snmp,
    Service::Netconf,
    Service::Ftp,
    Service::Tftp,
];

/// Outcome of one protocol surface scan. Never mutated after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSurfaceResult {
    pub host: IpAddr,
    pub open_ports: std::collections::BTreeSet<u16>,
    pub per_protocol: BTreeMap<Service, bool>,
    /// First open port per protocol, in catalog order
    pub matched_ports: BTreeMap<Service, u16>,
}

impl ProtocolSurfaceResult {
    pub fn is_open(&self, service: Service) -> bool {
        self.per_protocol.get(&service).copied().unwrap_or(false)
    }

    pub fn port_for(&self, service: Service) -> Option<u16> {
        self.matched_ports.get(&service).copied()
    }

    pub fn has_management(&self) -> bool {
        self.is_open(Service::Ssh) || self.is_open(Service::Telnet)
    }

    pub fn has_web(&self) -> bool {
        self.is_open(Service::Http) || self.is_open(Service::Https)
    }

    pub fn capabilities(&self) -> Vec<Service> {
        CAPABILITY_SERVICES.iter().copied().filter(|s| self.is_open(*s)).collect()
    }
}

/// Transport used to log in to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ssh,
    Telnet,
    Unknown,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ssh => write!(f, "ssh"),
            TransportKind::Telnet => write!(f, "telnet"),
            TransportKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Unknown,
    Active,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Unknown => write!(f, "unknown"),
            DeviceStatus::Active => write!(f, "active"),
        }
    }
}

/// Login material that worked for a device.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginUsed {
    pub username: String,
    pub password: String,
    pub enable_password: Option<String>,
}

impl LoginUsed {
    pub fn masked(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: "********".to_string(),
            enable_password: self.enable_password.as_ref().map(|_| "********".to_string()),
        }
    }
}

impl From<&Credential> for LoginUsed {
    fn from(credential: &Credential) -> Self {
        Self {
            username: credential.username.clone(),
            password: credential.password.clone(),
            enable_password: credential.enable_password.clone(),
        }
    }
}

impl fmt::Debug for LoginUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginUsed")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fully identified device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub ip: IpAddr,
    pub hostname: String,
    pub device_type: DeviceType,
    pub vendor: Option<Vendor>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub serial_number: Option<String>,
    pub protocol: TransportKind,
    pub port: u16,
    pub login: LoginUsed,
    pub capabilities: Vec<Service>,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Platform tag for automation tooling; telnet sessions get the `_telnet` variant.
    pub fn platform_tag(&self) -> String {
        match self.protocol {
            TransportKind::Telnet => self.device_type.telnet_tag(),
            _ => self.device_type.tag().to_string(),
        }
    }

    pub fn with_masked_secrets(&self) -> Self {
        Self { login: self.login.masked(), ..self.clone() }
    }
}

/// Aggregate counts over a discovery result map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStatistics {
    pub total_devices: usize,
    pub vendors: BTreeMap<String, usize>,
    pub device_types: BTreeMap<String, usize>,
    pub protocols: BTreeMap<String, usize>,
    pub status: BTreeMap<String, usize>,
}

impl DiscoveryStatistics {
    pub fn from_devices(devices: &HashMap<IpAddr, DeviceRecord>) -> Self {
        let mut stats = DiscoveryStatistics {
            total_devices: devices.len(),
            ..Default::default()
        };
        stats.protocols.insert(TransportKind::Ssh.to_string(), 0);
        stats.protocols.insert(TransportKind::Telnet.to_string(), 0);
        stats.status.insert(DeviceStatus::Active.to_string(), 0);
        stats.status.insert(DeviceStatus::Unknown.to_string(), 0);

        for device in devices.values() {
            let vendor = device
                .vendor
                .map(|v| v.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            *stats.vendors.entry(vendor).or_insert(0) += 1;
            *stats.device_types.entry(device.device_type.tag().to_string()).or_insert(0) += 1;
            if let Some(count) = stats.protocols.get_mut(&device.protocol.to_string()) {
                *count += 1;
            }
            *stats.status.entry(device.status.to_string()).or_insert(0) += 1;
        }

        stats
    }
}

/// Devices whose vendor name matches, ignoring case.
pub fn devices_by_vendor<'a>(
    devices: &'a HashMap<IpAddr, DeviceRecord>,
    vendor: &str,
) -> Vec<&'a DeviceRecord> {
    devices
        .values()
        .filter(|d| d.vendor.map(|v| v.to_string().eq_ignore_ascii_case(vendor)).unwrap_or(false))
        .collect()
}

/// Devices whose device type tag matches, ignoring case.
pub fn devices_by_type<'a>(
    devices: &'a HashMap<IpAddr, DeviceRecord>,
    device_type: &str,
) -> Vec<&'a DeviceRecord> {
    devices
        .values()
        .filter(|d| d.device_type.tag().eq_ignore_ascii_case(device_type))
        .collect()
}

/// Outcome of a single echo probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingOutcome {
    Success,
    Timeout,
    Unreachable,
    Error,
}

impl fmt::Display for PingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingOutcome::Success => write!(f, "success"),
            PingOutcome::Timeout => write!(f, "timeout"),
            PingOutcome::Unreachable => write!(f, "unreachable"),
            PingOutcome::Error => write!(f, "error"),
        }
    }
}

/// Per-host latency scan result; owned by the one task probing that host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ip: IpAddr,
    pub is_alive: bool,
    pub avg_latency: Option<f64>,
    pub latencies: Vec<f64>,
    pub error_count: u32,
    pub success_count: u32,
    pub last_error: Option<String>,
}

impl ScanResult {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            is_alive: false,
            avg_latency: None,
            latencies: Vec::new(),
            error_count: 0,
            success_count: 0,
            last_error: None,
        }
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.error_count += 1;
        self.last_error = Some(error.into());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_hosts: usize,
    pub alive_hosts: usize,
    pub dead_hosts: usize,
    pub scan_duration: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanSummary {
    pub fn alive_percent(&self) -> f64 {
        if self.total_hosts == 0 {
            return 0.0;
        }
        self.alive_hosts as f64 / self.total_hosts as f64 * 100.0
    }

    pub fn dead_percent(&self) -> f64 {
        if self.total_hosts == 0 {
            return 0.0;
        }
        self.dead_hosts as f64 / self.total_hosts as f64 * 100.0
    }
}

/// Everything a latency scan produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReport {
    pub summary: ScanSummary,
    pub results: BTreeMap<IpAddr, ScanResult>,
}

impl PingReport {
    pub fn alive_hosts(&self) -> Vec<IpAddr> {
        self.results.values().filter(|r| r.is_alive).map(|r| r.ip).collect()
    }

    pub fn dead_hosts(&self) -> Vec<IpAddr> {
        self.results.values().filter(|r| !r.is_alive).map(|r| r.ip).collect()
    }

    /// Mean of the per-host averages, over hosts that have one.
    pub fn mean_latency(&self) -> Option<f64> {
        let latencies: Vec<f64> = self.results.values().filter_map(|r| r.avg_latency).collect();
        if latencies.is_empty() {
            None
        } else {
            Some(round2(latencies.iter().sum::<f64>() / latencies.len() as f64))
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    fn surface(open: &[(Service, u16)]) -> ProtocolSurfaceResult {
        let mut per_protocol = BTreeMap::new();
        let mut matched_ports = BTreeMap::new();
        let mut open_ports = BTreeSet::new();
        for (service, port) in open {
            per_protocol.insert(*service, true);
            matched_ports.insert(*service, *port);
            open_ports.insert(*port);
        }
        ProtocolSurfaceResult {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            open_ports,
            per_protocol,
            matched_ports,
        }
    }

    #[test]
    fn test_surface_derived_flags() {
        let s = surface(&[(Service::Telnet, 23), (Service::Https, 443)]);
        assert!(s.has_management());
        assert!(s.has_web());
        assert_eq!(s.capabilities(), vec![Service::Telnet, Service::Https]);

        let s = surface(&[(Service::Snmp, 161)]);
        assert!(!s.has_management());
        assert!(!s.has_web());
    }

    #[test]
    fn test_summary_percentages() {
        let empty = ScanSummary::default();
        assert_eq!(empty.alive_percent(), 0.0);
        assert_eq!(empty.dead_percent(), 0.0);

        let half =
            ScanSummary { total_hosts: 2, alive_hosts: 1, dead_hosts: 1, ..Default::default() };
        assert_eq!(half.alive_percent(), 50.0);
        assert_eq!(half.dead_percent(), 50.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(20.0), 20.0);
        assert_eq!(round2(12.3456), 12.35);
    }

    #[test]
    fn test_login_masking() {
        let login = LoginUsed::from(&Credential::new("admin", "secret").with_enable("en"));
        let masked = login.masked();
        assert_eq!(masked.username, "admin");
        assert_eq!(masked.password, "********");
        assert_eq!(masked.enable_password.as_deref(), Some("********"));
        assert!(!format!("{:?}", login).contains("secret"));
    }
}
