use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tracing::debug;

use crate::scanner::results::{ProtocolSurfaceResult, Service};
use crate::scanner::tcp::probe_port;

/// Ordered candidate ports per protocol. Port order decides which port is
/// recorded when more than one is open.
pub const DEFAULT_CATALOG: &[(Service, &[u16])] = &[
    (Service::Ssh, &[22, 2222, 22222]),
    (Service::Telnet, &[23, 2323]),
    (Service::Http, &[80, 8080]),
    (Service::Https, &[443, 8443]),
    (Service::Snmp, &[161]),
    (Service::Netconf, &[830]),
    (Service::Ftp, &[21]),
    (Service::Tftp, &[69]),
    (Service::Syslog, &[514]),
    (Service::Radius, &[1812, 1813]),
    (Service::Tacacs, &[49]),
    (Service::Dns, &[53]),
    (Service::Ntp, &[123]),
    (Service::Ldap, &[389, 636]),
    (Service::Kerberos, &[88]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolCatalog {
    entries: Vec<(Service, Vec<u16>)>,
}

impl Default for ProtocolCatalog {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CATALOG.iter().map(|(s, ports)| (*s, ports.to_vec())).collect(),
        }
    }
}

impl ProtocolCatalog {
    pub fn new(entries: Vec<(Service, Vec<u16>)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(Service, Vec<u16>)] {
        &self.entries
    }

    /// Every distinct candidate port, in first-seen order.
    pub fn unique_ports(&self) -> Vec<u16> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .flat_map(|(_, ports)| ports.iter().copied())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Build a surface result from the set of ports found open.
    pub fn resolve(&self, host: IpAddr, open_ports: BTreeSet<u16>) -> ProtocolSurfaceResult {
        let mut per_protocol = BTreeMap::new();
        let mut matched_ports = BTreeMap::new();

        for (service, ports) in &self.entries {
            let first_open = ports.iter().copied().find(|p| open_ports.contains(p));
            per_protocol.insert(*service, first_open.is_some());
            if let Some(port) = first_open {
                matched_ports.insert(*service, port);
            }
        }

        ProtocolSurfaceResult { host, open_ports, per_protocol, matched_ports }
    }
}

/// Anything able to report the protocol surface of a host.
#[async_trait]
pub trait SurfaceProbe: Send + Sync {
    async fn scan(&self, host: IpAddr) -> ProtocolSurfaceResult;
}

/// Connect-probes every catalog port of a host, with its own cap on
/// simultaneous checks.
pub struct SurfaceScanner {
    catalog: ProtocolCatalog,
    port_workers: usize,
    port_timeout: Duration,
}

impl SurfaceScanner {
    pub fn new(catalog: ProtocolCatalog, port_workers: usize, port_timeout: Duration) -> Self {
        Self {
            catalog,
            port_workers: port_workers.max(1),
            port_timeout,
        }
    }

    pub fn catalog(&self) -> &ProtocolCatalog {
        &self.catalog
    }
}

#[async_trait]
impl SurfaceProbe for SurfaceScanner {
    async fn scan(&self, host: IpAddr) -> ProtocolSurfaceResult {
        let semaphore = Arc::new(Semaphore::new(self.port_workers));
        let port_timeout = self.port_timeout;

        let checks = self.catalog.unique_ports().into_iter().map(|port| {
            let semaphore = semaphore.clone();
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (port, false);
                };
                (port, probe_port(host, port, port_timeout).await)
            }
        });

        let open_ports: BTreeSet<u16> = join_all(checks)
            .await
            .into_iter()
            .filter_map(|(port, open)| open.then_some(port))
            .collect();

        let result = self.catalog.resolve(host, open_ports);
        debug!(
            %host,
            open = ?result.open_ports,
            management = result.has_management(),
            "Protocol surface scanned"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn test_default_catalog_order() {
        let catalog = ProtocolCatalog::default();
        assert_eq!(catalog.entries()[0], (Service::Ssh, vec![22, 2222, 22222]));
        assert_eq!(catalog.entries()[1], (Service::Telnet, vec![23, 2323]));
        assert_eq!(catalog.unique_ports().len(), 22);
    }

    #[test]
    fn test_resolve_picks_first_port_in_catalog_order() {
        let catalog = ProtocolCatalog::default();
        let result = catalog.resolve(localhost(), [22222, 2222, 8080].into_iter().collect());

        assert!(result.is_open(Service::Ssh));
        assert_eq!(result.port_for(Service::Ssh), Some(2222));
        assert!(result.is_open(Service::Http));
        assert_eq!(result.port_for(Service::Http), Some(8080));
        assert!(!result.is_open(Service::Telnet));
        assert_eq!(result.port_for(Service::Telnet), None);
        assert!(result.has_management());
        assert!(result.has_web());
    }

    #[test]
    fn test_resolve_without_management() {
        let catalog = ProtocolCatalog::default();
        let result = catalog.resolve(localhost(), [161].into_iter().collect());
        assert!(!result.has_management());
        assert_eq!(result.capabilities(), vec![Service::Snmp]);
    }

    #[tokio::test]
    async fn test_scan_custom_catalog() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let catalog = ProtocolCatalog::new(vec![
            (Service::Ssh, vec![closed, open]),
            (Service::Telnet, vec![closed]),
        ]);
        let scanner = SurfaceScanner::new(catalog, 4, Duration::from_millis(500));
        let result = scanner.scan(localhost()).await;

        assert_eq!(result.open_ports, [open].into_iter().collect());
        assert_eq!(result.port_for(Service::Ssh), Some(open));
        assert!(!result.is_open(Service::Telnet));
    }
}
