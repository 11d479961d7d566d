use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::credentials::Credential;
use crate::error::SessionError;
use crate::scanner::classifier::{Classification, Classifier, CommandSet};
use crate::scanner::results::{
    DeviceRecord, DeviceStatus, LoginUsed, ProtocolSurfaceResult, Service, TransportKind,
};
use crate::scanner::session::{NetworkSessionFactory, SessionFactory, SessionPool, TransportSession};
use crate::scanner::surface::{ProtocolCatalog, SurfaceProbe, SurfaceScanner};

/// Commands tried in order until one prints something useful.
pub const IDENTIFICATION_COMMANDS: &[&str] = &[
    "show version",
    "show ver",
    "version",
    "display version",
    "cat /etc/os-release",
    "uname -a",
    "/system resource print",
    "get system status",
    "show system",
    "show inventory",
];

const HOSTNAME_COMMAND: &str = "hostname";
const MIN_OUTPUT_CHARS: usize = 10;

lazy_static::lazy_static! {
    static ref KEYED_HOSTNAME: Regex = Regex::new(concat!(
        r"(?i)^(?:hostname|host-name|sysname|system\s+name|name)",
        r"(?:\s*[:=]\s*|\s+)([A-Za-z0-9][A-Za-z0-9._-]*);?$",
    ))
    .unwrap();
}

/// Why a host produced no device record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeFailure {
    #[error("no management protocol (ssh/telnet) reachable")]
    NoManagementProtocol,

    #[error("no management protocol allowed by the protocol filter")]
    FilteredOut,

    #[error("no credential could log in and identify the device")]
    NoWorkingCredential,

    #[error("probe task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostOutcome {
    Identified(Box<DeviceRecord>),
    Failed(ProbeFailure),
}

/// One host in, one outcome out. Never a partial record.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe(&self, host: IpAddr, credentials: &[Credential]) -> HostOutcome;
}

/// Surface scan, then SSH, then telnet, each over the credential list in order.
pub struct HostProber {
    surface: Arc<dyn SurfaceProbe>,
    sessions: SessionPool,
    classifier: Arc<Classifier>,
    config: DiscoveryConfig,
}

impl HostProber {
    pub fn new(
        surface: Arc<dyn SurfaceProbe>,
        factory: Arc<dyn SessionFactory>,
        classifier: Arc<Classifier>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            surface,
            sessions: SessionPool::new(factory),
            classifier,
            config,
        }
    }

    /// Prober wired to real sockets.
    pub fn with_network(config: DiscoveryConfig) -> Self {
        let surface = SurfaceScanner::new(
            ProtocolCatalog::default(),
            config.port_workers,
            config.port_timeout,
        );
        Self::new(
            Arc::new(surface),
            Arc::new(NetworkSessionFactory::new()),
            Arc::new(Classifier::new()),
            config,
        )
    }

    async fn try_transport(
        &self,
        kind: TransportKind,
        host: IpAddr,
        surface: &ProtocolSurfaceResult,
        credentials: &[Credential],
    ) -> Option<DeviceRecord> {
        for (index, credential) in credentials.iter().enumerate() {
            let port = select_port(kind, credential, surface);
            let username = credential.username.as_str();

            debug!(%host, %kind, port, username, attempt = index + 1, "Trying credential");
            let session = match self.sessions.get_or_connect(kind, host, port, credential).await {
                Ok(session) => session,
                Err(e) if e.is_transport_failure() => {
                    debug!(%host, %kind, "Abandoning transport: {}", e);
                    return None;
                }
                Err(e) => {
                    debug!(%host, %kind, username, "Login failed: {}", e);
                    continue;
                }
            };

            let identified = {
                let mut session = session.lock().await;
                self.identify(&mut **session, host).await
            };
            self.sessions.release(host, port, username).await;

            if let Some((classification, hostname)) = identified {
                let record =
                    build_record(host, hostname, classification, kind, port, credential, surface);
                return Some(record);
            }
            debug!(%host, %kind, username, "Logged in but no identification output");
        }
        None
    }

    /// Run identification commands until one returns useful output, classify
    /// it, then ask for the hostname the way that device type expects.
    async fn identify(
        &self,
        session: &mut dyn TransportSession,
        host: IpAddr,
    ) -> Option<(Classification, String)> {
        let mut output = None;
        for command in IDENTIFICATION_COMMANDS {
            match session.execute(command, self.config.command_timeout).await {
                Ok(text) if is_meaningful(&text) => {
                    debug!(%host, command, "Identification command answered");
                    output = Some(text);
                    break;
                }
                Ok(_) => continue,
                Err(SessionError::Network(e)) => {
                    debug!(%host, "Session dropped during identification: {}", e);
                    break;
                }
                Err(SessionError::NotConnected) => break,
                Err(e) => debug!(%host, command, "Command failed: {}", e),
            }
        }

        let classification = self.classifier.classify(&output?);
        let commands = classification.device_type.commands();
        let hostname = fetch_hostname(session, commands, self.config.hostname_timeout)
            .await
            .unwrap_or_else(|| host.to_string());
        Some((classification, hostname))
    }
}

fn build_record(
    host: IpAddr,
    hostname: String,
    classification: Classification,
    kind: TransportKind,
    port: u16,
    credential: &Credential,
    surface: &ProtocolSurfaceResult,
) -> DeviceRecord {
    DeviceRecord {
        ip: host,
        hostname,
        device_type: classification.device_type,
        vendor: classification.vendor,
        model: classification.model,
        os_version: classification.os_version,
        serial_number: classification.serial_number,
        protocol: kind,
        port,
        login: LoginUsed::from(credential),
        capabilities: surface.capabilities(),
        status: DeviceStatus::Active,
        last_seen: Utc::now(),
    }
}

#[async_trait]
impl HostProbe for HostProber {
    async fn probe(&self, host: IpAddr, credentials: &[Credential]) -> HostOutcome {
        let surface = self.surface.scan(host).await;
        if !surface.has_management() {
            debug!(%host, "No management protocol open");
            return HostOutcome::Failed(ProbeFailure::NoManagementProtocol);
        }

        let filter = self.config.protocol_filter;
        let try_ssh = surface.is_open(Service::Ssh) && filter.allows_ssh();
        let try_telnet = surface.is_open(Service::Telnet) && filter.allows_telnet();
        if !try_ssh && !try_telnet {
            return HostOutcome::Failed(ProbeFailure::FilteredOut);
        }

        let transports = [(TransportKind::Ssh, try_ssh), (TransportKind::Telnet, try_telnet)];
        for (kind, allowed) in transports {
            if !allowed {
                continue;
            }
            if let Some(record) = self.try_transport(kind, host, &surface, credentials).await {
                info!(
                    %host,
                    hostname = %record.hostname,
                    device_type = %record.device_type,
                    "Device identified over {}",
                    kind
                );
                return HostOutcome::Identified(Box::new(record));
            }
        }

        HostOutcome::Failed(ProbeFailure::NoWorkingCredential)
    }
}

/// The credential's own port if it was found open, else the first open
/// catalog port for the protocol.
pub fn select_port(
    kind: TransportKind,
    credential: &Credential,
    surface: &ProtocolSurfaceResult,
) -> u16 {
    let (configured, service) = match kind {
        TransportKind::Telnet => (credential.telnet_port, Service::Telnet),
        _ => (credential.ssh_port, Service::Ssh),
    };
    if surface.open_ports.contains(&configured) {
        configured
    } else {
        surface.port_for(service).unwrap_or(configured)
    }
}

/// More than a handful of visible characters.
pub fn is_meaningful(output: &str) -> bool {
    output.chars().filter(|c| !c.is_whitespace()).count() > MIN_OUTPUT_CHARS
}

/// Hostname from command output: a `hostname X` / `sysname X` / `Name: X`
/// style line anywhere, else a bare first non-empty line.
pub fn parse_hostname(output: &str) -> Option<String> {
    let keyed = output
        .lines()
        .filter_map(|l| KEYED_HOSTNAME.captures(l.trim()))
        .find_map(|c| c.get(1).map(|m| m.as_str().to_string()));
    if keyed.is_some() {
        return keyed;
    }

    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.starts_with('%') || line.contains(char::is_whitespace) || line.contains([':', ';']) {
        return None;
    }
    Some(line.to_string())
}

/// Paging off, then the type's own hostname command, then plain `hostname`.
async fn fetch_hostname(
    session: &mut dyn TransportSession,
    commands: CommandSet,
    limit: Duration,
) -> Option<String> {
    if let Some(pager) = commands.disable_paging {
        if let Err(e) = session.execute(pager, limit).await {
            debug!(command = pager, "Could not disable paging: {}", e);
        }
    }

    let mut candidates = vec![commands.hostname];
    if commands.hostname != HOSTNAME_COMMAND {
        candidates.push(HOSTNAME_COMMAND);
    }

    for command in candidates {
        match session.execute(command, limit).await {
            Ok(output) => {
                if let Some(name) = parse_hostname(&output) {
                    return Some(name);
                }
            }
            Err(e @ (SessionError::Network(_) | SessionError::NotConnected)) => {
                debug!(command, "Hostname lookup stopped: {}", e);
                return None;
            }
            Err(e) => debug!(command, "Hostname command failed: {}", e),
        }
    }
    None
}
