//! Authenticated interactive sessions to a device.
//!
//! Two transports share one contract: [`ssh::SshSession`] and
//! [`telnet::TelnetSession`]. The host prober only sees
//! [`TransportSession`] trait objects handed out by a [`SessionFactory`],
//! so both can be replaced by scripted sessions in tests.

pub mod pool;
pub mod ssh;
pub mod telnet;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Duration;

use crate::credentials::Credential;
use crate::error::SessionError;
use crate::scanner::results::TransportKind;

pub use pool::SessionPool;
pub use ssh::SshSession;
pub use telnet::{LoginHeuristic, PromptMarkerHeuristic, TelnetSession, TelnetTimings};

#[async_trait]
pub trait TransportSession: Send {
    fn kind(&self) -> TransportKind;

    /// Open the connection and authenticate.
    async fn connect(
        &mut self,
        host: IpAddr,
        port: u16,
        credential: &Credential,
    ) -> Result<(), SessionError>;

    /// Run one command and return its text output.
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String, SessionError>;

    /// Close the connection. Safe to call more than once.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Hands out fresh, unconnected sessions.
pub trait SessionFactory: Send + Sync {
    fn open(&self, kind: TransportKind) -> Option<Box<dyn TransportSession>>;
}

/// Builds the real SSH and telnet sessions.
#[derive(Clone)]
pub struct NetworkSessionFactory {
    telnet_timings: TelnetTimings,
    heuristic: Arc<dyn LoginHeuristic>,
}

impl Default for NetworkSessionFactory {
    fn default() -> Self {
        Self {
            telnet_timings: TelnetTimings::default(),
            heuristic: Arc::new(PromptMarkerHeuristic),
        }
    }
}

impl NetworkSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telnet_timings(mut self, timings: TelnetTimings) -> Self {
        self.telnet_timings = timings;
        self
    }

    pub fn with_login_heuristic(mut self, heuristic: Arc<dyn LoginHeuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }
}

impl SessionFactory for NetworkSessionFactory {
    fn open(&self, kind: TransportKind) -> Option<Box<dyn TransportSession>> {
        match kind {
            TransportKind::Ssh => Some(Box::new(SshSession::new())),
            TransportKind::Telnet => Some(Box::new(TelnetSession::new(
                self.telnet_timings.clone(),
                self.heuristic.clone(),
            ))),
            TransportKind::Unknown => None,
        }
    }
}
