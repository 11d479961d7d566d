use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_ssh_port() -> u16 {
    22
}

fn default_telnet_port() -> u16 {
    23
}

fn default_timeout() -> u64 {
    10
}

/// One username/password combination tried against a target.
///
/// Lists of credentials are tried in the order given, so the position of a
/// credential in its list is meaningful.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub enable_password: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_telnet_port")]
    pub telnet_port: u16,
    /// Seconds allowed for the SSH connect + authentication handshake
    #[serde(default = "default_timeout")]
    pub ssh_timeout: u64,
    /// Seconds allowed for the telnet connect
    #[serde(default = "default_timeout")]
    pub telnet_timeout: u64,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            enable_password: None,
            ssh_port: default_ssh_port(),
            telnet_port: default_telnet_port(),
            ssh_timeout: default_timeout(),
            telnet_timeout: default_timeout(),
        }
    }

    pub fn with_enable(mut self, secret: impl Into<String>) -> Self {
        self.enable_password = Some(secret.into());
        self
    }

    /// Same login timeout for SSH and telnet.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.ssh_timeout = secs;
        self.telnet_timeout = secs;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if self.ssh_port == 0 {
            return Err(ConfigError::InvalidPort { protocol: "ssh", port: self.ssh_port });
        }
        if self.telnet_port == 0 {
            return Err(ConfigError::InvalidPort { protocol: "telnet", port: self.telnet_port });
        }
        Ok(())
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout)
    }

    pub fn telnet_timeout(&self) -> Duration {
        Duration::from_secs(self.telnet_timeout)
    }

    /// Parse `user:pass` or `user:pass:enable`.
    pub fn parse_inline(spec: &str) -> Result<Self, ConfigError> {
        let mut parts = spec.splitn(3, ':');
        let username = parts.next().unwrap_or_default();
        let password = parts.next().ok_or_else(|| {
            ConfigError::InvalidCredential(format!("missing password in '{}'", username))
        })?;

        let mut credential = Credential::new(username, password);
        if let Some(enable) = parts.next() {
            credential = credential.with_enable(enable);
        }
        credential.validate()?;
        Ok(credential)
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("enable_password", &self.enable_password.as_ref().map(|_| "<redacted>"))
            .field("ssh_port", &self.ssh_port)
            .field("telnet_port", &self.telnet_port)
            .finish()
    }
}

/// Reject an empty list or any invalid entry.
pub fn validate_credentials(credentials: &[Credential]) -> Result<(), ConfigError> {
    if credentials.is_empty() {
        return Err(ConfigError::EmptyCredentials);
    }
    credentials.iter().try_for_each(Credential::validate)
}

/// Load a JSON array of credentials, preserving file order.
pub fn load_credentials_file(path: &Path) -> Result<Vec<Credential>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    let credentials: Vec<Credential> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid credentials file {}", path.display()))?;
    validate_credentials(&credentials)?;
    Ok(credentials)
}
