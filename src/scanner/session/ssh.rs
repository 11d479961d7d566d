use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::TransportSession;
use crate::credentials::Credential;
use crate::error::SessionError;
use crate::scanner::results::TransportKind;

/// Accepts whatever host key the server presents.
///
/// Discovery talks to devices it has never seen, so there is nothing to pin
/// against. This is trust on first use without the remembering part.
pub struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn map_russh_error(err: russh::Error) -> SessionError {
    match err {
        russh::Error::IO(io) => SessionError::from(io),
        russh::Error::ConnectionTimeout => SessionError::Timeout,
        other => SessionError::Network(other.to_string()),
    }
}

/// Password-authenticated SSH session that runs one exec channel per command.
#[derive(Default)]
pub struct SshSession {
    handle: Option<client::Handle<AcceptAnyHostKey>>,
    peer: Option<(IpAddr, u16)>,
}

impl SshSession {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(
        handle: &client::Handle<AcceptAnyHostKey>,
        command: &str,
    ) -> Result<String, SessionError> {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let mut output = ExecOutput::default();
        while let Some(msg) = channel.wait().await {
            if output.absorb(msg, command) {
                break;
            }
        }

        Ok(output.into_text())
    }
}

/// Stdout of one exec channel. Stderr is logged and dropped so that a shell's
/// "command not found" never reads as identification output.
#[derive(Default)]
struct ExecOutput {
    stdout: Vec<u8>,
}

impl ExecOutput {
    /// Returns true once the channel is done.
    fn absorb(&mut self, msg: ChannelMsg, command: &str) -> bool {
        match msg {
            ChannelMsg::Data { ref data } => self.stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } => {
                let stderr = String::from_utf8_lossy(data);
                debug!(command, ext, stderr = %stderr.trim(), "ssh stderr");
            }
            ChannelMsg::ExitStatus { exit_status } => {
                debug!(command, exit_status, "ssh command finished");
            }
            ChannelMsg::Eof | ChannelMsg::Close => return true,
            _ => {}
        }
        false
    }

    fn into_text(self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[async_trait]
impl TransportSession for SshSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    async fn connect(
        &mut self,
        host: IpAddr,
        port: u16,
        credential: &Credential,
    ) -> Result<(), SessionError> {
        debug!(%host, port, username = %credential.username, "Opening SSH session");

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(credential.ssh_timeout() * 3),
            ..Default::default()
        });

        let handshake = async {
            let mut handle = client::connect(config, (host, port), AcceptAnyHostKey)
                .await
                .map_err(map_russh_error)?;
            let accepted = handle
                .authenticate_password(credential.username.clone(), credential.password.clone())
                .await
                .map_err(map_russh_error)?;
            if accepted {
                Ok(handle)
            } else {
                Err(SessionError::Auth)
            }
        };

        match timeout(credential.ssh_timeout(), handshake).await {
            Ok(Ok(handle)) => {
                self.handle = Some(handle);
                self.peer = Some((host, port));
                Ok(())
            }
            Ok(Err(e)) => {
                debug!(%host, port, "SSH login failed: {}", e);
                Err(e)
            }
            Err(_) => {
                debug!(%host, port, "SSH handshake timed out");
                Err(SessionError::Timeout)
            }
        }
    }

    async fn execute(&mut self, command: &str, limit: Duration) -> Result<String, SessionError> {
        let handle = self.handle.as_ref().ok_or(SessionError::NotConnected)?;
        match timeout(limit, Self::run(handle, command)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "English").await {
                debug!(peer = ?self.peer, "SSH disconnect: {}", e);
            }
        }
        self.peer = None;
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::CryptoVec;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    fn feed(messages: Vec<ChannelMsg>) -> String {
        let mut output = ExecOutput::default();
        for msg in messages {
            if output.absorb(msg, "show version") {
                break;
            }
        }
        output.into_text()
    }

    #[test]
    fn test_stderr_is_not_collected() {
        let text = feed(vec![
            ChannelMsg::ExtendedData {
                data: CryptoVec::from_slice(b"bash: show: command not found\n"),
                ext: 1,
            },
            ChannelMsg::ExitStatus { exit_status: 127 },
            ChannelMsg::Eof,
        ]);
        assert_eq!(text, "");
    }

    #[test]
    fn test_stdout_collected_until_eof() {
        let text = feed(vec![
            ChannelMsg::Data { data: CryptoVec::from_slice(b"Cisco IOS Software, ") },
            ChannelMsg::ExtendedData { data: CryptoVec::from_slice(b"warning\n"), ext: 1 },
            ChannelMsg::Data { data: CryptoVec::from_slice(b"Version 15.0(2)SE\n") },
            ChannelMsg::Eof,
            ChannelMsg::Data { data: CryptoVec::from_slice(b"late") },
        ]);
        assert_eq!(text, "Cisco IOS Software, Version 15.0(2)SE\n");
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let mut session = SshSession::new();
        assert!(!session.is_connected());
        let result = session.execute("show version", Duration::from_secs(1)).await;
        assert_eq!(result, Err(SessionError::NotConnected));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_failure() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut session = SshSession::new();
        let cred = Credential::new("admin", "admin");
        let err = session
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, &cred)
            .await
            .unwrap_err();
        assert!(err.is_transport_failure());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts TCP but never speaks SSH.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut session = SshSession::new();
        let mut cred = Credential::new("admin", "admin");
        cred.ssh_timeout = 1;
        let err = session
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, &cred)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Timeout);
    }
}
