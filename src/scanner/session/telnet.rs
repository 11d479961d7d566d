use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::debug;

use super::TransportSession;
use crate::credentials::Credential;
use crate::error::SessionError;
use crate::scanner::results::TransportKind;

const LOGIN_PROMPTS: &[&[u8]] = &[b"Username:", b"login:", b"User:"];
const PASSWORD_PROMPTS: &[&[u8]] = &[b"Password:", b"password:"];
const PROMPT_MARKERS: &[u8] = b"#>$%";

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Decides whether the bytes read after sending a password look like a shell.
///
/// Best effort only. A password echoed back that contains a marker
/// character reads as a successful login; the identification command that
/// follows is the real confirmation.
pub trait LoginHeuristic: Send + Sync {
    fn looks_logged_in(&self, buffer: &[u8]) -> bool;
}

/// Logged in if any of `# > $ %` shows up.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptMarkerHeuristic;

impl LoginHeuristic for PromptMarkerHeuristic {
    fn looks_logged_in(&self, buffer: &[u8]) -> bool {
        buffer.iter().any(|b| PROMPT_MARKERS.contains(b))
    }
}

/// Waits used while driving the login dialogue.
#[derive(Debug, Clone)]
pub struct TelnetTimings {
    /// How long to wait for a login or password prompt
    pub prompt_wait: Duration,
    /// Pause after writing blindly when no prompt was recognized
    pub settle: Duration,
    /// Read window after the password is sent
    pub post_login: Duration,
    /// Read window after a command is written
    pub read_window: Duration,
}

impl Default for TelnetTimings {
    fn default() -> Self {
        Self {
            prompt_wait: Duration::from_secs(5),
            settle: Duration::from_millis(500),
            post_login: Duration::from_secs(1),
            read_window: Duration::from_millis(500),
        }
    }
}

/// Strips telnet option negotiation out of the byte stream and refuses every
/// option the peer offers or requests.
#[derive(Debug, Default)]
pub struct Negotiator {
    pending: Vec<u8>,
}

impl Negotiator {
    /// Returns `(data, replies)` for one chunk read off the socket.
    pub fn feed(&mut self, chunk: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();
        let mut i = 0;

        while i < input.len() {
            if input[i] != IAC {
                data.push(input[i]);
                i += 1;
                continue;
            }

            let Some(&command) = input.get(i + 1) else {
                break;
            };

            match command {
                IAC => {
                    data.push(IAC);
                    i += 2;
                }
                DO | DONT | WILL | WONT => {
                    let Some(&option) = input.get(i + 2) else {
                        break;
                    };
                    match command {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    i += 3;
                }
                SB => {
                    let end = input[i + 2..]
                        .windows(2)
                        .position(|w| w == [IAC, SE])
                        .map(|p| i + 2 + p + 2);
                    match end {
                        Some(end) => i = end,
                        None => break,
                    }
                }
                _ => i += 2,
            }
        }

        self.pending = input[i..].to_vec();
        (data, replies)
    }
}

/// Raw telnet session that logs in by watching for prompts.
pub struct TelnetSession {
    stream: Option<TcpStream>,
    negotiator: Negotiator,
    inbox: Vec<u8>,
    closed_by_peer: bool,
    timings: TelnetTimings,
    heuristic: Arc<dyn LoginHeuristic>,
}

impl TelnetSession {
    pub fn new(timings: TelnetTimings, heuristic: Arc<dyn LoginHeuristic>) -> Self {
        Self {
            stream: None,
            negotiator: Negotiator::default(),
            inbox: Vec::new(),
            closed_by_peer: false,
            timings,
            heuristic,
        }
    }

    async fn write_line(&mut self, text: &str) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NotConnected)?;
        let mut line = text.as_bytes().to_vec();
        line.push(b'\n');
        stream.write_all(&line).await?;
        Ok(())
    }

    /// Read one chunk into the inbox. `Ok(false)` once the deadline passes or
    /// the peer closed the connection.
    async fn fill(&mut self, deadline: Instant) -> Result<bool, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NotConnected)?;
        let now = Instant::now();
        if now >= deadline || self.closed_by_peer {
            return Ok(false);
        }

        let mut buf = [0u8; 4096];
        match timeout(deadline.saturating_duration_since(now), stream.read(&mut buf)).await {
            Err(_) => Ok(false),
            Ok(Ok(0)) => {
                self.closed_by_peer = true;
                Ok(false)
            }
            Ok(Ok(n)) => {
                let (data, replies) = self.negotiator.feed(&buf[..n]);
                if !replies.is_empty() {
                    stream.write_all(&replies).await?;
                }
                self.inbox.extend_from_slice(&data);
                Ok(true)
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Read until one of `patterns` shows up or `wait` runs out.
    async fn read_until(
        &mut self,
        patterns: &[&[u8]],
        wait: Duration,
    ) -> Result<bool, SessionError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(end) = find_any(&self.inbox, patterns) {
                self.inbox.drain(..end);
                return Ok(true);
            }
            if !self.fill(deadline).await? {
                return Ok(false);
            }
        }
    }

    /// Everything that arrives within `window`.
    async fn read_for(&mut self, window: Duration) -> Result<Vec<u8>, SessionError> {
        let deadline = Instant::now() + window;
        while self.fill(deadline).await? {}
        Ok(std::mem::take(&mut self.inbox))
    }
}

fn find_any(haystack: &[u8], patterns: &[&[u8]]) -> Option<usize> {
    patterns
        .iter()
        .filter_map(|p| {
            haystack
                .windows(p.len())
                .position(|w| w == *p)
                .map(|pos| pos + p.len())
        })
        .min()
}

/// Drop the echoed command, blank lines and a trailing prompt line.
fn clean_output(raw: &str, command: &str) -> String {
    let mut lines: Vec<&str> = raw
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty() && !l.contains(command))
        .collect();

    if let Some(last) = lines.last() {
        let last = last.trim();
        let prompt_like = last.ends_with(|c: char| matches!(c, '#' | '>' | '$' | '%'));
        if last.len() <= 64 && !last.contains(' ') && prompt_like {
            lines.pop();
        }
    }

    lines.join("\n")
}

#[async_trait]
impl TransportSession for TelnetSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }

    async fn connect(
        &mut self,
        host: IpAddr,
        port: u16,
        credential: &Credential,
    ) -> Result<(), SessionError> {
        debug!(%host, port, username = %credential.username, "Opening telnet session");

        let addr = SocketAddr::new(host, port);
        let stream = match timeout(credential.telnet_timeout(), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(SessionError::Timeout),
        };
        self.stream = Some(stream);
        self.inbox.clear();
        self.closed_by_peer = false;
        self.negotiator = Negotiator::default();

        let prompt_wait = self.timings.prompt_wait;
        let settle = self.timings.settle;

        // Devices with unusual prompts still get the credential, just blind.
        let saw_login = self.read_until(LOGIN_PROMPTS, prompt_wait).await?;
        self.write_line(&credential.username).await?;
        if !saw_login {
            sleep(settle).await;
        }

        let saw_password = self.read_until(PASSWORD_PROMPTS, prompt_wait).await?;
        self.write_line(&credential.password).await?;
        if !saw_password {
            sleep(settle).await;
        }

        let banner = self.read_for(self.timings.post_login).await?;
        if self.heuristic.looks_logged_in(&banner) {
            debug!(%host, port, "telnet login looks successful");
            Ok(())
        } else {
            self.disconnect().await;
            Err(SessionError::Auth)
        }
    }

    async fn execute(&mut self, command: &str, limit: Duration) -> Result<String, SessionError> {
        if self.stream.is_none() {
            return Err(SessionError::NotConnected);
        }
        self.write_line(command).await?;

        let deadline = Instant::now() + limit;
        let mut output = self.read_for(self.timings.read_window).await?;
        while !self.heuristic.looks_logged_in(&output)
            && Instant::now() < deadline
            && !self.closed_by_peer
        {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let window = self.timings.read_window.min(remaining);
            output.extend(self.read_for(window).await?);
        }

        if output.is_empty() && self.closed_by_peer {
            return Err(SessionError::Network("connection closed by peer".to_string()));
        }

        Ok(clean_output(&String::from_utf8_lossy(&output), command))
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if !self.closed_by_peer {
                let _ = stream.write_all(b"exit\n").await;
            }
            let _ = stream.shutdown().await;
        }
        self.inbox.clear();
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[test]
    fn test_prompt_marker_heuristic() {
        let h = PromptMarkerHeuristic;
        assert!(h.looks_logged_in(b"\r\nswitch#"));
        assert!(h.looks_logged_in(b"router>"));
        assert!(h.looks_logged_in(b"user@host:~$ "));
        assert!(!h.looks_logged_in(b"Login incorrect\r\nUsername: "));
    }

    #[test]
    fn test_negotiator_refuses_options() {
        let mut n = Negotiator::default();
        let (data, replies) = n.feed(&[IAC, DO, 24, b'h', b'i', IAC, WILL, 1]);
        assert_eq!(data, b"hi");
        assert_eq!(replies, vec![IAC, WONT, 24, IAC, DONT, 1]);
    }

    #[test]
    fn test_negotiator_split_sequence_and_escape() {
        let mut n = Negotiator::default();
        let (data, replies) = n.feed(&[b'a', IAC]);
        assert_eq!(data, b"a");
        assert!(replies.is_empty());

        let (data, replies) = n.feed(&[DO, 3, IAC, IAC, b'b']);
        assert_eq!(data, vec![IAC, b'b']);
        assert_eq!(replies, vec![IAC, WONT, 3]);
    }

    #[test]
    fn test_negotiator_skips_subnegotiation() {
        let mut n = Negotiator::default();
        let (data, _) = n.feed(&[b'x', IAC, SB, 24, 1, IAC, SE, b'y']);
        assert_eq!(data, b"xy");
    }

    #[test]
    fn test_find_any_returns_end_of_earliest_match() {
        assert_eq!(find_any(b"Welcome\r\nUsername: ", LOGIN_PROMPTS), Some(18));
        assert_eq!(find_any(b"nothing", LOGIN_PROMPTS), None);
    }

    #[test]
    fn test_clean_output() {
        let raw = "show version\r\nCisco IOS Software\r\n\r\nuptime is 1 day\r\nswitch#";
        assert_eq!(clean_output(raw, "show version"), "Cisco IOS Software\nuptime is 1 day");
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let mut session =
            TelnetSession::new(TelnetTimings::default(), Arc::new(PromptMarkerHeuristic));
        assert_eq!(
            session.execute("show version", Duration::from_secs(1)).await,
            Err(SessionError::NotConnected)
        );
    }

    fn quick_timings() -> TelnetTimings {
        TelnetTimings {
            prompt_wait: Duration::from_millis(200),
            settle: Duration::from_millis(20),
            post_login: Duration::from_millis(300),
            read_window: Duration::from_millis(100),
        }
    }

    /// A device that never prints a recognizable prompt. It reads two lines,
    /// reports them, then answers with `reply`.
    async fn spawn_promptless_device(
        reply: &'static str,
    ) -> (u16, tokio::sync::oneshot::Receiver<Vec<String>>) {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            writer.write_all(b"Welcome to the lab network\r\n").await.unwrap();

            let mut lines = BufReader::new(reader).lines();
            let mut received = Vec::new();
            while received.len() < 2 {
                match lines.next_line().await {
                    Ok(Some(line)) => received.push(line.trim_end_matches('\r').to_string()),
                    _ => break,
                }
            }
            let _ = tx.send(received);
            writer.write_all(reply.as_bytes()).await.unwrap();
            while let Ok(Some(_)) = lines.next_line().await {}
        });
        (port, rx)
    }

    #[tokio::test]
    async fn test_blind_credentials_sent_without_prompts() {
        let (port, received) = spawn_promptless_device("\r\nrouter#").await;
        let mut session = TelnetSession::new(quick_timings(), Arc::new(PromptMarkerHeuristic));
        let cred = Credential::new("netops", "s3cret");

        let result = session.connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, &cred).await;
        assert_eq!(result, Ok(()));
        assert!(session.is_connected());
        assert_eq!(received.await.unwrap(), vec!["netops", "s3cret"]);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_login_rejected_without_prompt_marker() {
        let (port, received) = spawn_promptless_device("Access denied\r\n").await;
        let mut session = TelnetSession::new(quick_timings(), Arc::new(PromptMarkerHeuristic));
        let cred = Credential::new("netops", "wrong");

        let result = session.connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, &cred).await;
        assert_eq!(result, Err(SessionError::Auth));
        assert!(!session.is_connected());
        assert_eq!(received.await.unwrap(), vec!["netops", "wrong"]);
    }

    struct NeverLoggedIn;

    impl LoginHeuristic for NeverLoggedIn {
        fn looks_logged_in(&self, _banner: &[u8]) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_heuristic_decides_login_outcome() {
        let (port, _received) = spawn_promptless_device("\r\nrouter#").await;
        let mut session = TelnetSession::new(quick_timings(), Arc::new(NeverLoggedIn));
        let cred = Credential::new("netops", "s3cret");

        let result = session.connect(IpAddr::V4(Ipv4Addr::LOCALHOST), port, &cred).await;
        assert_eq!(result, Err(SessionError::Auth));
    }
}
