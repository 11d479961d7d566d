use thiserror::Error;

/// Errors that reject a batch before any network activity starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Target list is empty")]
    EmptyTargets,

    #[error("Credential list is empty")]
    EmptyCredentials,

    #[error("Credential username must not be empty")]
    EmptyUsername,

    #[error("Invalid {protocol} port: {port} (expected 1-65535)")]
    InvalidPort { protocol: &'static str, port: u16 },

    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),

    #[error("{0} must be a finite, non-negative number of seconds")]
    InvalidDuration(&'static str),

    #[error("Invalid target specification: {0}")]
    InvalidTarget(String),

    #[error("Invalid credential specification: {0}")]
    InvalidCredential(String),
}

/// Failure of a single transport session operation.
///
/// `Auth` only condemns the credential that was tried. `Timeout` and
/// `Network` mean the transport itself is unusable for this host right now.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("authentication rejected")]
    Auth,

    #[error("operation timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("session is not connected")]
    NotConnected,
}

impl SessionError {
    /// Whether the host should be considered unreachable over this transport.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, SessionError::Timeout | SessionError::Network(_))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => SessionError::Timeout,
            _ => SessionError::Network(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_classification() {
        assert!(SessionError::Timeout.is_transport_failure());
        assert!(SessionError::Network("reset".into()).is_transport_failure());
        assert!(!SessionError::Auth.is_transport_failure());
        assert!(!SessionError::Protocol("bad banner".into()).is_transport_failure());
    }

    #[test]
    fn test_io_error_mapping() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(SessionError::from(timed_out), SessionError::Timeout);

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(SessionError::from(refused), SessionError::Network(_)));
    }
}
