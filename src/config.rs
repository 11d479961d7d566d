use std::time::Duration;

use crate::cli::ProtocolFilter;
use crate::error::ConfigError;

/// Settings consumed by the discovery pipeline.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Simultaneous host probes
    pub max_workers: usize,

    /// Simultaneous port checks inside one host's protocol surface scan
    pub port_workers: usize,

    /// Timeout for each TCP reachability check
    pub port_timeout: Duration,

    /// Timeout for each identification command
    pub command_timeout: Duration,

    /// Timeout for the best-effort `hostname` command
    pub hostname_timeout: Duration,

    /// Which transports may be used to log in
    pub protocol_filter: ProtocolFilter,

    /// Draw a progress bar while the batch runs
    pub show_progress: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            port_workers: 50,
            port_timeout: Duration::from_secs(3),
            command_timeout: Duration::from_secs(5),
            hostname_timeout: Duration::from_secs(3),
            protocol_filter: ProtocolFilter::Both,
            show_progress: true,
        }
    }
}

impl DiscoveryConfig {
    /// Use `secs` for every TCP reachability check.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.port_timeout = Duration::from_secs(secs);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroLimit("max_workers"));
        }
        if self.port_workers == 0 {
            return Err(ConfigError::ZeroLimit("port_workers"));
        }
        Ok(())
    }
}

/// Settings consumed by the latency scanner.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Seconds each echo attempt may run before the probe process is killed
    pub timeout: f64,

    /// Echo requests per probe invocation
    pub ping_count: u32,

    /// Wall-clock length of the sampling phase, in seconds
    pub ping_duration: f64,

    /// Pause between samples, in seconds
    pub ping_interval: f64,

    pub concurrent_limit: usize,

    pub max_retries: u32,

    pub show_progress: bool,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout: 2.0,
            ping_count: 1,
            ping_duration: 60.0,
            ping_interval: 1.0,
            concurrent_limit: 100,
            max_retries: 3,
            show_progress: true,
        }
    }
}

impl PingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_limit == 0 {
            return Err(ConfigError::ZeroLimit("concurrent_limit"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroLimit("max_retries"));
        }
        if self.ping_count == 0 {
            return Err(ConfigError::ZeroLimit("ping_count"));
        }
        check_seconds("timeout", self.timeout)?;
        check_seconds("ping_duration", self.ping_duration)?;
        check_seconds("ping_interval", self.ping_interval)?;
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.ping_duration)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.ping_interval)
    }
}

/// Finite, non-negative and small enough to become a `Duration`.
fn check_seconds(name: &'static str, value: f64) -> Result<(), ConfigError> {
    Duration::try_from_secs_f64(value)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidDuration(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DiscoveryConfig::default().validate().is_ok());
        assert!(PingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = DiscoveryConfig { max_workers: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLimit("max_workers")));
    }

    #[test]
    fn test_ping_limits_rejected() {
        let config = PingConfig { max_retries: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLimit("max_retries")));

        let config = PingConfig { timeout: -1.0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::InvalidDuration("timeout")));

        let config = PingConfig { ping_interval: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let config = PingConfig { timeout: 1e20, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::InvalidDuration("timeout")));

        let config = PingConfig { ping_duration: f64::INFINITY, ..Default::default() };
        assert!(config.validate().is_err());

        let config = PingConfig { ping_interval: 86_400.0 * 365.0, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connect_timeout_override() {
        let config = DiscoveryConfig::default().with_connect_timeout(7);
        assert_eq!(config.port_timeout, Duration::from_secs(7));
        assert_eq!(config.command_timeout, DiscoveryConfig::default().command_timeout);
    }

    #[test]
    fn test_zero_timeout_allowed() {
        let config = PingConfig { timeout: 0.0, ..Default::default() };
        assert!(config.validate().is_ok());
        assert_eq!(config.attempt_timeout(), Duration::ZERO);
    }
}
