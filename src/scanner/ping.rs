use std::collections::BTreeMap;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::PingConfig;
use crate::error::ConfigError;
use crate::scanner::progress::ProgressReporter;
use crate::scanner::results::{round2, PingOutcome, PingReport, ScanResult, ScanSummary};

lazy_static::lazy_static! {
    static ref LATENCY_PATTERNS: Vec<Regex> = [
        r"(?i)time[=<>](\d+\.?\d*)\s*ms",
        r"(?i)время[=<>](\d+\.?\d*)\s*мс",
        r"(?i)(\d+\.?\d*)\s*ms",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();
}

/// Round-trip time in milliseconds from echo output. The last match of the
/// first pattern that matches at all wins.
pub fn extract_latency(output: &str) -> Option<f64> {
    LATENCY_PATTERNS.iter().find_map(|re| {
        re.captures_iter(output)
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
            .last()
    })
}

/// Arithmetic mean rounded to two decimals.
pub fn average_latency(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(round2(samples.iter().sum::<f64>() / samples.len() as f64))
}

/// Argument vector for one echo probe, program name first.
pub fn build_ping_command(config: &PingConfig, ip: IpAddr, windows: bool) -> Vec<String> {
    if windows {
        vec![
            "ping".to_string(),
            "-n".to_string(),
            config.ping_count.to_string(),
            "-w".to_string(),
            ((config.timeout * 1000.0) as u64).to_string(),
            ip.to_string(),
        ]
    } else {
        vec![
            "ping".to_string(),
            "-c".to_string(),
            config.ping_count.to_string(),
            "-W".to_string(),
            (config.timeout as u64).max(1).to_string(),
            ip.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("timed out")]
    TimedOut,

    #[error("could not run command: {0}")]
    Spawn(String),
}

/// Runs an external command with a hard time limit.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], limit: Duration) -> Result<CommandOutput, RunError>;
}

/// Spawns real processes; a process still running at the limit is killed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, argv: &[String], limit: Duration) -> Result<CommandOutput, RunError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RunError::Spawn("empty command".to_string()))?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Spawn(e.to_string()))?;

        // Dropping the wait future drops the child, which kills it.
        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            }),
            Ok(Err(e)) => Err(RunError::Spawn(e.to_string())),
            Err(_) => Err(RunError::TimedOut),
        }
    }
}

/// Result of one retried echo probe.
#[derive(Debug, Clone, PartialEq)]
pub struct PingAttempt {
    pub outcome: PingOutcome,
    pub latency: Option<f64>,
    pub failed_attempts: u32,
    pub last_error: Option<String>,
}

/// Two-phase latency scanner: liveness first, then timed sampling of the
/// hosts that answered.
#[derive(Clone)]
pub struct LatencyScanner {
    runner: Arc<dyn CommandRunner>,
    config: PingConfig,
    semaphore: Arc<Semaphore>,
    stop: Arc<AtomicBool>,
}

impl LatencyScanner {
    pub fn new(config: PingConfig) -> Self {
        Self::with_runner(Arc::new(SystemCommandRunner), config)
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>, config: PingConfig) -> Self {
        let permits = config.concurrent_limit.max(1);
        Self {
            runner,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// One echo probe with retries, holding a concurrency permit throughout.
    pub async fn ping_once(&self, ip: IpAddr) -> PingAttempt {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return PingAttempt {
                outcome: PingOutcome::Error,
                latency: None,
                failed_attempts: 0,
                last_error: Some("scanner shut down".to_string()),
            };
        };

        let argv = build_ping_command(&self.config, ip, cfg!(windows));
        let retries = self.config.max_retries.max(1);
        let mut failed_attempts = 0;
        let mut last = (PingOutcome::Error, None);

        for attempt in 0..retries {
            let run = self.runner.run(&argv, self.config.attempt_timeout()).await;
            let (outcome, error) = match run {
                Ok(output) if output.success => {
                    return PingAttempt {
                        outcome: PingOutcome::Success,
                        latency: extract_latency(&output.stdout),
                        failed_attempts,
                        last_error: None,
                    };
                }
                Ok(_) => (PingOutcome::Unreachable, "host unreachable".to_string()),
                Err(RunError::TimedOut) => (PingOutcome::Timeout, "timed out".to_string()),
                Err(e) => (PingOutcome::Error, e.to_string()),
            };

            failed_attempts += 1;
            debug!(%ip, attempt = attempt + 1, %outcome, "echo attempt failed");
            last = (outcome, Some(error));

            if attempt + 1 < retries {
                sleep(Duration::from_secs_f64(0.1 * f64::from(attempt + 1))).await;
            }
        }

        PingAttempt {
            outcome: last.0,
            latency: None,
            failed_attempts,
            last_error: last.1,
        }
    }

    /// Sample one host for the configured duration.
    pub async fn measure_latency(&self, ip: IpAddr) -> (Vec<f64>, u32, u32) {
        let mut samples = Vec::new();
        let mut successes = 0;
        let mut failures = 0;
        let started = Instant::now();
        let duration = self.config.duration();

        while started.elapsed() < duration && !self.stopped() {
            let attempt = self.ping_once(ip).await;
            failures += attempt.failed_attempts;
            if attempt.outcome == PingOutcome::Success {
                successes += 1;
                if let Some(latency) = attempt.latency {
                    samples.push(latency);
                }
            }

            if started.elapsed() < duration {
                sleep(self.config.interval()).await;
            }
        }

        debug!(%ip, samples = samples.len(), "latency sampling finished");
        (samples, successes, failures)
    }

    pub async fn scan(&self, targets: &[IpAddr]) -> Result<PingReport, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::EmptyTargets);
        }
        self.config.validate()?;

        let start_time = Utc::now();
        let started = Instant::now();
        info!(
            hosts = targets.len(),
            concurrency = self.config.concurrent_limit,
            timeout_secs = self.config.timeout,
            "Starting latency scan"
        );

        // Phase 1: liveness
        let progress = Arc::new(ProgressReporter::new(
            targets.len(),
            "hosts checked",
            self.config.show_progress,
        ));
        let checks = targets.iter().map(|ip| {
            let scanner = self.clone();
            let progress = progress.clone();
            let mut result = ScanResult::new(*ip);
            tokio::spawn(async move {
                if scanner.stopped() {
                    result.last_error = Some("not probed: scan interrupted".to_string());
                    return result;
                }
                let attempt = scanner.ping_once(result.ip).await;
                result.error_count += attempt.failed_attempts;
                if attempt.outcome == PingOutcome::Success {
                    result.is_alive = true;
                    result.success_count += 1;
                } else {
                    result.last_error = attempt.last_error;
                }
                progress.advance();
                result
            })
        });
        let mut results = collect_results(targets, join_all(checks).await);
        progress.finish("liveness check complete");

        let alive: Vec<IpAddr> = results.values().filter(|r| r.is_alive).map(|r| r.ip).collect();
        info!(alive = alive.len(), dead = targets.len() - alive.len(), "Liveness phase finished");

        // Phase 2: latency sampling
        if !alive.is_empty() && !self.stopped() {
            let progress = Arc::new(ProgressReporter::new(
                alive.len(),
                "hosts sampled",
                self.config.show_progress,
            ));
            let sampling = alive.iter().filter_map(|ip| results.remove(ip)).map(|mut result| {
                let scanner = self.clone();
                let progress = progress.clone();
                tokio::spawn(async move {
                    let (samples, successes, failures) = scanner.measure_latency(result.ip).await;
                    result.avg_latency = average_latency(&samples);
                    result.latencies = samples;
                    result.success_count += successes;
                    result.error_count += failures;
                    progress.advance();
                    result
                })
            });
            let sampled: Vec<_> = sampling.collect();
            let sampled_results = collect_results(&alive, join_all(sampled).await);
            results.extend(sampled_results);
            progress.finish("latency sampling complete");
        }

        let alive_hosts = results.values().filter(|r| r.is_alive).count();
        let summary = ScanSummary {
            total_hosts: targets.len(),
            alive_hosts,
            dead_hosts: targets.len() - alive_hosts,
            scan_duration: started.elapsed().as_secs_f64(),
            start_time: Some(start_time),
            end_time: Some(Utc::now()),
        };

        info!(
            alive = summary.alive_hosts,
            dead = summary.dead_hosts,
            duration_secs = summary.scan_duration,
            "Latency scan finished"
        );
        Ok(PingReport { summary, results })
    }
}

/// Pair joined task results back up with their targets. A task that died
/// leaves a dead result carrying the failure text.
fn collect_results(
    targets: &[IpAddr],
    joined: Vec<Result<ScanResult, tokio::task::JoinError>>,
) -> BTreeMap<IpAddr, ScanResult> {
    targets
        .iter()
        .zip(joined)
        .map(|(ip, joined)| {
            let result = joined.unwrap_or_else(|e| {
                warn!(%ip, "Latency task failed: {}", e);
                let mut failed = ScanResult::new(*ip);
                failed.record_failure(e.to_string());
                failed
            });
            (*ip, result)
        })
        .collect()
}
