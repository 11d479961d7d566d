use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::credentials::{validate_credentials, Credential};
use crate::error::ConfigError;
use crate::scanner::progress::ProgressReporter;
use crate::scanner::prober::{HostOutcome, HostProbe, HostProber, ProbeFailure};
use crate::scanner::results::{
    devices_by_type, devices_by_vendor, DeviceRecord, DiscoveryStatistics,
};

/// Receives per-host results as they complete.
pub trait ResultSink<T>: Send + Sync {
    fn accept(&self, item: T);
}

/// Result map keyed by address. Inserting is the only mutation.
#[derive(Default)]
pub struct DeviceMap {
    devices: Mutex<HashMap<IpAddr, DeviceRecord>>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> HashMap<IpAddr, DeviceRecord> {
        self.devices.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResultSink<DeviceRecord> for DeviceMap {
    fn accept(&self, record: DeviceRecord) {
        match self.devices.lock() {
            Ok(mut devices) => {
                devices.insert(record.ip, record);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(record.ip, record);
            }
        }
    }
}

/// Everything one discovery batch produced.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub devices: HashMap<IpAddr, DeviceRecord>,
    /// Reason per host that yielded no record
    pub failures: BTreeMap<IpAddr, String>,
    pub total_targets: usize,
    /// Targets never started because the batch was interrupted
    pub skipped: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,
}

impl DiscoveryReport {
    pub fn statistics(&self) -> DiscoveryStatistics {
        DiscoveryStatistics::from_devices(&self.devices)
    }

    pub fn by_vendor(&self, vendor: &str) -> Vec<&DeviceRecord> {
        devices_by_vendor(&self.devices, vendor)
    }

    pub fn by_type(&self, device_type: &str) -> Vec<&DeviceRecord> {
        devices_by_type(&self.devices, device_type)
    }

    /// Devices sorted by address, for stable output.
    pub fn sorted_devices(&self) -> Vec<&DeviceRecord> {
        let mut devices: Vec<&DeviceRecord> = self.devices.values().collect();
        devices.sort_by_key(|d| d.ip);
        devices
    }
}

/// Runs a host probe over every target with a fixed number of workers.
pub struct DiscoveryScheduler {
    prober: Arc<dyn HostProbe>,
    config: DiscoveryConfig,
    stop: Arc<AtomicBool>,
}

impl DiscoveryScheduler {
    pub fn new(prober: Arc<dyn HostProbe>, config: DiscoveryConfig) -> Self {
        Self {
            prober,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_network(config: DiscoveryConfig) -> Self {
        let prober = HostProber::with_network(config.clone());
        Self::new(Arc::new(prober), config)
    }

    /// Setting this flag stops workers from taking new targets. Probes
    /// already running finish on their own timeouts.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub async fn discover(
        &self,
        targets: &[IpAddr],
        credentials: &[Credential],
    ) -> Result<DiscoveryReport, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::EmptyTargets);
        }
        validate_credentials(credentials)?;
        self.config.validate()?;

        let start_time = Utc::now();
        let started = Instant::now();
        let total = targets.len();
        let workers = self.config.max_workers.min(total);

        info!(
            targets = total,
            workers,
            protocols = %self.config.protocol_filter,
            "Starting discovery"
        );

        let queue: Arc<Mutex<VecDeque<IpAddr>>> =
            Arc::new(Mutex::new(targets.iter().copied().collect()));
        let sink = Arc::new(DeviceMap::new());
        let failures: Arc<Mutex<BTreeMap<IpAddr, String>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let credentials: Arc<Vec<Credential>> = Arc::new(credentials.to_vec());
        let progress =
            Arc::new(ProgressReporter::new(total, "hosts probed", self.config.show_progress));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let sink = sink.clone();
            let failures = failures.clone();
            let credentials = credentials.clone();
            let progress = progress.clone();
            let prober = self.prober.clone();
            let stop = self.stop.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if stop.load(Ordering::SeqCst) {
                        debug!(worker_id, "Stop requested, worker exiting");
                        break;
                    }
                    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some(host) = next else {
                        break;
                    };

                    let outcome = run_isolated(prober.clone(), host, credentials.clone()).await;
                    match outcome {
                        HostOutcome::Identified(record) => sink.accept(*record),
                        HostOutcome::Failed(reason) => {
                            debug!(%host, "No device record: {}", reason);
                            if let Ok(mut failures) = failures.lock() {
                                failures.insert(host, reason.to_string());
                            }
                        }
                    }
                    progress.advance();
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Discovery worker ended abnormally: {}", e);
            }
        }

        let skipped = queue.lock().map(|q| q.len()).unwrap_or(0);
        if skipped > 0 {
            warn!(skipped, "Discovery interrupted; remaining targets were not probed");
        }
        progress.finish("discovery complete");

        let devices = Arc::try_unwrap(sink).map(DeviceMap::into_inner).unwrap_or_default();
        let failures = failures.lock().map(|f| f.clone()).unwrap_or_default();
        let duration = started.elapsed();

        info!(
            found = devices.len(),
            failed = failures.len(),
            skipped,
            elapsed_secs = duration.as_secs_f64(),
            "Discovery finished"
        );

        Ok(DiscoveryReport {
            devices,
            failures,
            total_targets: total,
            skipped,
            start_time,
            end_time: Utc::now(),
            duration_secs: duration.as_secs_f64(),
        })
    }
}

/// Run one probe in its own task so a panic stays with that host.
async fn run_isolated(
    prober: Arc<dyn HostProbe>,
    host: IpAddr,
    credentials: Arc<Vec<Credential>>,
) -> HostOutcome {
    let task = tokio::spawn(async move { prober.probe(host, &credentials).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(%host, "Probe task failed: {}", e);
            HostOutcome::Failed(ProbeFailure::TaskFailed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;

    struct PanickyProbe;

    #[async_trait]
    impl HostProbe for PanickyProbe {
        async fn probe(&self, host: IpAddr, _: &[Credential]) -> HostOutcome {
            if host == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)) {
                panic!("probe blew up");
            }
            HostOutcome::Failed(ProbeFailure::NoManagementProtocol)
        }
    }

    fn creds() -> Vec<Credential> {
        vec![Credential::new("admin", "admin")]
    }

    fn quiet_config(max_workers: usize) -> DiscoveryConfig {
        DiscoveryConfig { max_workers, show_progress: false, ..Default::default() }
    }

    #[tokio::test]
    async fn test_rejects_bad_input_before_probing() {
        let scheduler = DiscoveryScheduler::new(Arc::new(PanickyProbe), quiet_config(2));
        let target = [IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))];

        assert_eq!(scheduler.discover(&[], &creds()).await.err(), Some(ConfigError::EmptyTargets));
        assert_eq!(
            scheduler.discover(&target, &[]).await.err(),
            Some(ConfigError::EmptyCredentials)
        );

        let bad = DiscoveryScheduler::new(Arc::new(PanickyProbe), quiet_config(0));
        assert_eq!(
            bad.discover(&target, &creds()).await.err(),
            Some(ConfigError::ZeroLimit("max_workers"))
        );
    }

    #[tokio::test]
    async fn test_panicking_host_does_not_abort_batch() {
        let scheduler = DiscoveryScheduler::new(Arc::new(PanickyProbe), quiet_config(2));
        let targets: Vec<IpAddr> =
            (1..=4).map(|i| IpAddr::V4(Ipv4Addr::new(10, 0, 0, i))).collect();

        let report = scheduler.discover(&targets, &creds()).await.unwrap();
        assert!(report.devices.is_empty());
        assert_eq!(report.failures.len(), 4);
        assert!(report.failures[&targets[1]].starts_with("probe task failed"));
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_stop_flag_skips_unstarted_targets() {
        let scheduler = DiscoveryScheduler::new(Arc::new(PanickyProbe), quiet_config(2));
        scheduler.stop_handle().store(true, Ordering::SeqCst);
        let targets: Vec<IpAddr> =
            (10..=14).map(|i| IpAddr::V4(Ipv4Addr::new(10, 0, 0, i))).collect();

        let report = scheduler.discover(&targets, &creds()).await.unwrap();
        assert_eq!(report.skipped, 5);
        assert!(report.failures.is_empty());
    }
}
