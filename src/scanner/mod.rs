pub mod classifier;
pub mod discovery;
pub mod ping;
pub mod prober;
pub mod progress;
pub mod results;
pub mod session;
pub mod surface;
pub mod tcp;

pub use classifier::{classify, Classification, Classifier, DeviceType, Vendor};
pub use discovery::{DeviceMap, DiscoveryReport, DiscoveryScheduler, ResultSink};
pub use ping::{CommandRunner, LatencyScanner, SystemCommandRunner};
pub use prober::{HostOutcome, HostProbe, HostProber, ProbeFailure};
pub use results::{
    DeviceRecord, DeviceStatus, DiscoveryStatistics, PingReport, ProtocolSurfaceResult, ScanResult,
    ScanSummary, Service, TransportKind,
};
pub use session::{NetworkSessionFactory, SessionFactory, SessionPool, TransportSession};
pub use surface::{ProtocolCatalog, SurfaceProbe, SurfaceScanner};
