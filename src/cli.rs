use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devscope")]
#[command(author = "DevScope")]
#[command(version = "0.1.0")]
#[command(
    about = "Network device discovery over SSH/Telnet and host latency scanning",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true, help = "Enable verbose (debug) logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(long, global = true, help = "Disable the progress bar")]
    pub no_progress: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in to devices and build an inventory
    Discover(DiscoverArgs),
    /// Check liveness and measure average round-trip time
    Ping(PingArgs),
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[arg(help = "Target IP, range (IP1-IP2), CIDR (192.168.1.0/24) or comma list. \
                  Can be specified multiple times.")]
    pub target: Vec<String>,

    #[arg(
        short = 'i',
        long,
        help = "File with one target specification per line (# comments allowed)"
    )]
    pub target_file: Option<PathBuf>,

    #[arg(long, help = "Drop loopback, private and link-local addresses")]
    pub exclude_local: bool,

    #[arg(short = 'o', long, value_enum, default_value = "human", help = "Output format")]
    pub output_format: OutputFormat,

    #[arg(short = 'f', long, help = "Output file path")]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    #[arg(
        short = 'u',
        long = "user",
        help = "Inline credential user:pass[:enable]. Tried in the order given."
    )]
    pub users: Vec<String>,

    #[arg(short = 'c', long, help = "JSON file with a list of credentials, tried in file order")]
    pub credentials: Option<PathBuf>,

    #[arg(short = 'w', long, default_value_t = 10, help = "Hosts probed in parallel")]
    pub workers: usize,

    #[arg(
        short = 't',
        long,
        help = "Connection timeout in seconds for port checks and every login, \
                overriding per-credential timeouts"
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'p',
        long,
        value_enum,
        default_value = "both",
        help = "Transports allowed for login"
    )]
    pub protocol: ProtocolFilter,

    #[arg(long, help = "Write passwords into the inventory instead of masking them")]
    pub include_secrets: bool,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    #[arg(short = 't', long, default_value_t = 2.0, help = "Seconds per echo attempt")]
    pub timeout: f64,

    #[arg(long, default_value_t = 1, help = "Echo requests per probe")]
    pub count: u32,

    #[arg(
        short = 'd',
        long,
        default_value_t = 60.0,
        help = "Seconds of latency sampling per live host"
    )]
    pub duration: f64,

    #[arg(long, default_value_t = 1.0, help = "Seconds between latency samples")]
    pub interval: f64,

    #[arg(short = 'w', long, default_value_t = 100, help = "Probes running at once")]
    pub concurrency: usize,

    #[arg(short = 'r', long, default_value_t = 3, help = "Attempts per liveness probe")]
    pub retries: u32,
}

#[derive(
    Debug, Clone, Copy, ValueEnum, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFilter {
    #[default]
    #[value(name = "both", help = "Try SSH first, then Telnet")]
    Both,
    #[value(name = "ssh", help = "SSH only")]
    Ssh,
    #[value(name = "telnet", help = "Telnet only")]
    Telnet,
}

impl ProtocolFilter {
    pub fn allows_ssh(self) -> bool {
        matches!(self, ProtocolFilter::Both | ProtocolFilter::Ssh)
    }

    pub fn allows_telnet(self) -> bool {
        matches!(self, ProtocolFilter::Both | ProtocolFilter::Telnet)
    }
}

impl std::fmt::Display for ProtocolFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolFilter::Both => write!(f, "both"),
            ProtocolFilter::Ssh => write!(f, "ssh"),
            ProtocolFilter::Telnet => write!(f, "telnet"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable output")]
    Human,
    #[value(name = "json", help = "JSON output")]
    Json,
    #[value(name = "csv", help = "CSV output")]
    Csv,
}
