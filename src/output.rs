use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use colored::*;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::scanner::discovery::DiscoveryReport;
use crate::scanner::results::{DeviceRecord, PingReport};

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
    include_secrets: bool,
}

/// JSON shape of a discovery inventory.
#[derive(Serialize)]
struct InventoryDocument<'a> {
    total_targets: usize,
    skipped: usize,
    start_time: String,
    end_time: String,
    duration_secs: f64,
    statistics: crate::scanner::results::DiscoveryStatistics,
    devices: Vec<DeviceRecord>,
    failures: &'a std::collections::BTreeMap<std::net::IpAddr, String>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Self {
        Self { format, file, include_secrets: false }
    }

    pub fn include_secrets(mut self, include: bool) -> Self {
        self.include_secrets = include;
        self
    }

    pub fn write_inventory(&self, report: &DiscoveryReport) -> Result<()> {
        let output = match self.format {
            OutputFormat::Human => self.inventory_human(report),
            OutputFormat::Json => self.inventory_json(report)?,
            OutputFormat::Csv => self.inventory_csv(report),
        };
        self.emit(&output)
    }

    pub fn write_ping_report(&self, report: &PingReport) -> Result<()> {
        let output = match self.format {
            OutputFormat::Human => ping_human(report),
            OutputFormat::Json => serde_json::to_string_pretty(report)?,
            OutputFormat::Csv => ping_csv(report),
        };
        self.emit(&output)
    }

    fn emit(&self, output: &str) -> Result<()> {
        match &self.file {
            Some(path) => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }
        Ok(())
    }

    /// Devices in address order, masked unless secrets were requested.
    fn devices(&self, report: &DiscoveryReport) -> Vec<DeviceRecord> {
        report
            .sorted_devices()
            .into_iter()
            .map(|d| if self.include_secrets { d.clone() } else { d.with_masked_secrets() })
            .collect()
    }

    fn inventory_human(&self, report: &DiscoveryReport) -> String {
        let mut output = String::new();
        let stats = report.statistics();

        let title = "DEVICE DISCOVERY COMPLETE".truecolor(0, 255, 65).bold();
        output.push_str(&format!("\n{}\n\n", title));
        output.push_str(&format!(
            "{} {} {} {} {}\n\n",
            "⟦".truecolor(64, 64, 64),
            format!("{:.1}s", report.duration_secs).truecolor(0, 212, 255).bold(),
            "•".truecolor(0, 255, 65),
            format!("{} targets", report.total_targets).truecolor(191, 64, 191).bold(),
            "⟧".truecolor(64, 64, 64)
        ));

        for device in self.devices(report) {
            let vendor = device
                .vendor
                .map(|v| v.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            output.push_str(&format!(
                "{} {} {} {} {}\n",
                "▶".truecolor(0, 255, 65).bold(),
                device.ip.to_string().truecolor(255, 255, 255).bold(),
                "•".truecolor(64, 64, 64),
                device.hostname.truecolor(0, 212, 255).bold(),
                format!("[{}]", device.platform_tag()).truecolor(255, 140, 0)
            ));
            output.push_str(&format!(
                "  {} {}  {} {}  {} {}\n",
                "vendor".truecolor(128, 128, 128),
                vendor,
                "model".truecolor(128, 128, 128),
                device.model.as_deref().unwrap_or("-"),
                "version".truecolor(128, 128, 128),
                device.os_version.as_deref().unwrap_or("-")
            ));
            let capabilities: Vec<String> =
                device.capabilities.iter().map(|c| c.to_string()).collect();
            output.push_str(&format!(
                "  {} {}:{} as {}  {} {}\n\n",
                "via".truecolor(128, 128, 128),
                device.protocol,
                device.port,
                device.login.username,
                "services".truecolor(128, 128, 128),
                if capabilities.is_empty() { "-".to_string() } else { capabilities.join(",") }
            ));
        }

        if stats.total_devices == 0 {
            output.push_str(&format!(
                "{} {}\n",
                "⚠".truecolor(255, 140, 0).bold(),
                "No devices identified".truecolor(128, 128, 128)
            ));
        } else {
            output.push_str(&format!("{}\n", "Vendors".truecolor(191, 64, 191).bold()));
            for (vendor, count) in &stats.vendors {
                output.push_str(&format!("  {:<16} {}\n", vendor, count));
            }
            output.push_str(&format!("{}\n", "Device types".truecolor(191, 64, 191).bold()));
            for (device_type, count) in &stats.device_types {
                output.push_str(&format!("  {:<16} {}\n", device_type, count));
            }
        }

        output.push_str(&format!(
            "\n{} {} {} {} {}\n",
            "⚡".truecolor(0, 255, 65).bold(),
            format!("{} identified", stats.total_devices).truecolor(255, 255, 255).bold(),
            "•".truecolor(64, 64, 64),
            format!("{} failed", report.failures.len()).truecolor(255, 255, 255).bold(),
            if report.skipped > 0 {
                format!("• {} skipped", report.skipped).truecolor(255, 140, 0)
            } else {
                "".truecolor(255, 255, 255)
            }
        ));
        output
    }

    fn inventory_json(&self, report: &DiscoveryReport) -> Result<String> {
        let document = InventoryDocument {
            total_targets: report.total_targets,
            skipped: report.skipped,
            start_time: report.start_time.to_rfc3339(),
            end_time: report.end_time.to_rfc3339(),
            duration_secs: report.duration_secs,
            statistics: report.statistics(),
            devices: self.devices(report),
            failures: &report.failures,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    fn inventory_csv(&self, report: &DiscoveryReport) -> String {
        let mut csv = String::new();
        csv.push_str(
            "ip,hostname,platform,vendor,model,os_version,serial_number,protocol,port,\
             username,password,enable_password,capabilities,status,last_seen\n",
        );

        for device in self.devices(report) {
            let capabilities: Vec<String> =
                device.capabilities.iter().map(|c| c.to_string()).collect();
            let fields = [
                device.ip.to_string(),
                device.hostname.clone(),
                device.platform_tag(),
                device.vendor.map(|v| v.to_string()).unwrap_or_default(),
                device.model.clone().unwrap_or_default(),
                device.os_version.clone().unwrap_or_default(),
                device.serial_number.clone().unwrap_or_default(),
                device.protocol.to_string(),
                device.port.to_string(),
                device.login.username.clone(),
                device.login.password.clone(),
                device.login.enable_password.clone().unwrap_or_default(),
                capabilities.join(";"),
                device.status.to_string(),
                device.last_seen.to_rfc3339(),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        csv
    }
}

fn ping_human(report: &PingReport) -> String {
    let summary = &report.summary;
    let mut output = String::new();

    output.push_str(&format!("\n{}\n\n", "LATENCY SCAN COMPLETE".truecolor(0, 255, 65).bold()));

    for result in report.results.values() {
        if result.is_alive {
            let latency = result
                .avg_latency
                .map(|l| format!("{:.2}ms", l))
                .unwrap_or_else(|| "no samples".to_string());
            output.push_str(&format!(
                "  {} {} {} ({} samples)\n",
                "●".truecolor(0, 255, 65),
                result.ip.to_string().truecolor(255, 255, 255).bold(),
                latency.truecolor(0, 212, 255),
                result.latencies.len()
            ));
        } else {
            output.push_str(&format!(
                "  {} {} {}\n",
                "○".truecolor(128, 128, 128),
                result.ip.to_string().truecolor(128, 128, 128),
                result.last_error.as_deref().unwrap_or("down").truecolor(255, 140, 0)
            ));
        }
    }

    output.push_str(&format!(
        "\n{} {} {} {} {} {}\n",
        "⚡".truecolor(0, 255, 65).bold(),
        format!("{} hosts", summary.total_hosts).truecolor(255, 255, 255).bold(),
        "•".truecolor(64, 64, 64),
        format!("{} alive ({:.1}%)", summary.alive_hosts, summary.alive_percent())
            .truecolor(0, 255, 65)
            .bold(),
        "•".truecolor(64, 64, 64),
        format!("{} dead ({:.1}%)", summary.dead_hosts, summary.dead_percent())
            .truecolor(255, 140, 0)
            .bold()
    ));
    if let Some(mean) = report.mean_latency() {
        output.push_str(&format!("  mean latency {:.2}ms\n", mean));
    }
    output.push_str(&format!("  scan time {:.1}s\n", summary.scan_duration));
    output
}

fn ping_csv(report: &PingReport) -> String {
    let mut csv = String::new();
    csv.push_str("ip,is_alive,avg_latency_ms,samples,success_count,error_count,last_error\n");
    for result in report.results.values() {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            result.ip,
            result.is_alive,
            result.avg_latency.map(|l| format!("{:.2}", l)).unwrap_or_default(),
            result.latencies.len(),
            result.success_count,
            result.error_count,
            csv_field(result.last_error.as_deref().unwrap_or(""))
        ));
    }
    csv
}

/// Quote a CSV field when it holds a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::classifier::{DeviceType, Vendor};
    use crate::scanner::results::{
        DeviceStatus, LoginUsed, ScanResult, ScanSummary, Service, TransportKind,
    };
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};
    use std::net::{IpAddr, Ipv4Addr};

    fn report() -> DiscoveryReport {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let record = DeviceRecord {
            ip,
            hostname: "core-sw1".to_string(),
            device_type: DeviceType::CiscoIos,
            vendor: Some(Vendor::Cisco),
            model: Some("C2960".to_string()),
            os_version: Some("15.0(2)SE".to_string()),
            serial_number: None,
            protocol: TransportKind::Ssh,
            port: 22,
            login: LoginUsed {
                username: "admin".to_string(),
                password: "hunter2".to_string(),
                enable_password: None,
            },
            capabilities: vec![Service::Ssh, Service::Snmp],
            status: DeviceStatus::Active,
            last_seen: Utc::now(),
        };
        let mut devices = HashMap::new();
        devices.insert(ip, record);
        DiscoveryReport {
            devices,
            failures: BTreeMap::new(),
            total_targets: 1,
            skipped: 0,
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_secs: 1.0,
        }
    }

    #[test]
    fn test_inventory_masks_passwords_by_default() {
        let writer = OutputWriter::new(OutputFormat::Json, None);
        let json = writer.inventory_json(&report()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("core-sw1"));

        let csv = writer.inventory_csv(&report());
        assert!(!csv.contains("hunter2"));
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("10.0.0.5,core-sw1,cisco_ios,Cisco,C2960,15.0(2)SE,,ssh,22,"));
        assert!(row.contains(",admin,"));
    }

    #[test]
    fn test_inventory_can_include_secrets() {
        let writer = OutputWriter::new(OutputFormat::Csv, None).include_secrets(true);
        assert!(writer.inventory_csv(&report()).contains("hunter2"));
    }

    #[test]
    fn test_ping_csv() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mut alive = ScanResult::new(ip);
        alive.is_alive = true;
        alive.latencies = vec![1.0, 3.0];
        alive.avg_latency = Some(2.0);
        let mut results = BTreeMap::new();
        results.insert(ip, alive);
        let report = PingReport {
            summary: ScanSummary { total_hosts: 1, alive_hosts: 1, ..Default::default() },
            results,
        };
        let csv = ping_csv(&report);
        assert_eq!(csv.lines().nth(1), Some("10.0.0.1,true,2.00,2,0,0,"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
