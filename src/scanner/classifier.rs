use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Bumped whenever the order or content of [`VENDOR_TABLE`] changes.
pub const CLASSIFIER_TABLE_VERSION: u32 = 1;

/// Characters of raw output used as the memo key.
const CACHE_KEY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Vendor {
    Cisco,
    Juniper,
    #[serde(rename = "HP/HPE/Aruba")]
    HpAruba,
    MikroTik,
    Arista,
    #[serde(rename = "Palo Alto")]
    PaloAlto,
    Fortinet,
    Ubiquiti,
    Linux,
    Huawei,
    Dell,
    Extreme,
    Brocade,
    Nokia,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Vendor::Cisco => "Cisco",
            Vendor::Juniper => "Juniper",
            Vendor::HpAruba => "HP/HPE/Aruba",
            Vendor::MikroTik => "MikroTik",
            Vendor::Arista => "Arista",
            Vendor::PaloAlto => "Palo Alto",
            Vendor::Fortinet => "Fortinet",
            Vendor::Ubiquiti => "Ubiquiti",
            Vendor::Linux => "Linux",
            Vendor::Huawei => "Huawei",
            Vendor::Dell => "Dell",
            Vendor::Extreme => "Extreme",
            Vendor::Brocade => "Brocade",
            Vendor::Nokia => "Nokia",
        };
        write!(f, "{}", name)
    }
}

/// Commands sent once a device of a given type has been identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet {
    pub hostname: &'static str,
    pub disable_paging: Option<&'static str>,
}

const CISCO_COMMANDS: CommandSet = CommandSet {
    hostname: "show running-config | include hostname",
    disable_paging: Some("terminal length 0"),
};

const JUNIPER_COMMANDS: CommandSet = CommandSet {
    hostname: "show configuration system host-name",
    disable_paging: Some("set cli screen-length 0"),
};

const COMWARE_COMMANDS: CommandSet = CommandSet {
    hostname: "display current-configuration | include sysname",
    disable_paging: Some("screen-length disable"),
};

const HUAWEI_COMMANDS: CommandSet = CommandSet {
    hostname: "display current-configuration | include sysname",
    disable_paging: Some("screen-length 0 temporary"),
};

const MIKROTIK_COMMANDS: CommandSet = CommandSet {
    hostname: "/system identity print",
    disable_paging: None,
};

const LINUX_COMMANDS: CommandSet = CommandSet {
    hostname: "hostname",
    disable_paging: None,
};

const FORTINET_COMMANDS: CommandSet = CommandSet {
    hostname: "get system status | grep Hostname",
    disable_paging: None,
};

const PANOS_COMMANDS: CommandSet = CommandSet {
    hostname: "show system info | match hostname",
    disable_paging: Some("set cli pager off"),
};

const EXOS_COMMANDS: CommandSet = CommandSet {
    hostname: "show switch | include SysName",
    disable_paging: Some("disable clipaging"),
};

const NOKIA_COMMANDS: CommandSet = CommandSet {
    hostname: "show system information | match Name",
    disable_paging: Some("environment no more"),
};

const UBIQUITI_EDGE_COMMANDS: CommandSet = CommandSet {
    hostname: "show host name",
    disable_paging: Some("terminal length 0"),
};

/// Supported device types. Each one resolves to a [`CommandSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    CiscoIos,
    CiscoXe,
    CiscoXr,
    CiscoNxos,
    CiscoAsa,
    CiscoS300,
    CiscoWlc,
    Juniper,
    JuniperScreenos,
    HpProcurve,
    HpComware,
    ArubaOsswitch,
    MikrotikRouteros,
    AristaEos,
    PaloaltoPanos,
    Fortinet,
    UbiquitiEdge,
    UbiquitiEdgeswitch,
    Linux,
    Huawei,
    DellPowerconnect,
    DellForce10,
    DellOs6,
    DellOs10,
    ExtremeExos,
    BrocadeFastiron,
    NokiaSros,
    /// Fallback when nothing identified the platform
    #[default]
    Autodetect,
}

impl DeviceType {
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceType::CiscoIos => "cisco_ios",
            DeviceType::CiscoXe => "cisco_xe",
            DeviceType::CiscoXr => "cisco_xr",
            DeviceType::CiscoNxos => "cisco_nxos",
            DeviceType::CiscoAsa => "cisco_asa",
            DeviceType::CiscoS300 => "cisco_s300",
            DeviceType::CiscoWlc => "cisco_wlc",
            DeviceType::Juniper => "juniper",
            DeviceType::JuniperScreenos => "juniper_screenos",
            DeviceType::HpProcurve => "hp_procurve",
            DeviceType::HpComware => "hp_comware",
            DeviceType::ArubaOsswitch => "aruba_osswitch",
            DeviceType::MikrotikRouteros => "mikrotik_routeros",
            DeviceType::AristaEos => "arista_eos",
            DeviceType::PaloaltoPanos => "paloalto_panos",
            DeviceType::Fortinet => "fortinet",
            DeviceType::UbiquitiEdge => "ubiquiti_edge",
            DeviceType::UbiquitiEdgeswitch => "ubiquiti_edgeswitch",
            DeviceType::Linux => "linux",
            DeviceType::Huawei => "huawei",
            DeviceType::DellPowerconnect => "dell_powerconnect",
            DeviceType::DellForce10 => "dell_force10",
            DeviceType::DellOs6 => "dell_os6",
            DeviceType::DellOs10 => "dell_os10",
            DeviceType::ExtremeExos => "extreme_exos",
            DeviceType::BrocadeFastiron => "brocade_fastiron",
            DeviceType::NokiaSros => "nokia_sros",
            DeviceType::Autodetect => "autodetect",
        }
    }

    /// Tag used when the device is driven over telnet.
    pub fn telnet_tag(&self) -> String {
        match self {
            DeviceType::Autodetect => self.tag().to_string(),
            other => format!("{}_telnet", other.tag()),
        }
    }

    pub fn commands(&self) -> CommandSet {
        match self {
            DeviceType::CiscoIos
            | DeviceType::CiscoXe
            | DeviceType::CiscoXr
            | DeviceType::CiscoNxos
            | DeviceType::CiscoS300
            | DeviceType::CiscoWlc
            | DeviceType::AristaEos
            | DeviceType::HpProcurve
            | DeviceType::ArubaOsswitch
            | DeviceType::DellPowerconnect
            | DeviceType::DellForce10
            | DeviceType::DellOs6
            | DeviceType::DellOs10
            | DeviceType::BrocadeFastiron
            | DeviceType::UbiquitiEdgeswitch => CISCO_COMMANDS,
            DeviceType::CiscoAsa => CommandSet {
                disable_paging: Some("terminal pager 0"),
                ..CISCO_COMMANDS
            },
            DeviceType::Juniper | DeviceType::JuniperScreenos => JUNIPER_COMMANDS,
            DeviceType::HpComware => COMWARE_COMMANDS,
            DeviceType::Huawei => HUAWEI_COMMANDS,
            DeviceType::MikrotikRouteros => MIKROTIK_COMMANDS,
            DeviceType::Linux | DeviceType::Autodetect => LINUX_COMMANDS,
            DeviceType::Fortinet => FORTINET_COMMANDS,
            DeviceType::PaloaltoPanos => PANOS_COMMANDS,
            DeviceType::ExtremeExos => EXOS_COMMANDS,
            DeviceType::NokiaSros => NOKIA_COMMANDS,
            DeviceType::UbiquitiEdge => UBIQUITI_EDGE_COMMANDS,
        }
    }

    /// Look a device type up by tag. Telnet tags resolve to their base type;
    /// anything unknown becomes [`DeviceType::Autodetect`].
    pub fn from_tag(tag: &str) -> DeviceType {
        let base = tag.trim().to_ascii_lowercase();
        let base = base.strip_suffix("_telnet").unwrap_or(&base);
        ALL_DEVICE_TYPES
            .iter()
            .copied()
            .find(|t| t.tag() == base)
            .unwrap_or_default()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

pub const ALL_DEVICE_TYPES: [DeviceType; 28] = [
    DeviceType::CiscoIos,
    DeviceType::CiscoXe,
    DeviceType::CiscoXr,
    DeviceType::CiscoNxos,
    DeviceType::CiscoAsa,
    DeviceType::CiscoS300,
    DeviceType::CiscoWlc,
    DeviceType::Juniper,
    DeviceType::JuniperScreenos,
    DeviceType::HpProcurve,
    DeviceType::HpComware,
    DeviceType::ArubaOsswitch,
    DeviceType::MikrotikRouteros,
    DeviceType::AristaEos,
    DeviceType::PaloaltoPanos,
    DeviceType::Fortinet,
    DeviceType::UbiquitiEdge,
    DeviceType::UbiquitiEdgeswitch,
    DeviceType::Linux,
    DeviceType::Huawei,
    DeviceType::DellPowerconnect,
    DeviceType::DellForce10,
    DeviceType::DellOs6,
    DeviceType::DellOs10,
    DeviceType::ExtremeExos,
    DeviceType::BrocadeFastiron,
    DeviceType::NokiaSros,
    DeviceType::Autodetect,
];

/// Vendor signatures, matched case-insensitively. The first vendor with any
/// matching signature wins, so the order of this table settles output that
/// names more than one vendor.
pub const VENDOR_TABLE: &[(Vendor, &[&str])] = &[
    (
        Vendor::Cisco,
        &[
            r"\bcisco\b",
            r"\bios\b",
            r"\bios[\s-]+x[er]\b",
            r"\bnexus\b",
            r"\bnx-os\b",
            r"\basa\b",
            r"\bcat\d+",
            r"\bws-c\d+",
            r"\basr\d+",
            r"\bisr\d+",
        ],
    ),
    (
        Vendor::Juniper,
        &[
            r"\bjuniper\b",
            r"\bjunos\b",
            r"\bsrx\d*\b",
            r"\bex\d{3,4}\b",
            r"\bmx\d+\b",
            r"\bptx\d+\b",
            r"\bqfx\d+\b",
        ],
    ),
    (
        Vendor::HpAruba,
        &[
            r"\bprocurve\b",
            r"\baruba\b",
            r"\bhpe?\b",
            r"\bhewlett[\s-]packard\b",
            r"\bcomware\b",
        ],
    ),
    (
        Vendor::MikroTik,
        &[
            r"\bmikrotik\b",
            r"\brouteros\b",
            r"\bccr\d+",
            r"\brb\d+",
            r"\bhex\b",
            r"\bhap\b",
        ],
    ),
    (Vendor::Arista, &[r"\barista\b", r"\beos\b", r"\bdcs-\d+"]),
    (Vendor::PaloAlto, &[r"\bpalo\s*alto\b", r"\bpan-os\b", r"\bpa-\d+"]),
    (Vendor::Fortinet, &[r"\bfortinet\b", r"\bfortios\b", r"\bfortigate\b"]),
    (
        Vendor::Ubiquiti,
        &[r"\bubiquiti\b", r"\bedgerouter\b", r"\bedgeswitch\b", r"\bedgeos\b", r"\bunifi\b"],
    ),
    (
        Vendor::Linux,
        &[
            r"\blinux\b",
            r"\bubuntu\b",
            r"\bdebian\b",
            r"\bcentos\b",
            r"\bred\s+hat\b",
            r"\bfedora\b",
        ],
    ),
    (Vendor::Huawei, &[r"\bhuawei\b", r"\bvrp\b", r"\bce\d{4,}", r"\bne\d{2,}"]),
    (Vendor::Dell, &[r"\bdell\b", r"\bpowerconnect\b", r"\bforce10\b"]),
    (Vendor::Extreme, &[r"\bextreme\b", r"\bexos\b", r"\bextremexos\b"]),
    (Vendor::Brocade, &[r"\bbrocade\b", r"\bvdx\b", r"\bnetiron\b", r"\bfastiron\b"]),
    (Vendor::Nokia, &[r"\bnokia\b", r"\bsr\s*os\b", r"\btimos\b", r"\balcatel\b"]),
];

const VERSION_PATTERNS: &[&str] = &[
    r"(?i)\bversion\s+(\S+)",
    r"(?i)\bjunos:?\s+(\S+)",
    r#"(?i)\bversion\s*=\s*"([^"]+)""#,
    r"(?i)\brelease\s+(\S+)",
    r"(?i)\bsoftware\s+version\s+(\S+)",
];

const SERIAL_PATTERNS: &[&str] = &[
    r"(?i)\bsystem\s+serial\s+number\s*\.*:\s*(\S+)",
    r"(?i)\bserial\s+number\s*\.*:\s*(\S+)",
    r"(?i)\bserial\s*#\s*\.*:\s*(\S+)",
    r"(?i)\bprocessor\s+board\s+id\s+(\S+)",
    r"(?i)\bs/?n\s*:\s*(\S+)",
];

const CISCO_MODEL_PATTERNS: &[&str] = &[
    r"(?i)\bcisco\s+(\S+)\s+\(",
    r"(?i)\bmodel\s+number\s*\.*:\s*(\S+)",
    r"(?i)\bmodel\s*\.*:\s*(\S+)",
    r"(?i)\bplatform:\s*(\S+)",
    r"(?i)\b(c\d{3,5}[a-z]*)\s+software",
    r"(?i)\bcatalyst\s+(\d+)",
];

const JUNIPER_MODEL_PATTERNS: &[&str] = &[
    r"(?i)\bmodel:\s*(\S+)",
    r"(?i)\bmodel\s+number:\s*(\S+)",
    r"(?i)\b((?:srx|mx|ex|qfx|ptx)\d+\S*)",
];

const MIKROTIK_MODEL_PATTERNS: &[&str] = &[
    r"(?i)\bboard-name:\s*(\S+)",
    r"(?i)\bplatform:\s*(\S+)",
    r"(?i)\b(ccr\d+\S*)",
    r"(?i)\b(rb\d+\S*)",
];

const GENERIC_MODEL_PATTERNS: &[&str] = &[
    r"(?i)\bmodel\s*\.*:\s*(\S+)",
    r"(?i)\bplatform:\s*(\S+)",
    r"(?i)\bproduct\s+name:\s*(\S+)",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

lazy_static::lazy_static! {
    static ref VENDOR_RULES: Vec<(Vendor, Vec<Regex>)> = VENDOR_TABLE
        .iter()
        .map(|(vendor, signatures)| {
            let compiled = signatures
                .iter()
                .filter_map(|s| Regex::new(&format!("(?i){}", s)).ok())
                .collect();
            (*vendor, compiled)
        })
        .collect();
    static ref VERSION_RULES: Vec<Regex> = compile(VERSION_PATTERNS);
    static ref SERIAL_RULES: Vec<Regex> = compile(SERIAL_PATTERNS);
    static ref CISCO_MODEL_RULES: Vec<Regex> = compile(CISCO_MODEL_PATTERNS);
    static ref JUNIPER_MODEL_RULES: Vec<Regex> = compile(JUNIPER_MODEL_PATTERNS);
    static ref MIKROTIK_MODEL_RULES: Vec<Regex> = compile(MIKROTIK_MODEL_PATTERNS);
    static ref GENERIC_MODEL_RULES: Vec<Regex> = compile(GENERIC_MODEL_PATTERNS);
    static ref CISCO_ASA: Regex = Regex::new(r"(?i)\basa\b|adaptive security appliance").unwrap();
    static ref CISCO_NXOS: Regex = Regex::new(r"(?i)\bnexus\b|\bnx-os\b").unwrap();
    static ref CISCO_XE: Regex = Regex::new(r"(?i)\bios[- ]xe\b").unwrap();
    static ref CISCO_XR: Regex = Regex::new(r"(?i)\bios[- ]xr\b").unwrap();
    static ref SUBTYPE_RULES: Vec<(Vendor, Regex, DeviceType)> = [
        (Vendor::Juniper, r"(?i)\bscreenos\b", DeviceType::JuniperScreenos),
        (Vendor::HpAruba, r"(?i)\bcomware\b", DeviceType::HpComware),
        (Vendor::HpAruba, r"(?i)\baruba\b", DeviceType::ArubaOsswitch),
        (Vendor::Ubiquiti, r"(?i)\bedgeswitch\b", DeviceType::UbiquitiEdgeswitch),
        (Vendor::Dell, r"(?i)\bforce10\b", DeviceType::DellForce10),
        (Vendor::Dell, r"(?i)\bos\s?10\b", DeviceType::DellOs10),
        (Vendor::Dell, r"(?i)\bos\s?6\b", DeviceType::DellOs6),
    ]
    .into_iter()
    .filter_map(|(vendor, pattern, device_type)| {
        Regex::new(pattern).ok().map(|re| (vendor, re, device_type))
    })
    .collect();
}

/// Everything the classifier infers from one identification output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub vendor: Option<Vendor>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub serial_number: Option<String>,
    pub device_type: DeviceType,
}

fn first_capture(rules: &[Regex], text: &str) -> Option<String> {
    rules
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
}

pub fn detect_vendor(output: &str) -> Option<Vendor> {
    VENDOR_RULES
        .iter()
        .find(|(_, signatures)| signatures.iter().any(|re| re.is_match(output)))
        .map(|(vendor, _)| *vendor)
}

pub fn extract_model(output: &str, vendor: Vendor) -> Option<String> {
    let rules: &[Regex] = match vendor {
        Vendor::Cisco => &CISCO_MODEL_RULES,
        Vendor::Juniper => &JUNIPER_MODEL_RULES,
        Vendor::MikroTik => &MIKROTIK_MODEL_RULES,
        _ => &GENERIC_MODEL_RULES,
    };
    first_capture(rules, output)
}

pub fn extract_version(output: &str) -> Option<String> {
    first_capture(&VERSION_RULES, output)
        .map(|v| v.trim_end_matches([',', ';']).to_string())
        .filter(|v| !v.is_empty())
}

pub fn extract_serial(output: &str) -> Option<String> {
    first_capture(&SERIAL_RULES, output)
}

/// Second-stage lookup: narrow a vendor down to a device type.
pub fn determine_device_type(vendor: Vendor, output: &str) -> DeviceType {
    if vendor == Vendor::Cisco {
        return if CISCO_ASA.is_match(output) {
            DeviceType::CiscoAsa
        } else if CISCO_NXOS.is_match(output) {
            DeviceType::CiscoNxos
        } else if CISCO_XE.is_match(output) {
            DeviceType::CiscoXe
        } else if CISCO_XR.is_match(output) {
            DeviceType::CiscoXr
        } else {
            DeviceType::CiscoIos
        };
    }

    if let Some((_, _, device_type)) = SUBTYPE_RULES
        .iter()
        .find(|(v, re, _)| *v == vendor && re.is_match(output))
    {
        return *device_type;
    }

    match vendor {
        Vendor::Cisco => DeviceType::CiscoIos,
        Vendor::Juniper => DeviceType::Juniper,
        Vendor::HpAruba => DeviceType::HpProcurve,
        Vendor::MikroTik => DeviceType::MikrotikRouteros,
        Vendor::Arista => DeviceType::AristaEos,
        Vendor::PaloAlto => DeviceType::PaloaltoPanos,
        Vendor::Fortinet => DeviceType::Fortinet,
        Vendor::Ubiquiti => DeviceType::UbiquitiEdge,
        Vendor::Linux => DeviceType::Linux,
        Vendor::Huawei => DeviceType::Huawei,
        Vendor::Dell => DeviceType::DellPowerconnect,
        Vendor::Extreme => DeviceType::ExtremeExos,
        Vendor::Brocade => DeviceType::BrocadeFastiron,
        Vendor::Nokia => DeviceType::NokiaSros,
    }
}

/// Pure classification, no memoization.
pub fn classify(output: &str) -> Classification {
    let vendor = detect_vendor(output);
    Classification {
        vendor,
        model: vendor.and_then(|v| extract_model(output, v)),
        os_version: extract_version(output),
        serial_number: extract_serial(output),
        device_type: vendor.map(|v| determine_device_type(v, output)).unwrap_or_default(),
    }
}

/// Classifier with a per-run memo keyed on the start of the output.
#[derive(Default)]
pub struct Classifier {
    cache: Mutex<HashMap<u64, Classification>>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, output: &str) -> Classification {
        let key = cache_key(output);
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                trace!("classification cache hit");
                return hit.clone();
            }
        }

        let result = classify(output);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        result
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

fn cache_key(output: &str) -> u64 {
    let end = output
        .char_indices()
        .nth(CACHE_KEY_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(output.len());
    let mut hasher = DefaultHasher::new();
    output[..end].hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CISCO_IOS: &str = "Cisco IOS Software, C2960 Software (C2960-LANBASEK9-M), \
        Version 15.0(2)SE, RELEASE SOFTWARE (fc1)\n\
        Technical Support: http://www.cisco.com/techsupport\n\
        cisco WS-C2960-24TT-L (PowerPC405) processor (revision B0) with 65536K bytes of memory.\n\
        Processor board ID FOC1010X104\n\
        System serial number            : FOC1010X104\n";

    #[test]
    fn test_cisco_ios_banner() {
        let c = classify(CISCO_IOS);
        assert_eq!(c.vendor, Some(Vendor::Cisco));
        assert_eq!(c.device_type, DeviceType::CiscoIos);
        assert_eq!(c.os_version.as_deref(), Some("15.0(2)SE"));
        assert_eq!(c.model.as_deref(), Some("WS-C2960-24TT-L"));
        assert_eq!(c.serial_number.as_deref(), Some("FOC1010X104"));
    }

    #[test]
    fn test_short_cisco_banner_model() {
        let c =
            classify("Cisco IOS Software, C2960 Software (C2960-LANBASEK9-M), Version 15.0(2)SE");
        assert_eq!(c.model.as_deref(), Some("C2960"));
        assert_eq!(c.device_type, DeviceType::CiscoIos);
    }

    #[test]
    fn test_cisco_subtypes() {
        let nexus = "Cisco Nexus Operating System (NX-OS) Software\n  NXOS: version 9.3(5)";
        assert_eq!(classify(nexus).device_type, DeviceType::CiscoNxos);

        let asa = "Cisco Adaptive Security Appliance Software Version 9.8(2)";
        assert_eq!(classify(asa).device_type, DeviceType::CiscoAsa);

        let xe = "Cisco IOS XE Software, Version 16.09.03";
        assert_eq!(classify(xe).device_type, DeviceType::CiscoXe);

        let xr = "Cisco IOS XR Software, Version 6.5.3";
        assert_eq!(classify(xr).device_type, DeviceType::CiscoXr);
    }

    #[test]
    fn test_table_order_breaks_ties() {
        // Juniper is named first in the text but Cisco comes first in the table.
        let text = "juniper networks gear replaced by cisco hardware";
        assert_eq!(detect_vendor(text), Some(Vendor::Cisco));
        assert_eq!(VENDOR_TABLE[0].0, Vendor::Cisco);
        assert_eq!(VENDOR_TABLE[1].0, Vendor::Juniper);
    }

    #[test]
    fn test_deterministic() {
        let a = classify(CISCO_IOS);
        let b = classify(CISCO_IOS);
        assert_eq!(a, b);

        let classifier = Classifier::new();
        assert_eq!(classifier.classify(CISCO_IOS), a);
        assert_eq!(classifier.classify(CISCO_IOS), a);
        assert_eq!(classifier.cached_entries(), 1);
    }

    #[test]
    fn test_juniper() {
        let text = "Hostname: edge1\nModel: mx480\nJunos: 18.4R1.8\nJUNOS OS Kernel 64-bit";
        let c = classify(text);
        assert_eq!(c.vendor, Some(Vendor::Juniper));
        assert_eq!(c.model.as_deref(), Some("mx480"));
        assert_eq!(c.os_version.as_deref(), Some("18.4R1.8"));
        assert_eq!(c.device_type, DeviceType::Juniper);
    }

    #[test]
    fn test_mikrotik() {
        let text = "uptime: 3d\nversion: 6.48.6 (long-term)\n\
                    board-name: CCR1036-12G-4S\nplatform: MikroTik";
        let c = classify(text);
        assert_eq!(c.vendor, Some(Vendor::MikroTik));
        assert_eq!(c.model.as_deref(), Some("CCR1036-12G-4S"));
        assert_eq!(c.device_type, DeviceType::MikrotikRouteros);
    }

    #[test]
    fn test_linux_os_release() {
        let text = "NAME=\"Ubuntu\"\nVERSION=\"22.04.3 LTS (Jammy Jellyfish)\"\nID=ubuntu";
        let c = classify(text);
        assert_eq!(c.vendor, Some(Vendor::Linux));
        assert_eq!(c.os_version.as_deref(), Some("22.04.3 LTS (Jammy Jellyfish)"));
        assert_eq!(c.device_type, DeviceType::Linux);
    }

    #[test]
    fn test_vendor_defaults_and_subtypes() {
        assert_eq!(classify("HP Comware Platform Software").device_type, DeviceType::HpComware);
        assert_eq!(classify("ProCurve J9280A Switch 2510B").device_type, DeviceType::HpProcurve);
        assert_eq!(classify("Ubiquiti EdgeSwitch 24").device_type, DeviceType::UbiquitiEdgeswitch);
        assert_eq!(
            classify("Dell EMC Networking OS10 Enterprise").device_type,
            DeviceType::DellOs10
        );
        assert_eq!(classify("ExtremeXOS version 22.5").device_type, DeviceType::ExtremeExos);
        assert_eq!(classify("Brocade FastIron ICX").device_type, DeviceType::BrocadeFastiron);
        assert_eq!(classify("TiMOS-C-16.0.R4 Nokia 7750 SR").device_type, DeviceType::NokiaSros);
    }

    #[test]
    fn test_unknown_output() {
        let c = classify("nothing recognizable here at all");
        assert_eq!(c.vendor, None);
        assert_eq!(c.model, None);
        assert_eq!(c.device_type, DeviceType::Autodetect);
    }

    #[test]
    fn test_word_boundaries() {
        // "bios" must not read as Cisco IOS.
        assert_eq!(detect_vendor("BIOS date 01/02/2020"), None);
    }

    #[test]
    fn test_device_type_tags() {
        assert_eq!(DeviceType::CiscoIos.telnet_tag(), "cisco_ios_telnet");
        assert_eq!(DeviceType::Autodetect.telnet_tag(), "autodetect");
        assert_eq!(DeviceType::from_tag("cisco_xe_telnet"), DeviceType::CiscoXe);
        assert_eq!(DeviceType::from_tag("something_else"), DeviceType::Autodetect);
        assert_eq!(DeviceType::MikrotikRouteros.commands().hostname, "/system identity print");
        assert_eq!(DeviceType::Linux.commands().disable_paging, None);
        assert_eq!(DeviceType::Huawei.commands().disable_paging, Some("screen-length 0 temporary"));
        for device_type in ALL_DEVICE_TYPES {
            assert_eq!(DeviceType::from_tag(device_type.tag()), device_type);
        }
    }

    #[test]
    fn test_cache_key_respects_char_boundaries() {
        let text = "é".repeat(600);
        let classifier = Classifier::new();
        classifier.classify(&text);
        assert_eq!(classifier.cached_entries(), 1);
    }
}
