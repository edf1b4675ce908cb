use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

pub const DEFAULT_INTERFACE_NAME: &str = "inversg";
pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyUSB0";
pub const DEFAULT_PEER_SERIAL_PATH: &str = "/dev/ttyUSB1";
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default relay buffer, large enough for a full 1500 byte MTU frame.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Interface MTU the relay buffer must hold a whole frame of.
pub const DEFAULT_MTU: usize = 1500;
const ETHERNET_HEADER_LEN: usize = 14;
const PACKET_INFO_LEN: usize = 4;

/// Linux `IFNAMSIZ`, including the trailing NUL.
pub const IFNAMSIZ: usize = 16;

pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200, 230_400, 460_800, 921_600,
];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceMode {
    /// Point-to-point IP tunnel (`IFF_TUN`).
    #[default]
    Tun,
    /// Ethernet frames (`IFF_TAP`).
    Tap,
}

impl std::fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceMode::Tun => f.write_str("tun"),
            InterfaceMode::Tap => f.write_str("tap"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct InterfaceConfig {
    pub name: String,
    pub mode: InterfaceMode,
    /// Keep the 4 byte packet information header on every frame.
    pub packet_info: bool,
}

impl InterfaceConfig {
    /// Largest frame a single read of the interface returns at [`DEFAULT_MTU`].
    pub fn max_frame_size(&self) -> usize {
        let mut size = DEFAULT_MTU;
        if self.mode == InterfaceMode::Tap {
            size += ETHERNET_HEADER_LEN;
        }
        if self.packet_info {
            size += PACKET_INFO_LEN;
        }
        size
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_INTERFACE_NAME.to_string(),
            mode: InterfaceMode::Tun,
            packet_info: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SerialConfig {
    pub path: String,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SERIAL_PATH.to_string(),
            baud: DEFAULT_BAUD,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RelayConfig {
    pub buffer_size: Option<String>, // e.g. "2KiB"
    /// CPUs for the tun->serial and serial->tun workers, in that order.
    pub pin_cpus: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub schema_version: String,
    #[serde(default)]
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            interface: InterfaceConfig::default(),
            serial: SerialConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open bridge config at {:?}", path.as_ref()))?;
        let config: Self =
            serde_yaml::from_reader(f).context("Failed to parse Bridge Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        validate_interface_name(&self.interface.name)?;

        if self.serial.path.trim().is_empty() {
            anyhow::bail!("Serial 'path' cannot be empty");
        }
        validate_baud(self.serial.baud)?;

        self.buffer_size()?;
        validate_pin_cpus(&self.relay.pin_cpus)?;

        Ok(())
    }

    /// Relay buffer capacity in bytes.
    pub fn buffer_size(&self) -> Result<usize> {
        let size = match &self.relay.buffer_size {
            Some(s) => parse_size(s)? as usize,
            None => DEFAULT_BUFFER_SIZE,
        };
        // A shorter read of the interface drops the tail of the frame.
        let min = self.interface.max_frame_size();
        if !(min..=MAX_BUFFER_SIZE).contains(&size) {
            anyhow::bail!(
                "Relay 'buffer_size' must be between {} and {} bytes for a {} interface, got {}",
                min,
                MAX_BUFFER_SIZE,
                self.interface.mode,
                size
            );
        }
        Ok(size)
    }

    /// CPU pair for the two workers, if pinning was requested.
    pub fn cpu_pair(&self) -> Option<[usize; 2]> {
        match self.relay.pin_cpus.as_slice() {
            [a, b] => Some([*a, *b]),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PingConfig {
    pub port_a: String,
    pub port_b: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Exchanges per leg; unlimited when unset.
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub pin_cpus: Vec<usize>,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            port_a: DEFAULT_SERIAL_PATH.to_string(),
            port_b: DEFAULT_PEER_SERIAL_PATH.to_string(),
            baud: DEFAULT_BAUD,
            count: None,
            pin_cpus: Vec::new(),
        }
    }
}

impl PingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port_a.trim().is_empty() || self.port_b.trim().is_empty() {
            anyhow::bail!("Ping 'port_a' and 'port_b' cannot be empty");
        }
        if self.port_a == self.port_b {
            anyhow::bail!("Ping 'port_a' and 'port_b' must be different ports");
        }
        validate_baud(self.baud)?;
        if self.count == Some(0) {
            anyhow::bail!("Ping 'count' must be greater than zero");
        }
        validate_pin_cpus(&self.pin_cpus)?;
        Ok(())
    }

    pub fn cpu_pair(&self) -> Option<[usize; 2]> {
        match self.pin_cpus.as_slice() {
            [a, b] => Some([*a, *b]),
            _ => None,
        }
    }
}

pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Interface 'name' cannot be empty");
    }
    if name.len() >= IFNAMSIZ {
        anyhow::bail!(
            "Interface 'name' must be shorter than {} bytes, got '{}'",
            IFNAMSIZ,
            name
        );
    }
    if name.chars().any(|c| c == '/' || c.is_whitespace() || c == '\0') {
        anyhow::bail!("Interface 'name' contains invalid characters: '{}'", name);
    }
    Ok(())
}

fn validate_baud(baud: u32) -> Result<()> {
    if !SUPPORTED_BAUD_RATES.contains(&baud) {
        anyhow::bail!(
            "Unsupported baud rate {}. Supported rates: {:?}",
            baud,
            SUPPORTED_BAUD_RATES
        );
    }
    Ok(())
}

fn validate_pin_cpus(cpus: &[usize]) -> Result<()> {
    match cpus {
        [] => Ok(()),
        [a, b] if a != b => Ok(()),
        [_, _] => anyhow::bail!("'pin_cpus' must name two distinct CPUs"),
        _ => anyhow::bail!(
            "'pin_cpus' must list exactly two CPUs, one per worker, got {}",
            cpus.len()
        ),
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let trimmed = size_str.trim();
    if let Ok(bytes) = trimmed.parse::<u64>() {
        return Ok(bytes);
    }
    let s: Size = trimmed
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
