//! Configuration File
//!
//! FlashBus reads an optional TOML file describing the transport, the device
//! identity and the units to serve. Command line flags override the
//! `[server]` section.
//!
//! ```toml
//! single = false
//!
//! [server]
//! mode = "tcp"          # tcp | udp | serial
//! host = "0.0.0.0"
//! port = 5020
//! framer = "socket"     # socket | rtu | ascii, defaults by mode
//!
//! [identity]
//! vendor_name = "Acme"
//! product_code = "AC-1"
//!
//! [[units]]
//! id = 1
//! size = 100
//! holding_registers = [10, 20, 30]
//!
//! [[units]]
//! id = 2
//! start = 1000
//! size = 16
//! coils = [true, false, true]
//! ```
//!
//! Every table of a unit spans `start..start + size`; seed values fill the
//! table from `start` and the rest is zero.

use crate::datastore::{DataBlock, MemoryUnit, StoreContext};
use crate::device::{DeviceIdentity, MAX_OBJECT_LEN};
use crate::framer::FramerKind;
use crate::{DEFAULT_BAUDRATE, DEFAULT_HOST, DEFAULT_PORT};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Entries per table when a unit does not say.
pub const DEFAULT_UNIT_SIZE: usize = 100;

/// Serial device opened when none is configured.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Errors raised while loading or applying a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unit {0} is defined more than once")]
    DuplicateUnit(u8),

    #[error("unit {unit}: {len} {table} values do not fit in {size} entries")]
    TooManyValues {
        unit: u8,
        table: &'static str,
        len: usize,
        size: usize,
    },

    #[error("unit {unit}: {size} entries starting at {start} exceed the address space")]
    AddressOverflow { unit: u8, start: u16, size: usize },

    #[error("single mode needs exactly one unit, found {0}")]
    SingleUnitCount(usize),

    #[error("identity object {object:#04x} is {len} bytes long (max: {max})")]
    IdentityTooLong { object: u8, len: usize, max: usize },
}

/// Transport the binary serves on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Tcp,
    Udp,
    Serial,
}

impl TransportMode {
    /// Framing used when none is configured.
    pub fn default_framer(self) -> FramerKind {
        match self {
            TransportMode::Tcp | TransportMode::Udp => FramerKind::Socket,
            TransportMode::Serial => FramerKind::Ascii,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Tcp => write!(f, "tcp"),
            TransportMode::Udp => write!(f, "udp"),
            TransportMode::Serial => write!(f, "serial"),
        }
    }
}

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub mode: TransportMode,
    pub host: String,
    pub port: u16,
    /// Serial device path
    pub device: String,
    pub baud_rate: u32,
    /// Overrides the mode's default framing
    pub framer: Option<FramerKind>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            mode: TransportMode::Tcp,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            framer: None,
        }
    }
}

impl ServerSection {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn framer_kind(&self) -> FramerKind {
        self.framer.unwrap_or_else(|| self.mode.default_framer())
    }
}

/// One `[[units]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitConfig {
    pub id: u8,
    #[serde(default)]
    pub start: u16,
    #[serde(default = "default_unit_size")]
    pub size: usize,
    #[serde(default)]
    pub coils: Vec<bool>,
    #[serde(default)]
    pub discrete_inputs: Vec<bool>,
    #[serde(default)]
    pub holding_registers: Vec<u16>,
    #[serde(default)]
    pub input_registers: Vec<u16>,
}

fn default_unit_size() -> usize {
    DEFAULT_UNIT_SIZE
}

impl UnitConfig {
    /// A zeroed unit of `size` entries per table starting at address 0.
    pub fn zeroed(id: u8, size: usize) -> Self {
        Self {
            id,
            start: 0,
            size,
            coils: Vec::new(),
            discrete_inputs: Vec::new(),
            holding_registers: Vec::new(),
            input_registers: Vec::new(),
        }
    }

    /// Builds the in-memory unit this entry describes.
    pub fn build(&self) -> Result<MemoryUnit, ConfigError> {
        if self.start as usize + self.size > u16::MAX as usize + 1 {
            return Err(ConfigError::AddressOverflow {
                unit: self.id,
                start: self.start,
                size: self.size,
            });
        }

        Ok(MemoryUnit::builder()
            .coils(self.block("coils", &self.coils)?)
            .discrete_inputs(self.block("discrete_inputs", &self.discrete_inputs)?)
            .holding_registers(self.block("holding_registers", &self.holding_registers)?)
            .input_registers(self.block("input_registers", &self.input_registers)?)
            .build())
    }

    fn block<T: Copy + Default>(
        &self,
        table: &'static str,
        seed: &[T],
    ) -> Result<DataBlock<T>, ConfigError> {
        if seed.len() > self.size {
            return Err(ConfigError::TooManyValues {
                unit: self.id,
                table,
                len: seed.len(),
                size: self.size,
            });
        }
        let mut values = seed.to_vec();
        values.resize(self.size, T::default());
        Ok(DataBlock::sequential(self.start, values))
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,

    /// Identity fields overriding the defaults
    pub identity: Option<DeviceIdentity>,

    /// Serve the one configured unit under every unit id
    pub single: bool,

    pub units: Vec<UnitConfig>,
}

impl Default for ServerConfig {
    /// Unit 1 with [`DEFAULT_UNIT_SIZE`] zeroed entries per table, on TCP.
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            identity: None,
            single: false,
            units: vec![UnitConfig::zeroed(1, DEFAULT_UNIT_SIZE)],
        }
    }
}

impl ServerConfig {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Checks that every identity object fits in one response.
    ///
    /// The server id is taken from an identity object, so this bounds it too.
    pub fn check_identity(&self) -> Result<(), ConfigError> {
        match self.identity.as_ref().and_then(DeviceIdentity::oversized_object) {
            Some((object, len)) => Err(ConfigError::IdentityTooLong {
                object,
                len,
                max: MAX_OBJECT_LEN,
            }),
            None => Ok(()),
        }
    }

    /// Builds the datastore context for the configured units.
    pub fn build_store(&self) -> Result<StoreContext, ConfigError> {
        self.check_identity()?;

        let mut seen = BTreeSet::new();
        for unit in &self.units {
            if !seen.insert(unit.id) {
                return Err(ConfigError::DuplicateUnit(unit.id));
            }
        }

        if self.single {
            return match self.units.as_slice() {
                [unit] => Ok(StoreContext::single(unit.build()?)),
                units => Err(ConfigError::SingleUnitCount(units.len())),
            };
        }

        self.units
            .iter()
            .try_fold(StoreContext::new(), |store, unit| {
                Ok(store.with_unit(unit.id, unit.build()?))
            })
    }
}

impl FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: ServerConfig = toml::from_str(s)?;
        config.check_identity()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{RegisterTable, UnitStore};

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ServerConfig = "".parse().unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.server.bind_address(), "127.0.0.1:502");
        assert_eq!(config.server.framer_kind(), FramerKind::Socket);

        let store = config.build_store().unwrap();
        assert_eq!(store.unit_ids(), vec![1]);
    }

    #[test]
    fn test_full_file() {
        let config: ServerConfig = r#"
            [server]
            mode = "serial"
            device = "/dev/ttyS1"
            baud_rate = 9600

            [identity]
            vendor_name = "Acme"

            [[units]]
            id = 1
            size = 4
            holding_registers = [10, 20]

            [[units]]
            id = 7
            start = 1000
            size = 2
            coils = [true]
        "#
        .parse()
        .unwrap();

        assert_eq!(config.server.mode, TransportMode::Serial);
        assert_eq!(config.server.baud_rate, 9600);
        assert_eq!(config.server.framer_kind(), FramerKind::Ascii);
        assert_eq!(
            config.identity.as_ref().map(|i| i.vendor_name.as_str()),
            Some("Acme")
        );

        let store = config.build_store().unwrap();
        assert_eq!(store.unit_ids(), vec![1, 7]);

        let unit = store.get(1).unwrap();
        assert_eq!(
            unit.read_registers(RegisterTable::HoldingRegisters, 0, 4)
                .unwrap(),
            vec![10, 20, 0, 0]
        );
        assert!(!unit
            .validate_registers(RegisterTable::HoldingRegisters, 0, 5)
            .unwrap());

        let unit = store.get(7).unwrap();
        assert!(unit
            .validate_registers(RegisterTable::InputRegisters, 1000, 2)
            .unwrap());
    }

    #[test]
    fn test_framer_override() {
        let config: ServerConfig = "[server]\nmode = \"serial\"\nframer = \"rtu\"\n"
            .parse()
            .unwrap();
        assert_eq!(config.server.framer_kind(), FramerKind::Rtu);
    }

    #[test]
    fn test_long_identity_object_is_rejected() {
        let text = format!("[identity]\nproduct_code = \"{}\"\n", "p".repeat(300));
        assert!(matches!(
            text.parse::<ServerConfig>(),
            Err(ConfigError::IdentityTooLong {
                object: 0x01,
                len: 300,
                max: MAX_OBJECT_LEN
            })
        ));

        let text = format!(
            "[identity]\nproduct_code = \"{}\"\n",
            "p".repeat(MAX_OBJECT_LEN)
        );
        assert!(text.parse::<ServerConfig>().is_ok());

        let config = ServerConfig {
            identity: Some(DeviceIdentity {
                vendor_name: "v".repeat(MAX_OBJECT_LEN + 1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            config.build_store(),
            Err(ConfigError::IdentityTooLong { object: 0x00, .. })
        ));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let result = "[server]\nmode = \"carrier-pigeon\"\n".parse::<ServerConfig>();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_duplicate_unit() {
        let config: ServerConfig = "[[units]]\nid = 3\n[[units]]\nid = 3\n".parse().unwrap();
        assert!(matches!(
            config.build_store(),
            Err(ConfigError::DuplicateUnit(3))
        ));
    }

    #[test]
    fn test_seed_larger_than_table() {
        let config: ServerConfig = "[[units]]\nid = 1\nsize = 1\ninput_registers = [1, 2]\n"
            .parse()
            .unwrap();
        assert!(matches!(
            config.build_store(),
            Err(ConfigError::TooManyValues {
                table: "input_registers",
                ..
            })
        ));
    }

    #[test]
    fn test_address_overflow() {
        let config: ServerConfig = "[[units]]\nid = 1\nstart = 65535\nsize = 2\n"
            .parse()
            .unwrap();
        assert!(matches!(
            config.build_store(),
            Err(ConfigError::AddressOverflow { .. })
        ));
    }

    #[test]
    fn test_single_mode() {
        let config: ServerConfig = "single = true\n[[units]]\nid = 1\nsize = 2\n"
            .parse()
            .unwrap();
        let store = config.build_store().unwrap();
        assert!(store.is_single());
        assert!(store.get(200).is_ok());

        let config: ServerConfig = "single = true\n[[units]]\nid = 1\n[[units]]\nid = 2\n"
            .parse()
            .unwrap();
        assert!(matches!(
            config.build_store(),
            Err(ConfigError::SingleUnitCount(2))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::load("/nonexistent/flashbus.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
