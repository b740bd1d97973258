//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::protocol::fragment::{SeedPolicy, DEFAULT_MTU, HEADER_SIZE, MAX_MTU};

/// Baud rates the radio's serial interface supports
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub radio: RadioConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub reassembly: ReassemblyConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Network role of the local radio
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RadioRole {
    #[default]
    Coordinator,
    EndDevice,
}

/// Radio and serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_radio_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Node identifier the gateway announces
    #[serde(default = "default_identifier")]
    pub identifier: String,

    /// Hex bytes separated by spaces or commas, e.g. "AB CD"
    #[serde(default)]
    pub pan_id: String,

    #[serde(default)]
    pub role: RadioRole,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 0 keeps the radio's own setting
    #[serde(default)]
    pub max_unicast_hops: u8,

    #[serde(default = "default_mtu")]
    pub mtu: usize,
}

/// Receive loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,

    #[serde(default = "default_node_cache_capacity")]
    pub node_cache_capacity: usize,

    #[serde(default = "default_join_timeout_s")]
    pub join_timeout_s: u64,
}

/// Fragment reassembly configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReassemblyConfig {
    #[serde(default)]
    pub seed_policy: SeedPolicy,
}

/// Persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_radio_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_identifier() -> String { "gateway".to_string() }
fn default_timeout_ms() -> u64 { 750 }
fn default_mtu() -> usize { DEFAULT_MTU }

fn default_poll_interval_us() -> u64 { 500 }
fn default_node_cache_capacity() -> usize { 32 }
fn default_join_timeout_s() -> u64 { 60 }

fn default_log_dir() -> String { "./data".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: default_radio_port(),
            baud_rate: default_baud_rate(),
            identifier: default_identifier(),
            pan_id: String::new(),
            role: RadioRole::default(),
            timeout_ms: default_timeout_ms(),
            max_unicast_hops: 0,
            mtu: default_mtu(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: default_poll_interval_us(),
            node_cache_capacity: default_node_cache_capacity(),
            join_timeout_s: default_join_timeout_s(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl RadioConfig {
    /// Response timeout for radio commands and receive polling
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// PAN ID as the 8 bytes written to the radio
    ///
    /// # Errors
    ///
    /// Returns error if `pan_id` is not a list of at most 8 hex bytes
    pub fn pan_id_bytes(&self) -> Result<[u8; 8]> {
        parse_pan_id(&self.pan_id)
    }
}

impl GatewayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_s)
    }
}

fn invalid(message: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(message))
}

/// Parse a PAN ID written as hex bytes separated by spaces or commas
///
/// Bytes are right-aligned into the 8-byte identifier; an empty string means
/// all zeros (join any network).
///
/// # Examples
///
/// ```
/// use equine_telemetry::config::parse_pan_id;
///
/// let pan = parse_pan_id("AB CD").unwrap();
/// assert_eq!(pan, [0, 0, 0, 0, 0, 0, 0xAB, 0xCD]);
/// ```
pub fn parse_pan_id(text: &str) -> Result<[u8; 8]> {
    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() > 8 {
        return Err(invalid(format!(
            "pan_id has {} bytes, at most 8 allowed",
            tokens.len()
        )));
    }

    let mut pan = [0u8; 8];
    let offset = 8 - tokens.len();
    for (i, token) in tokens.iter().enumerate() {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        pan[offset + i] = u8::from_str_radix(digits, 16)
            .map_err(|_| invalid(format!("pan_id byte '{}' is not a hex byte", token)))?;
    }

    Ok(pan)
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use equine_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.radio.port.is_empty() {
            return Err(invalid("radio port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.radio.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        // Node identifier is sent as an AT parameter and must fit the radio's NI field
        if self.radio.identifier.is_empty() || self.radio.identifier.len() > 20 {
            return Err(invalid("identifier must be 1 to 20 characters"));
        }

        self.radio.pan_id_bytes()?;

        if self.radio.timeout_ms == 0 || self.radio.timeout_ms > 60000 {
            return Err(invalid("timeout_ms must be between 1 and 60000"));
        }

        if self.radio.mtu <= HEADER_SIZE || self.radio.mtu > MAX_MTU {
            return Err(invalid(format!(
                "mtu must be between {} and {}",
                HEADER_SIZE + 1,
                MAX_MTU
            )));
        }

        if self.gateway.poll_interval_us == 0 {
            return Err(invalid("poll_interval_us must be greater than 0"));
        }

        if self.gateway.node_cache_capacity == 0 {
            return Err(invalid("node_cache_capacity must be greater than 0"));
        }

        if self.gateway.join_timeout_s == 0 {
            return Err(invalid("join_timeout_s must be greater than 0"));
        }

        if self.storage.log_dir.is_empty() {
            return Err(invalid("storage log_dir cannot be empty"));
        }

        if self.storage.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.storage.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }
}
