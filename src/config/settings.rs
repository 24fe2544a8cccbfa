//! Application settings

use crate::core::scheduler::MetaKeyMode;
use crate::core::transport::{SerialConfig, TcpConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Idle scheduler settings
    pub scheduler: SchedulerConfig,
    /// Communication pump settings
    pub comm: CommConfig,
    /// Capture settings
    pub capture: CaptureConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Keyboard settings
    pub keyboard: KeyboardConfig,
    /// Default connection settings
    pub connection: ConnectionConfig,
}

impl AppConfig {
    /// Path of the default config file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        super::config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the default file, or defaults when it does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from `path`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the default file
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::default_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.save_to(&config_path)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Idle scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Idle cycles to keep asking for re-invocation after the last activity
    pub busy_ceiling: u32,
    /// Pause after each TEK parse, in milliseconds
    pub tek_throttle_ms: u64,
    /// Pause after each VT parse, in milliseconds. Zero only yields.
    pub vt_yield_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            busy_ceiling: 2,
            tek_throttle_ms: 1,
            vt_yield_ms: 0,
        }
    }
}

/// Communication pump settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommConfig {
    /// Bytes the inbound buffer may hold
    pub inbound_capacity: usize,
    /// Most bytes per send attempt
    pub send_batch: usize,
    /// Most bytes per receive attempt
    pub receive_batch: usize,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 16 * 1024,
            send_batch: 4096,
            receive_batch: 4096,
        }
    }
}

/// Capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Text capture ring size in bytes
    pub text_buffer_size: usize,
    /// Binary capture ring size in bytes
    pub binary_buffer_size: usize,
    /// Write captured text to a file
    pub file_log: bool,
    /// Write raw received bytes to a file
    pub binary_log: bool,
    /// Forward captured text to the publish channel
    pub publish: bool,
    /// Directory for capture files; the data directory's `logs` when unset
    pub log_dir: Option<PathBuf>,
    /// Capture file name prefix
    pub log_prefix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            text_buffer_size: 64 * 1024,
            binary_buffer_size: 64 * 1024,
            file_log: false,
            binary_log: false,
            publish: false,
            log_dir: None,
            log_prefix: "session".to_string(),
        }
    }
}

impl CaptureConfig {
    /// Directory capture files go to
    pub fn resolved_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(super::log_dir)
    }
}

/// Transfer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes a talker queues per cycle
    pub unit_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { unit_size: 256 }
    }
}

/// Keyboard settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Which Alt keys act as Meta
    pub meta_key: MetaKeyMode,
}

/// Default connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Interpret Telnet commands on TCP sessions
    pub telnet: bool,
    /// Terminal type announced during Telnet negotiation
    pub terminal_type: String,
    /// TCP defaults
    pub tcp: TcpConfig,
    /// Serial defaults
    pub serial: SerialConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            telnet: false,
            terminal_type: "xterm".to_string(),
            tcp: TcpConfig::default(),
            serial: SerialConfig::default(),
        }
    }
}
