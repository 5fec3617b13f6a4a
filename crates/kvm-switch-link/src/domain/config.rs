//! TOML-backed configuration for the integration.
//!
//! [`IntegrationConfig`] is the single source of truth for all runtime
//! settings.  The host platform typically populates it from its own
//! configuration storage; `load`/`from_toml_str` exist for tests and
//! for hosts that hand over a plain TOML file.
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "some_fn")]`, so a config
//! file only needs to state what differs from the defaults.  An empty
//! file yields a fully usable configuration for a 4-output, 4-input
//! switch listening on port 5000.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kvm_switch_core::{DomainError, ProtocolOptions, SwitchEndpoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configured topology is invalid (e.g. zero outputs).
    #[error("invalid switch topology: {0}")]
    Invalid(#[from] DomainError),

    /// The topology cannot be addressed within the protocol's one-byte
    /// command code space.
    #[error("code space cannot address {output_count} outputs at bank stride {bank_stride}")]
    CodeSpace { output_count: u8, bank_stride: u8 },
}

/// All runtime configuration for one switch integration instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationConfig {
    /// Hostname or IP address of the switch.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP control port of the switch.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of output ports exposed as selector entities.
    #[serde(default = "default_output_count")]
    pub output_count: u8,
    /// Number of selectable input sources per output.
    #[serde(default = "default_input_count")]
    pub input_count: u8,
    /// Bound on establishing the TCP connection, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Bound on one command/response round trip, in seconds.
    #[serde(default = "default_exchange_timeout_secs")]
    pub exchange_timeout_secs: u64,
    /// Consecutive transport failures before a port is reported
    /// unavailable and its selection drops back to unknown.
    #[serde(default = "default_unavailable_after")]
    pub unavailable_after: u32,
    /// Interval of the periodic refresh sweep, in seconds.  `0`
    /// disables the sweep (the host then drives `refresh` itself).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Firmware-specific wire protocol knobs.
    #[serde(default)]
    pub protocol: ProtocolOptions,
}

fn default_host() -> String {
    "10.0.0.10".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_output_count() -> u8 {
    4
}
fn default_input_count() -> u8 {
    4
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_exchange_timeout_secs() -> u64 {
    3
}
fn default_unavailable_after() -> u32 {
    3
}
fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            output_count: default_output_count(),
            input_count: default_input_count(),
            connect_timeout_secs: default_connect_timeout_secs(),
            exchange_timeout_secs: default_exchange_timeout_secs(),
            unavailable_after: default_unavailable_after(),
            poll_interval_secs: default_poll_interval_secs(),
            protocol: ProtocolOptions::default(),
        }
    }
}

impl IntegrationConfig {
    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the validated [`SwitchEndpoint`] this config describes.
    ///
    /// Beyond the basic topology checks, the output count must fit the
    /// one-byte routing code space: with the last output's bank ending
    /// past code 255, commands for the high outputs could not be
    /// encoded.  A zero bank stride would collapse every output onto
    /// the first one's bank and is rejected for the same reason.
    pub fn endpoint(&self) -> Result<SwitchEndpoint, ConfigError> {
        let stride = self.protocol.bank_stride;
        let span = u16::from(self.output_count) * u16::from(stride);
        if stride == 0 || span > 256 {
            return Err(ConfigError::CodeSpace {
                output_count: self.output_count,
                bank_stride: stride,
            });
        }
        Ok(SwitchEndpoint::new(
            self.host.clone(),
            self.port,
            self.output_count,
            self.input_count,
        )?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
