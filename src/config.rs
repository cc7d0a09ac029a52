//! Driver configuration
//!
//! Loaded from a TOML file or built in code. Every field has a default, so
//! an empty file is a valid configuration.
//!
//! ```toml
//! debug = false
//! mem_device = "/dev/mem"
//! soc = "bcm2711"
//! spi_timeout_ms = 250
//! strict_clock_divider = true
//! journal_capacity = 4096
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::memory::sim::DEFAULT_JOURNAL_CAPACITY;
use crate::memory::Soc;

/// Default memory device exposing the peripheral address space
pub const DEFAULT_MEM_DEVICE: &str = "/dev/mem";

/// Device-tree node describing the SoC bus ranges
pub const DEFAULT_DEVICE_TREE_RANGES: &str = "/proc/device-tree/soc/ranges";

/// Default bound on each SPI status poll
pub const DEFAULT_SPI_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run against the simulation model instead of mapping real memory
    pub debug: bool,
    /// Memory device opened by `init`
    pub mem_device: PathBuf,
    /// Device-tree ranges file used for revision detection
    pub device_tree_ranges: PathBuf,
    /// Force a SoC revision instead of detecting it
    pub soc: Option<Soc>,
    /// Upper bound for each wait on an SPI0 status flag
    pub spi_timeout_ms: u64,
    /// Reject clock dividers that are neither 0 nor a power of two
    pub strict_clock_divider: bool,
    /// Debug-mode access journal size; oldest entries are dropped, 0 disables it
    pub journal_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            mem_device: PathBuf::from(DEFAULT_MEM_DEVICE),
            device_tree_ranges: PathBuf::from(DEFAULT_DEVICE_TREE_RANGES),
            soc: None,
            spi_timeout_ms: DEFAULT_SPI_TIMEOUT_MS,
            strict_clock_divider: true,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl Config {
    /// Read a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config = toml::from_str(content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_soc(mut self, soc: Soc) -> Self {
        self.soc = Some(soc);
        self
    }

    pub fn with_mem_device(mut self, path: impl Into<PathBuf>) -> Self {
        self.mem_device = path.into();
        self
    }

    /// Set the SPI status-wait bound, rounded up to whole milliseconds
    pub fn with_spi_timeout(mut self, timeout: Duration) -> Self {
        let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
        self.spi_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_strict_clock_divider(mut self, strict: bool) -> Self {
        self.strict_clock_divider = strict;
        self
    }

    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    pub fn spi_timeout(&self) -> Duration {
        Duration::from_millis(self.spi_timeout_ms)
    }
}
