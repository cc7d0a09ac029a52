//! Error types for peripheral access
//!
//! Initialization and teardown failures carry the OS error that caused
//! them. Everything else is a caller error or a hardware timeout.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::memory::Block;

/// Failure while bringing the register blocks up
#[derive(Debug, Error)]
pub enum InitError {
    /// The memory device could not be opened (usually: not running as root)
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `mmap` of a register block failed
    #[error("failed to map {block} block at {address:#010x}: {source}")]
    Map {
        block: Block,
        address: u64,
        #[source]
        source: io::Error,
    },

    /// `init` was called on a handle that is still mapped
    #[error("peripherals are already mapped; close them first")]
    AlreadyInitialized,
}

/// Failure while releasing the register blocks
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("failed to unmap {block} block: {source}")]
    Unmap {
        block: Block,
        #[source]
        source: io::Error,
    },
}

/// Failure while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Close(#[from] CloseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A register was touched before `init` or after `close`
    #[error("peripherals are not mapped; call init() first")]
    NotInitialized,

    #[error("invalid pin {0}: GPIO numbers run from 0 to 53")]
    InvalidPin(u8),

    #[error("register offset {offset:#x} is not a word inside the {block} block")]
    InvalidOffset { block: Block, offset: usize },

    #[error("invalid SPI clock divider {0}: must be 0 or a power of two")]
    InvalidClockDivider(u16),

    #[error("buffer length mismatch: tx {tx} bytes, rx {rx} bytes")]
    LengthMismatch { tx: usize, rx: usize },

    /// SPI0 never reported the expected status flag
    #[error("SPI transfer timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
