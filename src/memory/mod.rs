//! Memory-map manager
//!
//! Owns the mapped GPIO, SPI0 and PADS register blocks for one
//! [`Peripherals`] handle. A handle moves through
//! `Uninitialized -> Mapped -> Closed`; registers can only be touched while
//! it is `Mapped`, every other state answers with
//! [`Error::NotInitialized`].
//!
//! Each block sits behind its own mutex. Encoders hold the lock for the
//! whole of a read-modify-write or multi-step sequence, and `close` takes
//! every lock before unmapping, so it waits for in-flight operations.

#[cfg(unix)]
mod devmem;
pub mod sim;
pub mod soc;

pub use sim::{Access, Op, Simulator};
pub use soc::{PullControl, Soc};

use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::{CloseError, Error, InitError, Result};

/// Bytes mapped per register block
pub const BLOCK_SIZE: usize = 4096;

/// A peripheral register block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Gpio,
    Spi0,
    Pads,
}

impl Block {
    pub const ALL: [Block; 3] = [Block::Gpio, Block::Spi0, Block::Pads];

    /// Offset of the block from the peripheral base
    pub fn offset(&self) -> u64 {
        match self {
            Block::Gpio => 0x20_0000,
            Block::Spi0 => 0x20_4000,
            Block::Pads => 0x10_0000,
        }
    }

    pub fn physical_address(&self, soc: Soc) -> u64 {
        soc.peripheral_base() + self.offset()
    }

    fn index(&self) -> usize {
        match self {
            Block::Gpio => 0,
            Block::Spi0 => 1,
            Block::Pads => 2,
        }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Block::Gpio => write!(f, "GPIO"),
            Block::Spi0 => write!(f, "SPI0"),
            Block::Pads => write!(f, "PADS"),
        }
    }
}

/// Raw 32-bit access to one mapped block.
///
/// Offsets are byte offsets, already checked to be word aligned and inside
/// the block.
pub trait RegisterIo: Send {
    fn read(&mut self, offset: usize) -> u32;
    fn write(&mut self, offset: usize, value: u32);
    /// Unmap the block
    fn release(self: Box<Self>) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Mapped,
    Closed,
}

struct State {
    lifecycle: Lifecycle,
    soc: Option<Soc>,
    device: Option<File>,
    simulator: Option<Simulator>,
}

type Mapping = Option<Box<dyn RegisterIo>>;

/// Handle to the memory-mapped peripherals of one SoC
pub struct Peripherals {
    config: Config,
    state: Mutex<State>,
    blocks: [Mutex<Mapping>; 3],
    lsb_first: AtomicBool,
}

impl Peripherals {
    /// Create an unmapped handle. Nothing is opened until [`init`](Self::init).
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                lifecycle: Lifecycle::Uninitialized,
                soc: None,
                device: None,
                simulator: None,
            }),
            blocks: [Mutex::new(None), Mutex::new(None), Mutex::new(None)],
            lsb_first: AtomicBool::new(false),
        }
    }

    /// Handle backed by the simulation model
    pub fn simulated() -> Self {
        Self::new(Config::default().with_debug(true))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switch the debug/simulation bypass on or off.
    ///
    /// Only takes effect for the next `init`; ignored while mapped.
    pub fn set_debug(&mut self, enabled: bool) {
        let lifecycle = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .lifecycle;
        if lifecycle == Lifecycle::Mapped {
            log::warn!("set_debug({}) ignored: peripherals already mapped", enabled);
            return;
        }
        self.config.debug = enabled;
    }

    pub fn is_debug(&self) -> bool {
        self.config.debug
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock_state().lifecycle
    }

    /// SoC resolved by the last successful `init`
    pub fn soc(&self) -> Option<Soc> {
        self.lock_state().soc
    }

    /// Simulation model handle, present once a debug-mode `init` has run
    pub fn simulator(&self) -> Option<Simulator> {
        self.lock_state().simulator.clone()
    }

    /// Map the GPIO, SPI0 and PADS blocks.
    ///
    /// In debug mode no device is opened; the blocks are backed by a fresh
    /// [`Simulator`] and the SoC defaults to BCM2835 unless configured.
    pub fn init(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.lifecycle == Lifecycle::Mapped {
            return Err(InitError::AlreadyInitialized.into());
        }

        if self.config.debug {
            let soc = self.config.soc.unwrap_or(Soc::Bcm2835);
            let simulator = Simulator::with_journal_capacity(soc, self.config.journal_capacity);
            for block in Block::ALL {
                let mapping: Box<dyn RegisterIo> = Box::new(simulator.block(block));
                *self.lock_block(block) = Some(mapping);
            }
            log::info!("Debug mode: simulating {} peripherals, no memory device opened", soc);
            state.soc = Some(soc);
            state.simulator = Some(simulator);
        } else {
            let soc = self
                .config
                .soc
                .unwrap_or_else(|| Soc::detect(&self.config.device_tree_ranges));
            let (device, mappings) = map_blocks(&self.config, soc)?;
            for (block, mapping) in mappings {
                log::info!(
                    "Mapped {} block at {:#010x}",
                    block,
                    block.physical_address(soc)
                );
                *self.lock_block(block) = Some(mapping);
            }
            state.soc = Some(soc);
            state.device = Some(device);
            state.simulator = None;
        }

        self.set_lsb_first(false);
        state.lifecycle = Lifecycle::Mapped;
        Ok(())
    }

    /// Unmap every block and close the memory device.
    ///
    /// All blocks are released even if one fails; the first failure is
    /// returned. Closing a handle that is not mapped does nothing.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.lifecycle != Lifecycle::Mapped {
            return Ok(());
        }

        let mut first_error: Option<CloseError> = None;
        for block in Block::ALL {
            let mapping = self.lock_block(block).take();
            if let Some(mapping) = mapping {
                if let Err(source) = mapping.release() {
                    log::error!("Failed to unmap {} block: {}", block, source);
                    first_error.get_or_insert(CloseError::Unmap { block, source });
                }
            }
        }
        state.device = None;
        self.set_lsb_first(false);
        state.lifecycle = Lifecycle::Closed;
        log::info!("Peripherals closed");

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Read a raw register
    pub fn read_register(&self, block: Block, offset: usize) -> Result<u32> {
        check_offset(block, offset)?;
        self.with_block(block, |io| io.read(offset))
    }

    /// Write a raw register
    pub fn write_register(&self, block: Block, offset: usize, value: u32) -> Result<()> {
        check_offset(block, offset)?;
        self.with_block(block, |io| io.write(offset, value))
    }

    /// Run `f` with exclusive access to a mapped block
    pub(crate) fn with_block<T>(
        &self,
        block: Block,
        f: impl FnOnce(&mut dyn RegisterIo) -> T,
    ) -> Result<T> {
        let mut guard = self.lock_block(block);
        let io = guard.as_deref_mut().ok_or(Error::NotInitialized)?;
        Ok(f(io))
    }

    pub(crate) fn lsb_first(&self) -> bool {
        self.lsb_first.load(Ordering::Relaxed)
    }

    pub(crate) fn set_lsb_first(&self, lsb_first: bool) {
        self.lsb_first.store(lsb_first, Ordering::Relaxed);
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Register contents live in hardware, so a panic mid-sequence leaves
    // nothing in the guard worth discarding.
    fn lock_block(&self, block: Block) -> MutexGuard<'_, Mapping> {
        self.blocks[block.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Peripherals {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Error closing peripherals on drop: {}", e);
        }
    }
}

fn check_offset(block: Block, offset: usize) -> Result<()> {
    if offset % 4 != 0 || offset >= BLOCK_SIZE {
        return Err(Error::InvalidOffset { block, offset });
    }
    Ok(())
}

#[cfg(unix)]
fn map_blocks(
    config: &Config,
    soc: Soc,
) -> std::result::Result<(File, Vec<(Block, Box<dyn RegisterIo>)>), InitError> {
    let device = devmem::open(&config.mem_device)?;
    let mut mappings: Vec<(Block, Box<dyn RegisterIo>)> = Vec::new();
    for block in Block::ALL {
        match devmem::map(&device, block, block.physical_address(soc)) {
            Ok(mapping) => {
                let mapping: Box<dyn RegisterIo> = Box::new(mapping);
                mappings.push((block, mapping));
            }
            Err(err) => {
                for (mapped, mapping) in mappings {
                    if let Err(e) = mapping.release() {
                        log::warn!("Failed to unmap {} block after init error: {}", mapped, e);
                    }
                }
                return Err(err);
            }
        }
    }
    Ok((device, mappings))
}

#[cfg(not(unix))]
fn map_blocks(
    config: &Config,
    _soc: Soc,
) -> std::result::Result<(File, Vec<(Block, Box<dyn RegisterIo>)>), InitError> {
    Err(InitError::Open {
        path: config.mem_device.clone(),
        source: io::Error::new(io::ErrorKind::Unsupported, "memory mapping requires unix"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::gpio;

    #[test]
    fn test_block_addresses() {
        assert_eq!(Block::Gpio.physical_address(Soc::Bcm2835), 0x2020_0000);
        assert_eq!(Block::Spi0.physical_address(Soc::Bcm2836), 0x3F20_4000);
        assert_eq!(Block::Pads.physical_address(Soc::Bcm2711), 0xFE10_0000);
    }

    #[test]
    fn test_access_before_init() {
        let periph = Peripherals::simulated();
        assert_eq!(periph.lifecycle(), Lifecycle::Uninitialized);
        let err = periph.read_register(Block::Gpio, gpio::GPLEV0).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn test_init_close_lifecycle() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        assert_eq!(periph.lifecycle(), Lifecycle::Mapped);
        assert_eq!(periph.soc(), Some(Soc::Bcm2835));

        periph.write_register(Block::Gpio, gpio::GPFSEL0, 0x8).unwrap();
        assert_eq!(periph.read_register(Block::Gpio, gpio::GPFSEL0).unwrap(), 0x8);

        periph.close().unwrap();
        assert_eq!(periph.lifecycle(), Lifecycle::Closed);
        let err = periph.write_register(Block::Gpio, gpio::GPFSEL0, 0).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn test_double_init_rejected() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        let err = periph.init().unwrap_err();
        assert!(matches!(err, Error::Init(InitError::AlreadyInitialized)));
    }

    #[test]
    fn test_reinit_after_close_starts_fresh() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        periph.write_register(Block::Pads, 0x2C, 0x1B).unwrap();
        periph.close().unwrap();
        periph.init().unwrap();
        assert_eq!(periph.read_register(Block::Pads, 0x2C).unwrap(), 0);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let periph = Peripherals::simulated();
        periph.close().unwrap();
        periph.init().unwrap();
        periph.close().unwrap();
        periph.close().unwrap();
    }

    #[test]
    fn test_invalid_offset() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        assert!(matches!(
            periph.read_register(Block::Spi0, 0x02),
            Err(Error::InvalidOffset { offset: 0x02, .. })
        ));
        assert!(matches!(
            periph.write_register(Block::Spi0, BLOCK_SIZE, 0),
            Err(Error::InvalidOffset { .. })
        ));
    }

    #[test]
    fn test_set_debug_ignored_once_mapped() {
        let mut periph = Peripherals::simulated();
        periph.init().unwrap();
        periph.set_debug(false);
        assert!(periph.is_debug());
        periph.close().unwrap();
        periph.set_debug(false);
        assert!(!periph.is_debug());
    }

    #[test]
    fn test_open_failure_reports_path() {
        let config = Config::default()
            .with_soc(Soc::Bcm2835)
            .with_mem_device("/nonexistent/mem");
        let periph = Peripherals::new(config);
        let err = periph.init().unwrap_err();
        match err {
            Error::Init(InitError::Open { path, .. }) => {
                assert_eq!(path, std::path::PathBuf::from("/nonexistent/mem"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(periph.lifecycle(), Lifecycle::Uninitialized);
        assert!(matches!(
            periph.read_register(Block::Gpio, 0),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn test_debug_mode_respects_configured_soc() {
        let periph = Peripherals::new(Config::default().with_debug(true).with_soc(Soc::Bcm2711));
        periph.init().unwrap();
        assert_eq!(periph.soc(), Some(Soc::Bcm2711));
        assert!(periph.simulator().is_some());
    }

    struct FailingRelease;

    impl RegisterIo for FailingRelease {
        fn read(&mut self, _offset: usize) -> u32 {
            0
        }

        fn write(&mut self, _offset: usize, _value: u32) {}

        fn release(self: Box<Self>) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "munmap failed"))
        }
    }

    #[test]
    fn test_close_releases_every_block_on_failure() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        let failing: Box<dyn RegisterIo> = Box::new(FailingRelease);
        *periph.lock_block(Block::Gpio) = Some(failing);

        let err = periph.close().unwrap_err();
        assert!(matches!(
            err,
            Error::Close(CloseError::Unmap { block: Block::Gpio, .. })
        ));
        for block in Block::ALL {
            assert!(periph.lock_block(block).is_none(), "{} still mapped", block);
        }
        assert_eq!(periph.lifecycle(), Lifecycle::Closed);
        assert!(matches!(
            periph.read_register(Block::Spi0, 0),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn test_first_release_error_wins() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        for block in [Block::Spi0, Block::Pads] {
            let failing: Box<dyn RegisterIo> = Box::new(FailingRelease);
            *periph.lock_block(block) = Some(failing);
        }
        let err = periph.close().unwrap_err();
        assert!(matches!(
            err,
            Error::Close(CloseError::Unmap { block: Block::Spi0, .. })
        ));
    }

    #[test]
    fn test_bit_order_resets_with_lifecycle() {
        let periph = Peripherals::simulated();
        periph.init().unwrap();
        periph.set_lsb_first(true);
        periph.close().unwrap();
        assert!(!periph.lsb_first());

        periph.set_lsb_first(true);
        periph.init().unwrap();
        assert!(!periph.lsb_first());
    }

    #[test]
    fn test_journal_capacity_from_config() {
        let periph = Peripherals::new(Config::default().with_debug(true).with_journal_capacity(8));
        periph.init().unwrap();
        for _ in 0..1_000 {
            periph.read_register(Block::Gpio, gpio::GPLEV0).unwrap();
        }
        assert_eq!(periph.simulator().unwrap().journal().len(), 8);
    }
}
