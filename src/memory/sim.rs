//! Simulation model used in debug mode
//!
//! Registers start at zero and hold whatever is written, except where the
//! hardware has action semantics:
//!
//! - GPSETn / GPCLRn drive an output latch and read back as 0
//! - GPLEVn reads the latch for pins selected as outputs and the driven
//!   input level for everything else
//! - GPEDSn is write-1-to-clear; driving an input latches events for armed
//!   detectors, and high/low detectors keep latching while the level holds
//! - SPI0 CS always reports TXD, reports DONE once a byte has shifted and
//!   RXD while received bytes are queued; CLEAR bits empty the FIFO and
//!   never stick
//! - SPI0 FIFO writes with TA set queue one received byte: the written
//!   byte in loopback mode, 0x00 otherwise
//!
//! Every access is appended to a bounded journal (oldest entries are
//! dropped first) and every write is logged.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Block, RegisterIo, Soc};
use crate::field::{ONE_BIT, THREE_BIT};
use crate::regs::{cs_bits, gpio, spi};

/// Journal entries kept unless configured otherwise
pub const DEFAULT_JOURNAL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

/// One register access seen by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub block: Block,
    pub offset: usize,
    pub op: Op,
    pub value: u32,
}

struct SimState {
    soc: Soc,
    registers: HashMap<(Block, usize), u32>,
    output_latch: u64,
    inputs: u64,
    spi_rx: VecDeque<u8>,
    spi_done: bool,
    spi_loopback: bool,
    spi_stalled: bool,
    journal: VecDeque<Access>,
    journal_capacity: usize,
}

/// Shared handle to the synthetic register state
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Simulator {
    pub fn new(soc: Soc) -> Self {
        Self::with_journal_capacity(soc, DEFAULT_JOURNAL_CAPACITY)
    }

    /// Simulator keeping at most `capacity` journal entries; 0 disables
    /// the journal
    pub fn with_journal_capacity(soc: Soc, capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                soc,
                registers: HashMap::new(),
                output_latch: 0,
                inputs: 0,
                spi_rx: VecDeque::new(),
                spi_done: false,
                spi_loopback: false,
                spi_stalled: false,
                journal: VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY)),
                journal_capacity: capacity,
            })),
        }
    }

    pub fn soc(&self) -> Soc {
        self.lock().soc
    }

    pub(super) fn block(&self, block: Block) -> SimBlock {
        SimBlock {
            block,
            sim: self.clone(),
        }
    }

    /// Preload a stored register value without journaling it
    pub fn seed(&self, block: Block, offset: usize, value: u32) {
        self.lock().registers.insert((block, offset), value);
    }

    /// Stored value of a register, bypassing the action semantics
    pub fn register(&self, block: Block, offset: usize) -> u32 {
        self.lock().stored(block, offset)
    }

    /// Drive the external level of a pin, latching events for armed detectors
    pub fn drive_input(&self, pin: u8, high: bool) {
        self.lock().drive_input(pin, high);
    }

    /// Tie MOSI to MISO
    pub fn set_spi_loopback(&self, enabled: bool) {
        self.lock().spi_loopback = enabled;
    }

    /// Hold SPI0 busy: queued bytes never shift and DONE stays clear
    pub fn set_spi_stalled(&self, stalled: bool) {
        self.lock().spi_stalled = stalled;
    }

    /// Retained accesses, oldest first
    pub fn journal(&self) -> Vec<Access> {
        self.lock().journal.iter().copied().collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Values written to one register, oldest first
    pub fn writes_to(&self, block: Block, offset: usize) -> Vec<u32> {
        self.lock()
            .journal
            .iter()
            .filter(|a| a.op == Op::Write && a.block == block && a.offset == offset)
            .map(|a| a.value)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SimState {
    fn stored(&self, block: Block, offset: usize) -> u32 {
        self.registers.get(&(block, offset)).copied().unwrap_or(0)
    }

    fn store(&mut self, block: Block, offset: usize, value: u32) {
        self.registers.insert((block, offset), value);
    }

    fn record(&mut self, access: Access) {
        if self.journal_capacity == 0 {
            return;
        }
        while self.journal.len() >= self.journal_capacity {
            self.journal.pop_front();
        }
        self.journal.push_back(access);
    }

    fn is_output(&self, pin: u8) -> bool {
        let field = THREE_BIT.locate(pin);
        field.extract(self.stored(Block::Gpio, field.offset(gpio::GPFSEL0))) == 0b001
    }

    fn pin_enabled(&self, first: usize, pin: u8) -> bool {
        let field = ONE_BIT.locate(pin);
        field.extract(self.stored(Block::Gpio, field.offset(first))) != 0
    }

    fn latch_event(&mut self, pin: u8) {
        let field = ONE_BIT.locate(pin);
        let offset = field.offset(gpio::GPEDS0);
        let value = self.stored(Block::Gpio, offset) | field.mask();
        self.store(Block::Gpio, offset, value);
    }

    fn drive_input(&mut self, pin: u8, high: bool) {
        if pin > gpio::MAX_PIN {
            return;
        }
        let bit = 1u64 << pin;
        let was_high = self.inputs & bit != 0;
        if high {
            self.inputs |= bit;
        } else {
            self.inputs &= !bit;
        }

        let rising = !was_high && high;
        let falling = was_high && !high;
        let latched = (rising
            && (self.pin_enabled(gpio::GPREN0, pin) || self.pin_enabled(gpio::GPAREN0, pin)))
            || (falling
                && (self.pin_enabled(gpio::GPFEN0, pin) || self.pin_enabled(gpio::GPAFEN0, pin)))
            || (high && self.pin_enabled(gpio::GPHEN0, pin))
            || (!high && self.pin_enabled(gpio::GPLEN0, pin));
        if latched {
            self.latch_event(pin);
        }
    }

    /// Latch events for every pin whose armed high/low detector matches
    /// its current level
    fn latch_held_levels(&mut self) {
        for bank in 0..2usize {
            let level = self.level_register(bank);
            let high = self.stored(Block::Gpio, gpio::GPHEN0 + bank * 4) & level;
            let low = self.stored(Block::Gpio, gpio::GPLEN0 + bank * 4) & !level;
            let valid = if bank == 0 { u32::MAX } else { (1 << (gpio::MAX_PIN - 31)) - 1 };
            let latched = (high | low) & valid;
            if latched != 0 {
                let offset = gpio::GPEDS0 + bank * 4;
                let current = self.stored(Block::Gpio, offset);
                self.store(Block::Gpio, offset, current | latched);
            }
        }
    }

    fn level_register(&self, bank: usize) -> u32 {
        let mut value = 0;
        for bit in 0..32u8 {
            let pin = bank as u8 * 32 + bit;
            if pin > gpio::MAX_PIN {
                break;
            }
            let source = if self.is_output(pin) {
                self.output_latch
            } else {
                self.inputs
            };
            if source & (1u64 << pin) != 0 {
                value |= 1 << bit;
            }
        }
        value
    }

    fn read(&mut self, block: Block, offset: usize) -> u32 {
        let value = match (block, offset) {
            (Block::Gpio, o) if bank_of(o, gpio::GPLEV0).is_some() => {
                self.level_register((o - gpio::GPLEV0) / 4)
            }
            (Block::Gpio, o)
                if bank_of(o, gpio::GPSET0).is_some() || bank_of(o, gpio::GPCLR0).is_some() =>
            {
                0
            }
            (Block::Spi0, spi::CS) => {
                let mut cs = self.stored(block, offset) | cs_bits::TXD;
                if self.spi_done {
                    cs |= cs_bits::DONE;
                }
                if !self.spi_rx.is_empty() {
                    cs |= cs_bits::RXD;
                }
                cs
            }
            (Block::Spi0, spi::FIFO) => self.spi_rx.pop_front().map(u32::from).unwrap_or(0),
            _ => self.stored(block, offset),
        };
        self.record(Access {
            block,
            offset,
            op: Op::Read,
            value,
        });
        value
    }

    fn write(&mut self, block: Block, offset: usize, value: u32) {
        log::debug!("sim {} +{:#04x} <- {:#010x}", block, offset, value);
        self.record(Access {
            block,
            offset,
            op: Op::Write,
            value,
        });

        match (block, offset) {
            (Block::Gpio, o) if bank_of(o, gpio::GPSET0).is_some() => {
                let bank = (o - gpio::GPSET0) / 4;
                self.output_latch |= (value as u64) << (bank * 32);
                self.latch_held_levels();
            }
            (Block::Gpio, o) if bank_of(o, gpio::GPCLR0).is_some() => {
                let bank = (o - gpio::GPCLR0) / 4;
                self.output_latch &= !((value as u64) << (bank * 32));
                self.latch_held_levels();
            }
            (Block::Gpio, o) if bank_of(o, gpio::GPLEV0).is_some() => {}
            (Block::Gpio, o) if bank_of(o, gpio::GPEDS0).is_some() => {
                let current = self.stored(block, o);
                self.store(block, o, current & !value);
                self.latch_held_levels();
            }
            (Block::Gpio, o)
                if bank_of(o, gpio::GPHEN0).is_some() || bank_of(o, gpio::GPLEN0).is_some() =>
            {
                self.store(block, o, value);
                self.latch_held_levels();
            }
            (Block::Spi0, spi::CS) => {
                if value & cs_bits::CLEAR_RX != 0 {
                    self.spi_rx.clear();
                }
                if value & cs_bits::TA == 0 {
                    self.spi_done = false;
                }
                self.store(block, offset, value & !(cs_bits::CLEAR | cs_bits::STATUS_MASK));
            }
            (Block::Spi0, spi::FIFO) => {
                if self.stored(block, spi::CS) & cs_bits::TA == 0 {
                    log::debug!("sim SPI0 FIFO write with TA clear dropped");
                    return;
                }
                if self.spi_stalled {
                    return;
                }
                let received = if self.spi_loopback { value as u8 } else { 0 };
                self.spi_rx.push_back(received);
                self.spi_done = true;
            }
            _ => self.store(block, offset, value),
        }
    }
}

/// Index of the two-register pin bank that `offset` falls in
fn bank_of(offset: usize, first: usize) -> Option<usize> {
    if offset == first || offset == first + 4 {
        Some((offset - first) / 4)
    } else {
        None
    }
}

/// One block's view of the simulator
pub struct SimBlock {
    block: Block,
    sim: Simulator,
}

impl RegisterIo for SimBlock {
    fn read(&mut self, offset: usize) -> u32 {
        self.sim.lock().read(self.block, offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.sim.lock().write(self.block, offset, value);
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        log::debug!("sim {} block released", self.block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_start_at_zero() {
        let sim = Simulator::new(Soc::Bcm2835);
        let mut block = sim.block(Block::Pads);
        assert_eq!(block.read(0x2C), 0);
        block.write(0x2C, 0x5A00_001B);
        assert_eq!(block.read(0x2C), 0x5A00_001B);
    }

    #[test]
    fn test_seed_is_not_journaled() {
        let sim = Simulator::new(Soc::Bcm2835);
        sim.seed(Block::Gpio, gpio::GPPUD, 2);
        assert!(sim.journal().is_empty());
        assert_eq!(sim.register(Block::Gpio, gpio::GPPUD), 2);
    }

    #[test]
    fn test_output_latch_only_shows_on_outputs() {
        let sim = Simulator::new(Soc::Bcm2835);
        let mut gpio_block = sim.block(Block::Gpio);
        gpio_block.write(gpio::GPSET0, 1 << 4);
        assert_eq!(gpio_block.read(gpio::GPLEV0) & (1 << 4), 0);

        // GPIO4 as output
        gpio_block.write(gpio::GPFSEL0, 0b001 << 12);
        assert_eq!(gpio_block.read(gpio::GPLEV0) & (1 << 4), 1 << 4);

        gpio_block.write(gpio::GPCLR0, 1 << 4);
        assert_eq!(gpio_block.read(gpio::GPLEV0) & (1 << 4), 0);
    }

    #[test]
    fn test_high_bank_levels() {
        let sim = Simulator::new(Soc::Bcm2835);
        sim.drive_input(40, true);
        let mut gpio_block = sim.block(Block::Gpio);
        assert_eq!(gpio_block.read(gpio::GPLEV0 + 4), 1 << 8);
        assert_eq!(gpio_block.read(gpio::GPLEV0), 0);
    }

    #[test]
    fn test_event_latch_and_clear() {
        let sim = Simulator::new(Soc::Bcm2835);
        let mut gpio_block = sim.block(Block::Gpio);
        gpio_block.write(gpio::GPFEN0, 1 << 17);

        sim.drive_input(17, true);
        assert_eq!(gpio_block.read(gpio::GPEDS0), 0);
        sim.drive_input(17, false);
        assert_eq!(gpio_block.read(gpio::GPEDS0), 1 << 17);

        gpio_block.write(gpio::GPEDS0, 1 << 17);
        assert_eq!(gpio_block.read(gpio::GPEDS0), 0);
    }

    #[test]
    fn test_spi_fifo_requires_ta() {
        let sim = Simulator::new(Soc::Bcm2835);
        sim.set_spi_loopback(true);
        let mut spi_block = sim.block(Block::Spi0);

        spi_block.write(spi::FIFO, 0x55);
        assert_eq!(spi_block.read(spi::CS) & cs_bits::RXD, 0);

        spi_block.write(spi::CS, cs_bits::TA);
        spi_block.write(spi::FIFO, 0x55);
        let cs = spi_block.read(spi::CS);
        assert_ne!(cs & cs_bits::DONE, 0);
        assert_ne!(cs & cs_bits::RXD, 0);
        assert_eq!(spi_block.read(spi::FIFO), 0x55);
    }

    #[test]
    fn test_spi_clear_bits_do_not_stick() {
        let sim = Simulator::new(Soc::Bcm2835);
        let mut spi_block = sim.block(Block::Spi0);
        spi_block.write(spi::CS, cs_bits::CLEAR | cs_bits::CPOL);
        assert_eq!(sim.register(Block::Spi0, spi::CS), cs_bits::CPOL);
    }

    #[test]
    fn test_journal_is_bounded() {
        let sim = Simulator::with_journal_capacity(Soc::Bcm2835, 16);
        let mut gpio_block = sim.block(Block::Gpio);
        for _ in 0..10_000 {
            gpio_block.read(gpio::GPLEV0);
        }
        gpio_block.write(gpio::GPSET0, 1);
        let journal = sim.journal();
        assert_eq!(journal.len(), 16);
        assert_eq!(journal.last().map(|a| a.op), Some(Op::Write));
    }

    #[test]
    fn test_zero_capacity_disables_journal() {
        let sim = Simulator::with_journal_capacity(Soc::Bcm2835, 0);
        let mut gpio_block = sim.block(Block::Gpio);
        gpio_block.write(gpio::GPSET0, 1);
        assert!(sim.journal().is_empty());
        assert!(sim.writes_to(Block::Gpio, gpio::GPSET0).is_empty());
    }

    #[test]
    fn test_held_level_relatches_after_clear() {
        let sim = Simulator::new(Soc::Bcm2835);
        let mut gpio_block = sim.block(Block::Gpio);
        sim.drive_input(5, true);

        // arming while the level already holds latches at once
        gpio_block.write(gpio::GPHEN0, 1 << 5);
        assert_eq!(gpio_block.read(gpio::GPEDS0), 1 << 5);

        gpio_block.write(gpio::GPEDS0, 1 << 5);
        assert_eq!(gpio_block.read(gpio::GPEDS0), 1 << 5);

        sim.drive_input(5, false);
        gpio_block.write(gpio::GPEDS0, 1 << 5);
        assert_eq!(gpio_block.read(gpio::GPEDS0), 0);
    }

    #[test]
    fn test_low_detect_on_output_follows_latch() {
        let sim = Simulator::new(Soc::Bcm2835);
        let mut gpio_block = sim.block(Block::Gpio);
        // GPIO 33 as output, driven high, low detect armed
        gpio_block.write(gpio::GPFSEL0 + 12, 0b001 << 9);
        gpio_block.write(gpio::GPSET0 + 4, 1 << 1);
        gpio_block.write(gpio::GPLEN0 + 4, 1 << 1);
        assert_eq!(gpio_block.read(gpio::GPEDS0 + 4), 0);

        gpio_block.write(gpio::GPCLR0 + 4, 1 << 1);
        assert_eq!(gpio_block.read(gpio::GPEDS0 + 4), 1 << 1);
    }
}
