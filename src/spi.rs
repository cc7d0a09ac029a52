//! SPI0 register encoder
//!
//! SPI0 is driven entirely through its CS (control/status), FIFO and CLK
//! registers. There is no software session object: mode, chip select and
//! polarities live in CS until changed or the peripheral is reset by
//! [`Spi::begin`]. Bit order is the one exception, since the controller
//! only shifts MSB first; LSB-first is done by reversing bytes here.
//!
//! | Function | BCM GPIO | J8 pin |
//! |----------|----------|--------|
//! | CE1      | GPIO 7   | 26     |
//! | CE0      | GPIO 8   | 24     |
//! | MISO     | GPIO 9   | 21     |
//! | MOSI     | GPIO 10  | 19     |
//! | SCLK     | GPIO 11  | 23     |

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::gpio::Function;
use crate::memory::{Block, Peripherals, RegisterIo};
use crate::regs::{cs_bits, spi as regs};

/// GPIO lines owned by SPI0 while it is active (ALT0)
pub const SPI0_PINS: [u8; 5] = [7, 8, 9, 10, 11];

/// Named CLK values. SCLK = core clock / divider; 0 means 65536.
pub mod clock_divider {
    pub const DIV_65536: u16 = 0;
    pub const DIV_32768: u16 = 32768;
    pub const DIV_16384: u16 = 16384;
    pub const DIV_8192: u16 = 8192;
    pub const DIV_4096: u16 = 4096;
    pub const DIV_2048: u16 = 2048;
    pub const DIV_1024: u16 = 1024;
    pub const DIV_512: u16 = 512;
    pub const DIV_256: u16 = 256;
    pub const DIV_128: u16 = 128;
    pub const DIV_64: u16 = 64;
    pub const DIV_32: u16 = 32;
    pub const DIV_16: u16 = 16;
    pub const DIV_8: u16 = 8;
    pub const DIV_4: u16 = 4;
    pub const DIV_2: u16 = 2;
    /// Rounded down to 0 by the hardware, so the same as `DIV_65536`
    pub const DIV_1: u16 = 1;
}

/// Whether the hardware defines the divider: 0 or a power of two
pub fn is_valid_divider(divider: u16) -> bool {
    divider == 0 || divider.is_power_of_two()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    LsbFirst,
    MsbFirst,
}

/// Clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl DataMode {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(DataMode::Mode0),
            1 => Some(DataMode::Mode1),
            2 => Some(DataMode::Mode2),
            3 => Some(DataMode::Mode3),
            _ => None,
        }
    }

    fn bits(&self) -> u32 {
        let index = match self {
            DataMode::Mode0 => 0,
            DataMode::Mode1 => 1,
            DataMode::Mode2 => 2,
            DataMode::Mode3 => 3,
        };
        index << 2
    }
}

/// Chip select line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelect {
    /// CE0 (GPIO 8)
    Cs0 = 0,
    /// CE1 (GPIO 7)
    Cs1 = 1,
    /// CS2 (not brought out on the header)
    Cs2 = 2,
    /// No chip select; drive a GPIO by hand
    None = 3,
}

impl ChipSelect {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ChipSelect::Cs0),
            1 => Some(ChipSelect::Cs1),
            2 => Some(ChipSelect::Cs2),
            3 => Some(ChipSelect::None),
            _ => None,
        }
    }

    fn polarity_mask(&self) -> Option<u32> {
        match self {
            ChipSelect::None => None,
            line => Some(1 << (cs_bits::CSPOL_SHIFT + *line as u32)),
        }
    }
}

/// A full SPI0 setup, applied in one call
#[derive(Debug, Clone, Copy)]
pub struct SpiConfig {
    pub bit_order: BitOrder,
    pub data_mode: DataMode,
    /// Core clock / divider = SPI clock
    pub clock_divider: u16,
    pub chip_select: ChipSelect,
    pub cs_active_high: bool,
}

impl SpiConfig {
    /// Mode 0, MSB first, CE0 active low, 250 MHz / 64 = ~3.9 MHz
    pub const DEFAULT: Self = Self {
        bit_order: BitOrder::MsbFirst,
        data_mode: DataMode::Mode0,
        clock_divider: clock_divider::DIV_64,
        chip_select: ChipSelect::Cs0,
        cs_active_high: false,
    };
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// SPI0 encoder bound to a peripherals handle
pub struct Spi<'a> {
    periph: &'a Peripherals,
}

impl Peripherals {
    pub fn spi(&self) -> Spi<'_> {
        Spi { periph: self }
    }
}

impl<'a> Spi<'a> {
    /// Hand GPIO 7-11 to SPI0 and reset CS to mode 0, CE0, active low.
    ///
    /// The previous pin functions are not saved.
    pub fn begin(&self) -> Result<()> {
        let gpio = self.periph.gpio();
        for pin in SPI0_PINS {
            gpio.set_function(pin, Function::Alt0)?;
        }
        self.periph.with_block(Block::Spi0, |io| {
            io.write(regs::CS, 0);
            io.write(regs::CS, cs_bits::CLEAR);
        })
    }

    /// Stop any transfer and return GPIO 7-11 to inputs
    pub fn end(&self) -> Result<()> {
        self.periph
            .with_block(Block::Spi0, |io| modify(io, regs::CS, 0, cs_bits::TA))?;
        let gpio = self.periph.gpio();
        for pin in SPI0_PINS {
            gpio.set_function(pin, Function::Input)?;
        }
        Ok(())
    }

    /// Held in the handle, not in hardware, so this never fails. `init`
    /// and `close` reset it to MSB first.
    pub fn set_bit_order(&self, order: BitOrder) {
        self.periph.set_lsb_first(order == BitOrder::LsbFirst);
    }

    pub fn bit_order(&self) -> BitOrder {
        if self.periph.lsb_first() {
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        }
    }

    pub fn set_data_mode(&self, mode: DataMode) -> Result<()> {
        self.periph.with_block(Block::Spi0, |io| {
            modify(io, regs::CS, mode.bits(), cs_bits::CPOL | cs_bits::CPHA)
        })
    }

    /// Write the CLK register.
    ///
    /// With `strict_clock_divider` (the default) only 0 and powers of two
    /// are accepted. Otherwise the value is written as given and the
    /// hardware rounds odd values down.
    pub fn set_clock_divider(&self, divider: u16) -> Result<()> {
        if self.periph.config().strict_clock_divider && !is_valid_divider(divider) {
            return Err(Error::InvalidClockDivider(divider));
        }
        self.periph
            .with_block(Block::Spi0, |io| io.write(regs::CLK, divider as u32))
    }

    pub fn chip_select(&self, line: ChipSelect) -> Result<()> {
        self.periph.with_block(Block::Spi0, |io| {
            modify(io, regs::CS, line as u32, cs_bits::CS_MASK)
        })
    }

    /// Set the active level of one chip select line. `ChipSelect::None`
    /// has no polarity bit and is left alone.
    pub fn set_chip_select_polarity(&self, line: ChipSelect, active_high: bool) -> Result<()> {
        let Some(mask) = line.polarity_mask() else {
            return Ok(());
        };
        let value = if active_high { mask } else { 0 };
        self.periph
            .with_block(Block::Spi0, |io| modify(io, regs::CS, value, mask))
    }

    /// Apply a whole configuration
    pub fn configure(&self, config: &SpiConfig) -> Result<()> {
        self.set_bit_order(config.bit_order);
        self.set_data_mode(config.data_mode)?;
        self.set_clock_divider(config.clock_divider)?;
        self.chip_select(config.chip_select)?;
        self.set_chip_select_polarity(config.chip_select, config.cs_active_high)
    }

    /// Exchange one byte: clock `byte` out and return the byte clocked in
    pub fn transfer(&self, byte: u8) -> Result<u8> {
        let timeout = self.periph.config().spi_timeout();
        let lsb_first = self.periph.lsb_first();
        let tx = order(byte, lsb_first);
        let rx = self.periph.with_block(Block::Spi0, |io| {
            start(io);
            let result = shift_byte(io, tx, timeout);
            modify(io, regs::CS, 0, cs_bits::TA);
            result
        })??;
        Ok(order(rx, lsb_first))
    }

    /// Full-duplex transfer of a whole buffer with TA held throughout
    pub fn transfer_buf(&self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(Error::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        if tx.is_empty() {
            return Ok(());
        }
        let timeout = self.periph.config().spi_timeout();
        let lsb_first = self.periph.lsb_first();
        self.periph.with_block(Block::Spi0, |io| {
            start(io);
            let result = shift_buffer(io, tx, rx, lsb_first, timeout);
            modify(io, regs::CS, 0, cs_bits::TA);
            result
        })?
    }

    /// Transfer `buf` and overwrite it with the received bytes
    pub fn transfer_in_place(&self, buf: &mut [u8]) -> Result<()> {
        let tx = buf.to_vec();
        self.transfer_buf(&tx, buf)
    }

    /// Send `data`, discarding what comes back
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut sink = vec![0u8; data.len()];
        self.transfer_buf(data, &mut sink)
    }
}

/// Replace the bits of `mask` in a register with those of `value`
fn modify(io: &mut dyn RegisterIo, offset: usize, value: u32, mask: u32) {
    let current = io.read(offset);
    io.write(offset, (current & !mask) | (value & mask));
}

fn order(byte: u8, lsb_first: bool) -> u8 {
    if lsb_first {
        byte.reverse_bits()
    } else {
        byte
    }
}

/// Flush both FIFOs and raise TA
fn start(io: &mut dyn RegisterIo) {
    modify(io, regs::CS, cs_bits::CLEAR, cs_bits::CLEAR);
    modify(io, regs::CS, cs_bits::TA, cs_bits::TA);
}

fn wait_for(io: &mut dyn RegisterIo, flag: u32, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    while io.read(regs::CS) & flag == 0 {
        if started.elapsed() >= timeout {
            log::warn!("SPI0 status flag {:#x} not set within {:?}", flag, timeout);
            return Err(Error::Timeout(timeout));
        }
        std::hint::spin_loop();
    }
    Ok(())
}

fn shift_byte(io: &mut dyn RegisterIo, tx: u8, timeout: Duration) -> Result<u8> {
    wait_for(io, cs_bits::TXD, timeout)?;
    io.write(regs::FIFO, tx as u32);
    wait_for(io, cs_bits::DONE, timeout)?;
    Ok(io.read(regs::FIFO) as u8)
}

fn shift_buffer(
    io: &mut dyn RegisterIo,
    tx: &[u8],
    rx: &mut [u8],
    lsb_first: bool,
    timeout: Duration,
) -> Result<()> {
    let mut sent = 0;
    let mut received = 0;
    let mut last_progress = Instant::now();

    while received < rx.len() {
        let mut progressed = false;

        while sent < tx.len() && io.read(regs::CS) & cs_bits::TXD != 0 {
            io.write(regs::FIFO, order(tx[sent], lsb_first) as u32);
            sent += 1;
            progressed = true;
        }

        while received < rx.len() && io.read(regs::CS) & cs_bits::RXD != 0 {
            rx[received] = order(io.read(regs::FIFO) as u8, lsb_first);
            received += 1;
            progressed = true;
        }

        if progressed {
            last_progress = Instant::now();
        } else if last_progress.elapsed() >= timeout {
            log::warn!(
                "SPI0 stalled after {} of {} bytes",
                received,
                rx.len()
            );
            return Err(Error::Timeout(timeout));
        } else {
            std::hint::spin_loop();
        }
    }

    wait_for(io, cs_bits::DONE, timeout)
}
