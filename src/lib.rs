//! BCM2835 userspace I/O
//!
//! Memory-mapped access to the GPIO, SPI0 and PADS register blocks of
//! BCM2835-family SoCs (Raspberry Pi 1 through 4) from Linux userspace.
//!
//! # Features
//!
//! - **Memory map manager**: maps the register blocks from `/dev/mem`
//!   with SoC auto-detection from the device tree
//! - **GPIO**: function select, set/clear/level, event detect, pull
//!   control (legacy latch and BCM2711 direct), pad drive
//! - **SPI0**: mode, chip select, clock divider and bounded-time transfers
//! - **Simulation**: a register model that needs no hardware, for tests
//!   and dry runs
//! - **Header tables**: physical pin to GPIO maps for P1, P5 and J8
//!
//! # Usage
//!
//! ```no_run
//! use bcm2835_io::{Config, Function, Peripherals};
//!
//! # fn main() -> bcm2835_io::Result<()> {
//! let periph = Peripherals::new(Config::default());
//! periph.init()?;
//!
//! let gpio = periph.gpio();
//! gpio.set_function(17, Function::Output)?;
//! gpio.set_high(17)?;
//!
//! let spi = periph.spi();
//! spi.begin()?;
//! let reply = spi.transfer(0x9F)?;
//! spi.end()?;
//!
//! periph.close()?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod gpio;
pub mod memory;
pub mod pins;
pub mod regs;
pub mod spi;

pub use config::Config;
pub use error::{CloseError, ConfigError, Error, InitError, Result};
pub use gpio::{Detect, Function, Gpio, Level, PadGroup, Pull};
pub use memory::{Block, Lifecycle, Peripherals, Simulator, Soc};
pub use spi::{BitOrder, ChipSelect, DataMode, Spi, SpiConfig};
