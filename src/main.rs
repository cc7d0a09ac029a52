//! bcm-io
//!
//! Command-line access to BCM2835-family GPIO and SPI0 registers.
//!
//! # Usage
//!
//! ```bash
//! # Show the 40-pin header map
//! bcm-io pins show j8
//!
//! # Drive GPIO 17 high
//! sudo bcm-io gpio mode 17 output
//! sudo bcm-io gpio write 17 high
//!
//! # Enable the pull-up on GPIO 4
//! sudo bcm-io gpio pull 4 up
//!
//! # Read a JEDEC ID over SPI0 CE0
//! sudo bcm-io spi transfer 9f 00 00 00 --divider 256
//!
//! # Try any of the above without hardware
//! bcm-io --debug spi transfer de ad be ef
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use bcm2835_io::gpio::drive_strength;
use bcm2835_io::pins::{self, Header};
use bcm2835_io::regs::pads;
use bcm2835_io::spi::clock_divider;
use bcm2835_io::{
    BitOrder, ChipSelect, Config, DataMode, Function, Level, PadGroup, Peripherals, Pull,
    SpiConfig,
};

/// BCM2835 I/O
///
/// Memory-mapped GPIO and SPI0 access for Raspberry Pi boards
#[derive(Parser)]
#[command(name = "bcm-io")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Memory-mapped GPIO and SPI0 access for BCM2835-family SoCs")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use the register simulation instead of /dev/mem
    #[arg(short, long, global = true)]
    debug: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Header pin tables
    #[command(subcommand)]
    Pins(PinCommands),

    /// GPIO operations
    #[command(subcommand)]
    Gpio(GpioCommands),

    /// SPI0 operations
    #[command(subcommand)]
    Spi(SpiCommands),
}

#[derive(Subcommand)]
enum PinCommands {
    /// List the known header layouts
    List,

    /// Show the physical-to-GPIO map of a layout
    Show {
        /// Layout name (e.g., j8, p1-rev2, p5)
        layout: String,
    },
}

#[derive(Subcommand)]
enum GpioCommands {
    /// Set the function of a pin
    Mode {
        /// BCM GPIO number (0-53)
        pin: u8,

        /// input, output or alt0..alt5
        function: Function,
    },

    /// Read the level and function of a pin
    Read {
        /// BCM GPIO number (0-53)
        pin: u8,
    },

    /// Drive an output pin
    Write {
        /// BCM GPIO number (0-53)
        pin: u8,

        /// high or low
        level: Level,
    },

    /// Set the pull resistor of a pin
    Pull {
        /// BCM GPIO number (0-53)
        pin: u8,

        /// off, down or up
        mode: Pull,
    },

    /// Read or write a pad control group
    Pad {
        /// Group index: 0 (GPIO 0-27), 1 (28-45), 2 (46-53)
        group: u8,

        /// New control value (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_u32)]
        value: Option<u32>,

        /// Drive strength in mA, used when no value is given
        #[arg(long)]
        drive: Option<u8>,
    },
}

#[derive(Subcommand)]
enum SpiCommands {
    /// Exchange bytes with a device
    Transfer {
        /// Bytes to send, in hex
        #[arg(required = true, value_parser = parse_hex_byte)]
        bytes: Vec<u8>,

        /// Chip select line (0, 1, 2, or 3 for none)
        #[arg(long, default_value_t = 0)]
        cs: u8,

        /// SPI mode (0-3)
        #[arg(long, default_value_t = 0)]
        mode: u8,

        /// Clock divider (0 or a power of two)
        #[arg(long, default_value_t = clock_divider::DIV_64)]
        divider: u16,

        /// Shift bytes least significant bit first
        #[arg(long)]
        lsb_first: bool,

        /// Chip select is active high
        #[arg(long)]
        cs_active_high: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Pins(cmd) => handle_pins(cmd),
        Commands::Gpio(cmd) => {
            let periph = open(cli.config.as_ref(), cli.debug)?;
            let result = handle_gpio(&periph, cmd);
            periph.close().context("Failed to unmap peripherals")?;
            result
        }
        Commands::Spi(cmd) => {
            let periph = open(cli.config.as_ref(), cli.debug)?;
            let result = handle_spi(&periph, cmd);
            periph.close().context("Failed to unmap peripherals")?;
            result
        }
    }
}

fn open(config_path: Option<&PathBuf>, debug: bool) -> Result<Peripherals> {
    let config = match config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let config = if debug { config.with_debug(true) } else { config };

    let periph = Peripherals::new(config);
    periph
        .init()
        .context("Failed to map peripherals (root or CAP_SYS_RAWIO is usually required)")?;

    if periph.is_debug() {
        println!("{} Running against the register simulation", "[SIM]".yellow().bold());
    }
    if let Some(soc) = periph.soc() {
        log::info!("SoC: {}", soc);
    }
    Ok(periph)
}

fn handle_pins(cmd: PinCommands) -> Result<()> {
    match cmd {
        PinCommands::List => {
            println!("{}", "=".repeat(60));
            println!("{}", "Header Layouts".cyan().bold());
            println!("{}", "=".repeat(60));

            for header in pins::HEADERS {
                println!(
                    "\n  {}: {}",
                    header.name.white().bold(),
                    header.description
                );
                println!("    GPIO pins: {}", header.pins.len());
            }

            println!("\n{}", "=".repeat(60));
            println!(
                "Use {} to see the pin map",
                "bcm-io pins show <layout>".cyan()
            );
        }

        PinCommands::Show { layout } => {
            let header = pins::layout(&layout).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown header layout: {}. Use 'bcm-io pins list' to see available layouts.",
                    layout
                )
            })?;
            print_header(header);
        }
    }

    Ok(())
}

fn print_header(header: &Header) {
    println!("{}", "=".repeat(40));
    println!("{}", format!("Header: {}", header.name).cyan().bold());
    println!("  {}", header.description.dimmed());
    println!("{}", "=".repeat(40));

    println!("\n  {:>8}  {:>6}", "Physical".white().bold(), "GPIO".white().bold());
    for (physical, gpio) in header.pins {
        println!("  {:>8}  {:>6}", physical, gpio.to_string().green());
    }

    println!("\n{}", "=".repeat(40));
}

fn handle_gpio(periph: &Peripherals, cmd: GpioCommands) -> Result<()> {
    let gpio = periph.gpio();

    match cmd {
        GpioCommands::Mode { pin, function } => {
            gpio.set_function(pin, function)?;
            println!(
                "{} GPIO {} set to {}",
                "[OK]".green().bold(),
                pin,
                function.to_string().white()
            );
        }

        GpioCommands::Read { pin } => {
            let function = gpio.function(pin)?;
            let level = gpio.level(pin)?;
            let shown = match level {
                Level::High => "high".green().bold(),
                Level::Low => "low".red().bold(),
            };
            println!("GPIO {}: {} ({})", pin, shown, function.to_string().dimmed());
            if gpio.event_detected(pin)? {
                println!("  {} event pending", "[!]".yellow().bold());
            }
        }

        GpioCommands::Write { pin, level } => {
            if gpio.function(pin)? != Function::Output {
                println!(
                    "{} GPIO {} is not an output; the level will not reach the pin",
                    "[WARN]".yellow().bold(),
                    pin
                );
            }
            gpio.write(pin, level)?;
            println!("{} GPIO {} driven {}", "[OK]".green().bold(), pin, level);
        }

        GpioCommands::Pull { pin, mode } => {
            gpio.set_function_pull_mode(pin, mode)?;
            println!("{} GPIO {} pull {:?}", "[OK]".green().bold(), pin, mode);
        }

        GpioCommands::Pad { group, value, drive } => {
            let pad = PadGroup::from_index(group)
                .ok_or_else(|| anyhow::anyhow!("Pad group must be 0, 1 or 2, got {}", group))?;
            let control = match (value, drive) {
                (Some(_), Some(_)) => bail!("Give either a value or --drive, not both"),
                (Some(value), None) => Some(value),
                (None, Some(ma)) => Some(
                    (gpio.pad(pad)? & !pads::DRIVE_MASK) | drive_strength(ma),
                ),
                (None, None) => None,
            };
            if let Some(control) = control {
                gpio.set_pad(pad, control)?;
            }
            let current = gpio.pad(pad)?;
            println!("Pad group {:?}: {:#010x}", pad, current);
            println!(
                "  drive: {} mA, slew limited: {}, hysteresis: {}",
                ((current & pads::DRIVE_MASK) + 1) * 2,
                current & pads::SLEW_UNLIMITED == 0,
                current & pads::HYSTERESIS != 0
            );
        }
    }

    Ok(())
}

fn handle_spi(periph: &Peripherals, cmd: SpiCommands) -> Result<()> {
    match cmd {
        SpiCommands::Transfer {
            bytes,
            cs,
            mode,
            divider,
            lsb_first,
            cs_active_high,
        } => {
            let config = SpiConfig {
                bit_order: if lsb_first {
                    BitOrder::LsbFirst
                } else {
                    BitOrder::MsbFirst
                },
                data_mode: DataMode::from_index(mode)
                    .ok_or_else(|| anyhow::anyhow!("SPI mode must be 0-3, got {}", mode))?,
                clock_divider: divider,
                chip_select: ChipSelect::from_index(cs)
                    .ok_or_else(|| anyhow::anyhow!("Chip select must be 0-3, got {}", cs))?,
                cs_active_high,
            };

            let spi = periph.spi();
            spi.begin()?;
            let result = spi.configure(&config).and_then(|_| {
                let mut rx = vec![0u8; bytes.len()];
                spi.transfer_buf(&bytes, &mut rx).map(|_| rx)
            });
            spi.end()?;
            let rx = result.context("SPI transfer failed")?;

            println!("{} {}", "TX:".cyan().bold(), hex_line(&bytes));
            println!("{} {}", "RX:".green().bold(), hex_line(&rx));
        }
    }

    Ok(())
}

fn hex_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_hex_byte(s: &str) -> std::result::Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid byte '{}': {}", s, e))
}

fn parse_u32(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid value '{}': {}", s, e))
}
