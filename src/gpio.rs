//! GPIO register encoder
//!
//! Translates pin-level operations into accesses on the GPIO and PADS
//! blocks. Every operation validates the pin (0-53), locates its field
//! through [`crate::field`] and holds the block lock for the whole
//! read-modify-write.
//!
//! # Register conventions
//!
//! | Registers          | Kind                 | Layout        |
//! |--------------------|----------------------|---------------|
//! | GPFSEL0-5          | stored, RMW          | 3 bits / pin  |
//! | GPSET0-1, GPCLR0-1 | write-1-to-act       | 1 bit / pin   |
//! | GPLEV0-1           | read-only            | 1 bit / pin   |
//! | GPEDS0-1           | write-1-to-clear     | 1 bit / pin   |
//! | GP{R,F,H,L,AR,AF}EN| stored, RMW          | 1 bit / pin   |
//! | GPPUD + GPPUDCLK0-1| legacy pull latch    | 1 bit / pin   |
//! | GPPUPPDN0-3        | BCM2711 pull control | 2 bits / pin  |

use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::field::{check_pin, ONE_BIT, THREE_BIT, TWO_BIT};
use crate::memory::{Block, Peripherals, PullControl, RegisterIo};
use crate::regs::{gpio as regs, pads};

/// Settling time between the steps of the legacy pull latch (>150 cycles)
pub const PULL_SETTLE: Duration = Duration::from_micros(10);

/// Function select value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

impl Function {
    pub const ALL: [Function; 8] = [
        Function::Input,
        Function::Output,
        Function::Alt0,
        Function::Alt1,
        Function::Alt2,
        Function::Alt3,
        Function::Alt4,
        Function::Alt5,
    ];

    pub fn bits(&self) -> u32 {
        *self as u32
    }

    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0b000 => Function::Input,
            0b001 => Function::Output,
            0b100 => Function::Alt0,
            0b101 => Function::Alt1,
            0b110 => Function::Alt2,
            0b111 => Function::Alt3,
            0b011 => Function::Alt4,
            _ => Function::Alt5,
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Function::Input => write!(f, "input"),
            Function::Output => write!(f, "output"),
            Function::Alt0 => write!(f, "alt0"),
            Function::Alt1 => write!(f, "alt1"),
            Function::Alt2 => write!(f, "alt2"),
            Function::Alt3 => write!(f, "alt3"),
            Function::Alt4 => write!(f, "alt4"),
            Function::Alt5 => write!(f, "alt5"),
        }
    }
}

impl FromStr for Function {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Function::ALL
            .iter()
            .copied()
            .find(|f| f.to_string() == s.to_lowercase())
            .or(match s.to_lowercase().as_str() {
                "in" => Some(Function::Input),
                "out" => Some(Function::Output),
                _ => None,
            })
            .ok_or_else(|| format!("unknown function '{}' (input, output, alt0..alt5)", s))
    }
}

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "high" | "on" => Ok(Level::High),
            "0" | "low" | "off" => Ok(Level::Low),
            _ => Err(format!("unknown level '{}' (high, low)", s)),
        }
    }
}

/// Pull resistor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Down,
    Up,
}

impl Pull {
    /// Encoding for GPPUD
    pub fn legacy_bits(&self) -> u32 {
        match self {
            Pull::Off => 0b00,
            Pull::Down => 0b01,
            Pull::Up => 0b10,
        }
    }

    /// Encoding for GPIO_PUP_PDN_CNTRL (up and down are swapped)
    pub fn direct_bits(&self) -> u32 {
        match self {
            Pull::Off => 0b00,
            Pull::Up => 0b01,
            Pull::Down => 0b10,
        }
    }
}

impl FromStr for Pull {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(Pull::Off),
            "down" => Ok(Pull::Down),
            "up" => Ok(Pull::Up),
            _ => Err(format!("unknown pull mode '{}' (off, down, up)", s)),
        }
    }
}

/// Edge/level detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detect {
    Rising,
    Falling,
    High,
    Low,
    AsyncRising,
    AsyncFalling,
}

impl Detect {
    /// First enable register of this detector's bank
    fn register(&self) -> usize {
        match self {
            Detect::Rising => regs::GPREN0,
            Detect::Falling => regs::GPFEN0,
            Detect::High => regs::GPHEN0,
            Detect::Low => regs::GPLEN0,
            Detect::AsyncRising => regs::GPAREN0,
            Detect::AsyncFalling => regs::GPAFEN0,
        }
    }
}

/// Pad control group; drive strength is set per group, not per pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadGroup {
    Gpio0To27,
    Gpio28To45,
    Gpio46To53,
}

impl PadGroup {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(PadGroup::Gpio0To27),
            1 => Some(PadGroup::Gpio28To45),
            2 => Some(PadGroup::Gpio46To53),
            _ => None,
        }
    }

    pub fn for_pin(pin: u8) -> Result<Self> {
        Ok(match check_pin(pin)? {
            0..=27 => PadGroup::Gpio0To27,
            28..=45 => PadGroup::Gpio28To45,
            _ => PadGroup::Gpio46To53,
        })
    }

    fn offset(&self) -> usize {
        match self {
            PadGroup::Gpio0To27 => pads::GPIO_0_27,
            PadGroup::Gpio28To45 => pads::GPIO_28_45,
            PadGroup::Gpio46To53 => pads::GPIO_46_53,
        }
    }
}

/// Pad control value for a drive strength in mA (2..=16, 2 mA steps)
pub fn drive_strength(milliamps: u8) -> u32 {
    (milliamps.clamp(2, 16) / 2 - 1) as u32 & pads::DRIVE_MASK
}

/// GPIO encoder bound to a peripherals handle
pub struct Gpio<'a> {
    periph: &'a Peripherals,
}

impl Peripherals {
    pub fn gpio(&self) -> Gpio<'_> {
        Gpio { periph: self }
    }
}

impl<'a> Gpio<'a> {
    /// Select a pin's function
    pub fn set_function(&self, pin: u8, function: Function) -> Result<()> {
        let field = THREE_BIT.locate(check_pin(pin)?);
        let offset = field.offset(regs::GPFSEL0);
        self.periph.with_block(Block::Gpio, |io| {
            let current = io.read(offset);
            io.write(offset, field.insert(current, function.bits()));
        })
    }

    pub fn function(&self, pin: u8) -> Result<Function> {
        let field = THREE_BIT.locate(check_pin(pin)?);
        let value = self
            .periph
            .with_block(Block::Gpio, |io| io.read(field.offset(regs::GPFSEL0)))?;
        Ok(Function::from_bits(field.extract(value)))
    }

    pub fn set_high(&self, pin: u8) -> Result<()> {
        self.write_mask(regs::GPSET0, pin)
    }

    pub fn set_low(&self, pin: u8) -> Result<()> {
        self.write_mask(regs::GPCLR0, pin)
    }

    pub fn write(&self, pin: u8, level: Level) -> Result<()> {
        match level {
            Level::High => self.set_high(pin),
            Level::Low => self.set_low(pin),
        }
    }

    /// Current level; valid for inputs and outputs alike
    pub fn level(&self, pin: u8) -> Result<Level> {
        Ok(Level::from(self.read_bit(regs::GPLEV0, pin)?))
    }

    /// Whether an armed detector has latched an event on this pin
    pub fn event_detected(&self, pin: u8) -> Result<bool> {
        self.read_bit(regs::GPEDS0, pin)
    }

    pub fn clear_event(&self, pin: u8) -> Result<()> {
        self.write_mask(regs::GPEDS0, pin)
    }

    pub fn arm(&self, pin: u8, detect: Detect) -> Result<()> {
        self.modify_bit(detect.register(), pin, true)
    }

    pub fn disarm(&self, pin: u8, detect: Detect) -> Result<()> {
        self.modify_bit(detect.register(), pin, false)
    }

    /// First step of the legacy pull latch: stage `pull` in GPPUD.
    ///
    /// The caller must wait [`PULL_SETTLE`], clock the pins with
    /// [`set_pull_clock`](Self::set_pull_clock), wait again, then write
    /// `Pull::Off` and clear the clock.
    pub fn set_pull_mode(&self, pull: Pull) -> Result<()> {
        self.periph
            .with_block(Block::Gpio, |io| io.write(regs::GPPUD, pull.legacy_bits()))
    }

    /// Second step of the legacy pull latch: assert or release a pin's clock
    pub fn set_pull_clock(&self, pin: u8, enable: bool) -> Result<()> {
        let field = ONE_BIT.locate(check_pin(pin)?);
        let value = if enable { field.mask() } else { 0 };
        self.periph.with_block(Block::Gpio, |io| {
            io.write(field.offset(regs::GPPUDCLK0), value)
        })
    }

    /// Set a pin's pull resistor in one call.
    ///
    /// BCM2711 writes the pin's 2-bit field directly. Older parts run the
    /// whole GPPUD/GPPUDCLK latch under the block lock and leave both
    /// registers cleared.
    pub fn set_function_pull_mode(&self, pin: u8, pull: Pull) -> Result<()> {
        check_pin(pin)?;
        let generation = self
            .periph
            .soc()
            .map(|soc| soc.pull_control())
            .unwrap_or(PullControl::Legacy);

        match generation {
            PullControl::Direct => {
                let field = TWO_BIT.locate(pin);
                let offset = field.offset(regs::GPPUPPDN0);
                self.periph.with_block(Block::Gpio, |io| {
                    let current = io.read(offset);
                    io.write(offset, field.insert(current, pull.direct_bits()));
                })
            }
            PullControl::Legacy => self
                .periph
                .with_block(Block::Gpio, |io| latch_legacy_pull(io, pin, pull)),
        }
    }

    /// Raw pad control word for a group
    pub fn pad(&self, group: PadGroup) -> Result<u32> {
        self.periph.with_block(Block::Pads, |io| io.read(group.offset()))
    }

    /// Write pad control bits; the password byte is supplied here
    pub fn set_pad(&self, group: PadGroup, control: u32) -> Result<()> {
        let value = (control & 0x00FF_FFFF) | pads::PASSWORD;
        self.periph
            .with_block(Block::Pads, |io| io.write(group.offset(), value))
    }

    fn write_mask(&self, first: usize, pin: u8) -> Result<()> {
        let field = ONE_BIT.locate(check_pin(pin)?);
        self.periph
            .with_block(Block::Gpio, |io| io.write(field.offset(first), field.mask()))
    }

    fn read_bit(&self, first: usize, pin: u8) -> Result<bool> {
        let field = ONE_BIT.locate(check_pin(pin)?);
        let value = self
            .periph
            .with_block(Block::Gpio, |io| io.read(field.offset(first)))?;
        Ok(field.extract(value) != 0)
    }

    fn modify_bit(&self, first: usize, pin: u8, set: bool) -> Result<()> {
        let field = ONE_BIT.locate(check_pin(pin)?);
        let offset = field.offset(first);
        self.periph.with_block(Block::Gpio, |io| {
            let current = io.read(offset);
            io.write(offset, field.insert(current, set as u32));
        })
    }
}

fn latch_legacy_pull(io: &mut dyn RegisterIo, pin: u8, pull: Pull) {
    let field = ONE_BIT.locate(pin);
    let clock = field.offset(regs::GPPUDCLK0);

    io.write(regs::GPPUD, pull.legacy_bits());
    thread::sleep(PULL_SETTLE);
    io.write(clock, field.mask());
    thread::sleep(PULL_SETTLE);
    io.write(regs::GPPUD, Pull::Off.legacy_bits());
    io.write(clock, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::memory::{Op, Soc};

    fn simulated(soc: Soc) -> Peripherals {
        let periph = Peripherals::new(Config::default().with_debug(true).with_soc(soc));
        periph.init().unwrap();
        periph
    }

    #[test]
    fn test_set_function_every_pin_and_mode() {
        let periph = simulated(Soc::Bcm2835);
        let gpio = periph.gpio();
        for pin in 0..=53u8 {
            for function in Function::ALL {
                gpio.set_function(pin, function).unwrap();
                assert_eq!(gpio.function(pin).unwrap(), function, "pin {}", pin);
            }
        }
    }

    #[test]
    fn test_set_function_leaves_neighbours() {
        let periph = simulated(Soc::Bcm2835);
        let gpio = periph.gpio();
        for pin in 10..20u8 {
            gpio.set_function(pin, Function::Alt3).unwrap();
        }
        gpio.set_function(14, Function::Output).unwrap();
        for pin in 10..20u8 {
            let expected = if pin == 14 { Function::Output } else { Function::Alt3 };
            assert_eq!(gpio.function(pin).unwrap(), expected);
        }
        let sim = periph.simulator().unwrap();
        assert_eq!(sim.register(Block::Gpio, regs::GPFSEL0 + 4), 0x3FFF_9FFF);
    }

    #[test]
    fn test_set_high_reads_back_on_output() {
        let periph = simulated(Soc::Bcm2835);
        let gpio = periph.gpio();
        for pin in [0u8, 17, 31, 32, 53] {
            gpio.set_function(pin, Function::Output).unwrap();
            gpio.set_high(pin).unwrap();
            assert_eq!(gpio.level(pin).unwrap(), Level::High);
            gpio.set_low(pin).unwrap();
            assert_eq!(gpio.level(pin).unwrap(), Level::Low);
        }
    }

    #[test]
    fn test_set_clear_are_plain_writes() {
        let periph = simulated(Soc::Bcm2835);
        let sim = periph.simulator().unwrap();
        periph.gpio().write(35, Level::High).unwrap();
        periph.gpio().write(2, Level::Low).unwrap();

        assert_eq!(sim.writes_to(Block::Gpio, regs::GPSET0 + 4), vec![1 << 3]);
        assert_eq!(sim.writes_to(Block::Gpio, regs::GPCLR0), vec![1 << 2]);
        assert!(sim.journal().iter().all(|a| a.op == Op::Write));
    }

    #[test]
    fn test_input_level() {
        let periph = simulated(Soc::Bcm2835);
        let sim = periph.simulator().unwrap();
        sim.drive_input(22, true);
        assert_eq!(periph.gpio().level(22).unwrap(), Level::High);
        sim.drive_input(22, false);
        assert_eq!(periph.gpio().level(22).unwrap(), Level::Low);
    }

    #[test]
    fn test_arm_and_disarm_each_detector() {
        let periph = simulated(Soc::Bcm2835);
        let sim = periph.simulator().unwrap();
        let gpio = periph.gpio();
        let detectors = [
            Detect::Rising,
            Detect::Falling,
            Detect::High,
            Detect::Low,
            Detect::AsyncRising,
            Detect::AsyncFalling,
        ];
        for detect in detectors {
            gpio.arm(40, detect).unwrap();
            gpio.arm(41, detect).unwrap();
            assert_eq!(sim.register(Block::Gpio, detect.register() + 4), 0b11 << 8);
            gpio.disarm(40, detect).unwrap();
            assert_eq!(sim.register(Block::Gpio, detect.register() + 4), 0b10 << 8);
        }
        // each detector has its own register
        for detect in detectors {
            assert_eq!(sim.register(Block::Gpio, detect.register()), 0);
        }
    }

    #[test]
    fn test_event_detect_round_trip() {
        let periph = simulated(Soc::Bcm2835);
        let sim = periph.simulator().unwrap();
        let gpio = periph.gpio();

        gpio.arm(27, Detect::Rising).unwrap();
        assert!(!gpio.event_detected(27).unwrap());
        sim.drive_input(27, true);
        assert!(gpio.event_detected(27).unwrap());
        assert!(!gpio.event_detected(26).unwrap());

        gpio.clear_event(27).unwrap();
        assert!(!gpio.event_detected(27).unwrap());
        assert_eq!(sim.writes_to(Block::Gpio, regs::GPEDS0), vec![1 << 27]);
    }

    #[test]
    fn test_legacy_pull_primitives() {
        let periph = simulated(Soc::Bcm2836);
        let sim = periph.simulator().unwrap();
        let gpio = periph.gpio();

        gpio.set_pull_mode(Pull::Up).unwrap();
        gpio.set_pull_clock(33, true).unwrap();
        assert_eq!(sim.register(Block::Gpio, regs::GPPUD), 0b10);
        assert_eq!(sim.register(Block::Gpio, regs::GPPUDCLK0 + 4), 1 << 1);

        gpio.set_pull_mode(Pull::Off).unwrap();
        gpio.set_pull_clock(33, false).unwrap();
        assert_eq!(sim.register(Block::Gpio, regs::GPPUD), 0);
        assert_eq!(sim.register(Block::Gpio, regs::GPPUDCLK0 + 4), 0);
    }

    #[test]
    fn test_legacy_pull_sequence_ends_idle() {
        let periph = simulated(Soc::Bcm2835);
        let sim = periph.simulator().unwrap();
        periph.gpio().set_function_pull_mode(4, Pull::Down).unwrap();

        let writes: Vec<(usize, u32)> = sim
            .journal()
            .iter()
            .filter(|a| a.op == Op::Write)
            .map(|a| (a.offset, a.value))
            .collect();
        assert_eq!(
            writes,
            vec![
                (regs::GPPUD, 0b01),
                (regs::GPPUDCLK0, 1 << 4),
                (regs::GPPUD, 0),
                (regs::GPPUDCLK0, 0),
            ]
        );
        assert_eq!(sim.register(Block::Gpio, regs::GPPUD), 0);
    }

    #[test]
    fn test_direct_pull_encoding() {
        let periph = simulated(Soc::Bcm2711);
        let sim = periph.simulator().unwrap();
        let gpio = periph.gpio();

        gpio.set_function_pull_mode(17, Pull::Up).unwrap();
        gpio.set_function_pull_mode(18, Pull::Down).unwrap();
        assert_eq!(
            sim.register(Block::Gpio, regs::GPPUPPDN0 + 4),
            (0b01 << 2) | (0b10 << 4)
        );
        gpio.set_function_pull_mode(17, Pull::Off).unwrap();
        assert_eq!(sim.register(Block::Gpio, regs::GPPUPPDN0 + 4), 0b10 << 4);
        assert!(sim.writes_to(Block::Gpio, regs::GPPUD).is_empty());
    }

    #[test]
    fn test_pad_password() {
        let periph = simulated(Soc::Bcm2835);
        let gpio = periph.gpio();
        let control = pads::SLEW_UNLIMITED | pads::HYSTERESIS | drive_strength(16);
        gpio.set_pad(PadGroup::Gpio28To45, 0xAB00_0000 | control).unwrap();
        assert_eq!(gpio.pad(PadGroup::Gpio28To45).unwrap(), 0x5A00_001F);
        assert_eq!(gpio.pad(PadGroup::Gpio0To27).unwrap(), 0);
    }

    #[test]
    fn test_drive_strength() {
        assert_eq!(drive_strength(2), 0);
        assert_eq!(drive_strength(8), 3);
        assert_eq!(drive_strength(16), 7);
        assert_eq!(drive_strength(40), 7);
        assert_eq!(drive_strength(0), 0);
    }

    #[test]
    fn test_pad_group_for_pin() {
        assert_eq!(PadGroup::for_pin(27).unwrap(), PadGroup::Gpio0To27);
        assert_eq!(PadGroup::for_pin(28).unwrap(), PadGroup::Gpio28To45);
        assert_eq!(PadGroup::for_pin(53).unwrap(), PadGroup::Gpio46To53);
        assert!(PadGroup::for_pin(54).is_err());
        assert_eq!(PadGroup::from_index(3), None);
    }

    #[test]
    fn test_invalid_pin_rejected_before_access() {
        let periph = simulated(Soc::Bcm2835);
        let sim = periph.simulator().unwrap();
        let gpio = periph.gpio();
        assert!(matches!(gpio.set_function(54, Function::Output), Err(Error::InvalidPin(54))));
        assert!(matches!(gpio.set_high(60), Err(Error::InvalidPin(60))));
        assert!(matches!(gpio.level(200), Err(Error::InvalidPin(200))));
        assert!(matches!(gpio.arm(54, Detect::Low), Err(Error::InvalidPin(54))));
        assert!(matches!(gpio.set_function_pull_mode(99, Pull::Up), Err(Error::InvalidPin(99))));
        assert!(sim.journal().is_empty());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("alt5".parse::<Function>().unwrap(), Function::Alt5);
        assert_eq!("OUT".parse::<Function>().unwrap(), Function::Output);
        assert!("alt6".parse::<Function>().is_err());
        assert_eq!("1".parse::<Level>().unwrap(), Level::High);
        assert_eq!("down".parse::<Pull>().unwrap(), Pull::Down);
    }

    #[test]
    fn test_function_bits_round_trip() {
        for function in Function::ALL {
            assert_eq!(Function::from_bits(function.bits()), function);
        }
    }
}
