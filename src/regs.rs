//! BCM2835 peripheral register map
//!
//! Byte offsets within each 4 KiB register block, and the bit definitions
//! of the SPI0 control/status register. Values are from the BCM2835 ARM
//! Peripherals datasheet (GPIO chapter 6, SPI chapter 10) and the BCM2711
//! addendum for the direct pull-control registers.

/// GPIO block registers
pub mod gpio {
    /// Function Select 0..5, 10 pins per register, 3 bits per pin
    pub const GPFSEL0: usize = 0x00;
    /// Pin Output Set 0/1
    pub const GPSET0: usize = 0x1C;
    /// Pin Output Clear 0/1
    pub const GPCLR0: usize = 0x28;
    /// Pin Level 0/1
    pub const GPLEV0: usize = 0x34;
    /// Event Detect Status 0/1
    pub const GPEDS0: usize = 0x40;
    /// Rising Edge Detect Enable 0/1
    pub const GPREN0: usize = 0x4C;
    /// Falling Edge Detect Enable 0/1
    pub const GPFEN0: usize = 0x58;
    /// High Detect Enable 0/1
    pub const GPHEN0: usize = 0x64;
    /// Low Detect Enable 0/1
    pub const GPLEN0: usize = 0x70;
    /// Async Rising Edge Detect 0/1
    pub const GPAREN0: usize = 0x7C;
    /// Async Falling Edge Detect 0/1
    pub const GPAFEN0: usize = 0x88;
    /// Pull-up/down Enable (legacy)
    pub const GPPUD: usize = 0x94;
    /// Pull-up/down Enable Clock 0/1 (legacy)
    pub const GPPUDCLK0: usize = 0x98;
    /// Pull-up/down control 0..3 (BCM2711), 16 pins per register
    pub const GPPUPPDN0: usize = 0xE4;

    /// Highest valid GPIO number
    pub const MAX_PIN: u8 = 53;
}

/// PADS block registers (drive strength, slew, hysteresis)
pub mod pads {
    pub const GPIO_0_27: usize = 0x2C;
    pub const GPIO_28_45: usize = 0x30;
    pub const GPIO_46_53: usize = 0x34;

    /// Writes are ignored unless bits 31:24 carry this password
    pub const PASSWORD: u32 = 0x5A << 24;

    /// Slew rate not limited
    pub const SLEW_UNLIMITED: u32 = 1 << 4;
    /// Hysteresis enabled
    pub const HYSTERESIS: u32 = 1 << 3;
    /// Drive strength field (2 mA steps from 2 mA)
    pub const DRIVE_MASK: u32 = 0x07;
}

/// SPI0 block registers
pub mod spi {
    /// Control and Status
    pub const CS: usize = 0x00;
    /// TX and RX FIFOs
    pub const FIFO: usize = 0x04;
    /// Clock Divider
    pub const CLK: usize = 0x08;
    /// Data Length
    pub const DLEN: usize = 0x0C;
    /// LoSSI mode TOH
    pub const LTOH: usize = 0x10;
    /// DMA DREQ Controls
    pub const DC: usize = 0x14;
}

/// SPI0 CS register bits
pub mod cs_bits {
    /// Chip select (2 bits)
    pub const CS_MASK: u32 = 0x03;
    /// Clock phase
    pub const CPHA: u32 = 1 << 2;
    /// Clock polarity
    pub const CPOL: u32 = 1 << 3;
    /// Clear TX FIFO
    pub const CLEAR_TX: u32 = 1 << 4;
    /// Clear RX FIFO
    pub const CLEAR_RX: u32 = 1 << 5;
    pub const CLEAR: u32 = CLEAR_TX | CLEAR_RX;
    /// Chip select polarity (for the currently selected line)
    pub const CSPOL: u32 = 1 << 6;
    /// Transfer active
    pub const TA: u32 = 1 << 7;
    /// DMA enable
    pub const DMAEN: u32 = 1 << 8;
    /// Interrupt on done
    pub const INTD: u32 = 1 << 9;
    /// Interrupt on RXR
    pub const INTR: u32 = 1 << 10;
    /// Auto deassert CS
    pub const ADCS: u32 = 1 << 11;
    /// Read enable
    pub const REN: u32 = 1 << 12;
    /// LoSSI enable
    pub const LEN: u32 = 1 << 13;
    /// Transfer done
    pub const DONE: u32 = 1 << 16;
    /// RX FIFO contains data
    pub const RXD: u32 = 1 << 17;
    /// TX FIFO can accept data
    pub const TXD: u32 = 1 << 18;
    /// RX FIFO needs reading
    pub const RXR: u32 = 1 << 19;
    /// RX FIFO full
    pub const RXF: u32 = 1 << 20;
    /// CS0 polarity; CS1 and CS2 follow at 22 and 23
    pub const CSPOL0: u32 = 1 << 21;
    pub const CSPOL_SHIFT: u32 = 21;
    /// Read-only status flags
    pub const STATUS_MASK: u32 = DONE | RXD | TXD | RXR | RXF;
}
