//! SoC revision detection
//!
//! The peripheral window moved between board generations:
//!
//! | SoC      | Boards           | Peripheral base |
//! |----------|------------------|-----------------|
//! | BCM2835  | Pi 1, Zero       | 0x2000_0000     |
//! | BCM2836/7| Pi 2, Pi 3       | 0x3F00_0000     |
//! | BCM2711  | Pi 4, CM4, 400   | 0xFE00_0000     |
//!
//! The running kernel publishes the window in the device tree
//! (`/proc/device-tree/soc/ranges`) as big-endian cells.

use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::Path;

pub const BCM2835_PERI_BASE: u64 = 0x2000_0000;
pub const BCM2836_PERI_BASE: u64 = 0x3F00_0000;
pub const BCM2711_PERI_BASE: u64 = 0xFE00_0000;

/// Which pull-control register set a SoC implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullControl {
    /// GPPUD + GPPUDCLKn latch sequence
    Legacy,
    /// GPIO_PUP_PDN_CNTRL_REGn, 2 bits per pin
    Direct,
}

/// SoC revision, identified by its peripheral base address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Soc {
    Bcm2835,
    /// Also covers the BCM2837, which shares the layout
    Bcm2836,
    Bcm2711,
    /// Unrecognised base; treated as a legacy pull-control part
    Custom(u64),
}

impl Soc {
    pub fn from_base(base: u64) -> Self {
        match base {
            BCM2835_PERI_BASE => Soc::Bcm2835,
            BCM2836_PERI_BASE => Soc::Bcm2836,
            BCM2711_PERI_BASE => Soc::Bcm2711,
            other => Soc::Custom(other),
        }
    }

    pub fn peripheral_base(&self) -> u64 {
        match self {
            Soc::Bcm2835 => BCM2835_PERI_BASE,
            Soc::Bcm2836 => BCM2836_PERI_BASE,
            Soc::Bcm2711 => BCM2711_PERI_BASE,
            Soc::Custom(base) => *base,
        }
    }

    pub fn pull_control(&self) -> PullControl {
        match self {
            Soc::Bcm2711 => PullControl::Direct,
            _ => PullControl::Legacy,
        }
    }

    /// Detect the SoC from a device-tree ranges file, falling back to the
    /// original BCM2835 layout when the file is missing or malformed.
    pub fn detect(ranges: &Path) -> Self {
        match fs::read(ranges) {
            Ok(bytes) => match parse_ranges(&bytes) {
                Some(base) => Soc::from_base(base),
                None => {
                    log::warn!(
                        "Unrecognised device-tree ranges in {}, assuming BCM2835",
                        ranges.display()
                    );
                    Soc::Bcm2835
                }
            },
            Err(e) => {
                log::debug!("Cannot read {}: {}, assuming BCM2835", ranges.display(), e);
                Soc::Bcm2835
            }
        }
    }
}

impl std::fmt::Display for Soc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Soc::Bcm2835 => write!(f, "BCM2835"),
            Soc::Bcm2836 => write!(f, "BCM2836/BCM2837"),
            Soc::Bcm2711 => write!(f, "BCM2711"),
            Soc::Custom(base) => write!(f, "custom (base {:#010x})", base),
        }
    }
}

/// Extract the peripheral base from the raw `soc/ranges` property.
///
/// Cell layout is `<child-addr> <parent-addr> <size>`. On the BCM2711 the
/// parent address takes two cells, so the first one is zero and the base
/// lives in the next.
pub fn parse_ranges(bytes: &[u8]) -> Option<u64> {
    let mut cursor = Cursor::new(bytes);
    let _child = cursor.read_u32::<BigEndian>().ok()?;
    let parent = cursor.read_u32::<BigEndian>().ok()?;
    let base = if parent == 0 {
        cursor.read_u32::<BigEndian>().ok()?
    } else {
        parent
    };
    if base == 0 {
        return None;
    }
    Some(base as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_ranges_pi3() {
        let ranges = [
            0x7e, 0x00, 0x00, 0x00, // child
            0x3f, 0x00, 0x00, 0x00, // parent
            0x01, 0x00, 0x00, 0x00, // size
        ];
        assert_eq!(parse_ranges(&ranges), Some(BCM2836_PERI_BASE));
    }

    #[test]
    fn test_parse_ranges_pi4() {
        let ranges = [
            0x7e, 0x00, 0x00, 0x00, // child
            0x00, 0x00, 0x00, 0x00, // parent (high cell)
            0xfe, 0x00, 0x00, 0x00, // parent (low cell)
            0x01, 0x80, 0x00, 0x00, // size
        ];
        assert_eq!(parse_ranges(&ranges), Some(BCM2711_PERI_BASE));
    }

    #[test]
    fn test_parse_ranges_truncated() {
        assert_eq!(parse_ranges(&[0x7e, 0x00]), None);
        assert_eq!(parse_ranges(&[0u8; 12]), None);
    }

    #[test]
    fn test_detect_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x7e, 0, 0, 0, 0x20, 0, 0, 0, 0x01, 0, 0, 0])
            .unwrap();
        assert_eq!(Soc::detect(file.path()), Soc::Bcm2835);
    }

    #[test]
    fn test_detect_missing_file() {
        assert_eq!(Soc::detect(Path::new("/nonexistent/ranges")), Soc::Bcm2835);
    }

    #[test]
    fn test_pull_control_generation() {
        assert_eq!(Soc::Bcm2711.pull_control(), PullControl::Direct);
        assert_eq!(Soc::Bcm2836.pull_control(), PullControl::Legacy);
        assert_eq!(Soc::from_base(0x4000_0000), Soc::Custom(0x4000_0000));
        assert_eq!(Soc::Custom(0x4000_0000).pull_control(), PullControl::Legacy);
    }
}
