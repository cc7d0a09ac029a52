//! Header position to GPIO number tables
//!
//! Physical pins are the silkscreen numbers on the board header. Power,
//! ground and ID EEPROM pins carry no GPIO and are absent from the tables.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// One header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub name: &'static str,
    pub description: &'static str,
    /// `(physical pin, gpio)` pairs in physical order
    pub pins: &'static [(u8, u8)],
}

impl Header {
    /// GPIO wired to a physical pin, if it carries one
    pub fn gpio(&self, physical: u8) -> Option<u8> {
        self.pins
            .iter()
            .find(|(p, _)| *p == physical)
            .map(|(_, gpio)| *gpio)
    }

    /// Physical pin a GPIO is brought out on
    pub fn physical(&self, gpio: u8) -> Option<u8> {
        self.pins
            .iter()
            .find(|(_, g)| *g == gpio)
            .map(|(physical, _)| *physical)
    }
}

/// Original Model B, 26-pin P1
pub mod rev1 {
    pub const P1_03: u8 = 0;
    pub const P1_05: u8 = 1;
    pub const P1_07: u8 = 4;
    pub const P1_08: u8 = 14;
    pub const P1_10: u8 = 15;
    pub const P1_11: u8 = 17;
    pub const P1_12: u8 = 18;
    pub const P1_13: u8 = 21;
    pub const P1_15: u8 = 22;
    pub const P1_16: u8 = 23;
    pub const P1_18: u8 = 24;
    pub const P1_19: u8 = 10;
    pub const P1_21: u8 = 9;
    pub const P1_22: u8 = 25;
    pub const P1_23: u8 = 11;
    pub const P1_24: u8 = 8;
    pub const P1_26: u8 = 7;
}

/// Model B rev 2, 26-pin P1 plus the unpopulated 8-pin P5
pub mod rev2 {
    pub const P1_03: u8 = 2;
    pub const P1_05: u8 = 3;
    pub const P1_07: u8 = 4;
    pub const P1_08: u8 = 14;
    pub const P1_10: u8 = 15;
    pub const P1_11: u8 = 17;
    pub const P1_12: u8 = 18;
    pub const P1_13: u8 = 27;
    pub const P1_15: u8 = 22;
    pub const P1_16: u8 = 23;
    pub const P1_18: u8 = 24;
    pub const P1_19: u8 = 10;
    pub const P1_21: u8 = 9;
    pub const P1_22: u8 = 25;
    pub const P1_23: u8 = 11;
    pub const P1_24: u8 = 8;
    pub const P1_26: u8 = 7;
    pub const P1_29: u8 = 5;
    pub const P1_31: u8 = 6;
    pub const P1_32: u8 = 12;
    pub const P1_33: u8 = 13;
    pub const P1_35: u8 = 19;
    pub const P1_36: u8 = 16;
    pub const P1_37: u8 = 26;
    pub const P1_38: u8 = 20;
    pub const P1_40: u8 = 21;

    pub const P5_03: u8 = 28;
    pub const P5_04: u8 = 29;
    pub const P5_05: u8 = 30;
    pub const P5_06: u8 = 31;
}

/// B+, Pi 2 and later 40-pin header
pub mod j8 {
    pub const J8_03: u8 = 2;
    pub const J8_05: u8 = 3;
    pub const J8_07: u8 = 4;
    pub const J8_08: u8 = 14;
    pub const J8_10: u8 = 15;
    pub const J8_11: u8 = 17;
    pub const J8_12: u8 = 18;
    pub const J8_13: u8 = 27;
    pub const J8_15: u8 = 22;
    pub const J8_16: u8 = 23;
    pub const J8_18: u8 = 24;
    pub const J8_19: u8 = 10;
    pub const J8_21: u8 = 9;
    pub const J8_22: u8 = 25;
    pub const J8_23: u8 = 11;
    pub const J8_24: u8 = 8;
    pub const J8_26: u8 = 7;
    pub const J8_29: u8 = 5;
    pub const J8_31: u8 = 6;
    pub const J8_32: u8 = 12;
    pub const J8_33: u8 = 13;
    pub const J8_35: u8 = 19;
    pub const J8_36: u8 = 16;
    pub const J8_37: u8 = 26;
    pub const J8_38: u8 = 20;
    pub const J8_40: u8 = 21;
}

pub const P1_REV1: Header = Header {
    name: "p1-rev1",
    description: "Model B rev 1, 26-pin P1",
    pins: &[
        (3, rev1::P1_03),
        (5, rev1::P1_05),
        (7, rev1::P1_07),
        (8, rev1::P1_08),
        (10, rev1::P1_10),
        (11, rev1::P1_11),
        (12, rev1::P1_12),
        (13, rev1::P1_13),
        (15, rev1::P1_15),
        (16, rev1::P1_16),
        (18, rev1::P1_18),
        (19, rev1::P1_19),
        (21, rev1::P1_21),
        (22, rev1::P1_22),
        (23, rev1::P1_23),
        (24, rev1::P1_24),
        (26, rev1::P1_26),
    ],
};

pub const P1_REV2: Header = Header {
    name: "p1-rev2",
    description: "Model B rev 2, P1",
    pins: &[
        (3, rev2::P1_03),
        (5, rev2::P1_05),
        (7, rev2::P1_07),
        (8, rev2::P1_08),
        (10, rev2::P1_10),
        (11, rev2::P1_11),
        (12, rev2::P1_12),
        (13, rev2::P1_13),
        (15, rev2::P1_15),
        (16, rev2::P1_16),
        (18, rev2::P1_18),
        (19, rev2::P1_19),
        (21, rev2::P1_21),
        (22, rev2::P1_22),
        (23, rev2::P1_23),
        (24, rev2::P1_24),
        (26, rev2::P1_26),
        (29, rev2::P1_29),
        (31, rev2::P1_31),
        (32, rev2::P1_32),
        (33, rev2::P1_33),
        (35, rev2::P1_35),
        (36, rev2::P1_36),
        (37, rev2::P1_37),
        (38, rev2::P1_38),
        (40, rev2::P1_40),
    ],
};

pub const P5_REV2: Header = Header {
    name: "p5-rev2",
    description: "Model B rev 2, 8-pin P5",
    pins: &[
        (3, rev2::P5_03),
        (4, rev2::P5_04),
        (5, rev2::P5_05),
        (6, rev2::P5_06),
    ],
};

pub const J8: Header = Header {
    name: "j8",
    description: "B+ / Pi 2 and later, 40-pin J8",
    pins: &[
        (3, j8::J8_03),
        (5, j8::J8_05),
        (7, j8::J8_07),
        (8, j8::J8_08),
        (10, j8::J8_10),
        (11, j8::J8_11),
        (12, j8::J8_12),
        (13, j8::J8_13),
        (15, j8::J8_15),
        (16, j8::J8_16),
        (18, j8::J8_18),
        (19, j8::J8_19),
        (21, j8::J8_21),
        (22, j8::J8_22),
        (23, j8::J8_23),
        (24, j8::J8_24),
        (26, j8::J8_26),
        (29, j8::J8_29),
        (31, j8::J8_31),
        (32, j8::J8_32),
        (33, j8::J8_33),
        (35, j8::J8_35),
        (36, j8::J8_36),
        (37, j8::J8_37),
        (38, j8::J8_38),
        (40, j8::J8_40),
    ],
};

/// Every known layout
pub const HEADERS: [&Header; 4] = [&P1_REV1, &P1_REV2, &P5_REV2, &J8];

/// Registry of header layouts by name and alias
pub static LAYOUTS: Lazy<HashMap<&'static str, &'static Header>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for header in HEADERS {
        m.insert(header.name, header);
    }
    m.insert("rev1", &P1_REV1);
    m.insert("p1", &P1_REV2);
    m.insert("rev2", &P1_REV2);
    m.insert("p5", &P5_REV2);
    m.insert("b+", &J8);
    m.insert("40pin", &J8);
    m
});

/// Look up a layout by name, ignoring case
pub fn layout(name: &str) -> Option<&'static Header> {
    LAYOUTS.get(name.to_lowercase().as_str()).copied()
}
