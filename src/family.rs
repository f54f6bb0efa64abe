//! Behavior descriptors for the supported temperature-sensor families.
//!
//! Every family-specific difference (temperature decode formula, resolution
//! support, presence of the configuration register) lives in one descriptor
//! per family code, so adding a family means adding one table entry.

use crate::thermo::Scratchpad;

/// DS18S20, legacy fixed 9-bit sensor without configuration register
pub const DS18S20: u8 = 0x10;
/// DS1822
pub const DS1822: u8 = 0x22;
/// DS18B20, also reported by the MAX31820
pub const DS18B20: u8 = 0x28;
/// DS1825, also reported by the MAX31826
pub const DS1825: u8 = 0x3B;
/// DS28EA00
pub const DS28EA00: u8 = 0x42;

/// Conversion resolution of the configurable families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
}

impl Resolution {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            9 => Some(Resolution::Bits9),
            10 => Some(Resolution::Bits10),
            11 => Some(Resolution::Bits11),
            12 => Some(Resolution::Bits12),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Resolution::Bits9 => 9,
            Resolution::Bits10 => 10,
            Resolution::Bits11 => 11,
            Resolution::Bits12 => 12,
        }
    }

    /// Decodes the R1/R0 bits of the scratchpad configuration register
    pub fn from_config(config: u8) -> Self {
        match (config & 0x7f) >> 5 {
            0 => Resolution::Bits9,
            1 => Resolution::Bits10,
            2 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    /// Re-encodes into `config`, leaving the other bits untouched
    pub fn patch_config(self, config: u8) -> u8 {
        (config & 0x9f) | ((self.bits() - 9) << 5)
    }

    /// Worst-case conversion time at this resolution (ms)
    pub fn conversion_time_ms(self) -> u32 {
        match self {
            Resolution::Bits9 => 95,
            Resolution::Bits10 => 190,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSupport {
    Fixed(Resolution),
    Configurable,
}

/// Behavior descriptor of one device family
pub struct Family {
    pub code: u8,
    pub name: &'static str,
    pub resolution: ResolutionSupport,
    pub has_config_register: bool,
    pub decode: fn(&Scratchpad) -> f32,
}

/// Standard decode shared by all 12-bit capable families: the raw reading is
/// sixteenths of a degree Celsius
pub(crate) fn decode_standard(scratchpad: &Scratchpad) -> f32 {
    scratchpad.raw_temperature() as f32 / 16.0
}

/// DS18S20 datasheet formula: drop the 0.5C bit of the raw reading, then
/// refine with the count registers
fn decode_ds18s20(scratchpad: &Scratchpad) -> f32 {
    let truncated = (scratchpad.raw_temperature() >> 1) as f32;
    let count_remain = scratchpad.count_remain() as f32;
    let count_per_degree = scratchpad.count_per_degree() as f32;
    truncated - 0.25 + (count_per_degree - count_remain) / count_per_degree
}

const FAMILIES: [Family; 5] = [
    Family {
        code: DS18S20,
        name: "DS18S20",
        resolution: ResolutionSupport::Fixed(Resolution::Bits9),
        has_config_register: false,
        decode: decode_ds18s20,
    },
    Family {
        code: DS1822,
        name: "DS1822",
        resolution: ResolutionSupport::Configurable,
        has_config_register: true,
        decode: decode_standard,
    },
    Family {
        code: DS18B20,
        name: "DS18B20",
        resolution: ResolutionSupport::Configurable,
        has_config_register: true,
        decode: decode_standard,
    },
    Family {
        code: DS1825,
        name: "DS1825",
        resolution: ResolutionSupport::Configurable,
        has_config_register: true,
        decode: decode_standard,
    },
    Family {
        code: DS28EA00,
        name: "DS28EA00",
        resolution: ResolutionSupport::Configurable,
        has_config_register: true,
        decode: decode_standard,
    },
];

/// Looks up the descriptor for a family code
pub fn by_code(code: u8) -> Option<&'static Family> {
    FAMILIES.iter().find(|family| family.code == code)
}
