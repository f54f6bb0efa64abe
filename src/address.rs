use crate::{crc8, Error};
use core::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    str::FromStr,
};

/// 64-bit ROM code of a 1-Wire device.
///
/// Byte 0 is the family code, bytes 1..=6 the unique serial and byte 7 the
/// CRC-8 over the preceding seven bytes. The all-zero [`Address::ANY`] is the
/// wildcard: operations given it address every device via Skip-ROM instead of
/// selecting a single one.
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq, Eq)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::ANY
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

/// Conversion from the conventional display form (family code in the most
/// significant byte, checksum in the least)
impl From<u64> for Address {
    fn from(code: u64) -> Self {
        Address {
            raw: code.to_be_bytes(),
        }
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> u64 {
        u64::from_be_bytes(addr.raw)
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl AsMut<[u8]> for Address {
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut() as _
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    /// Wildcard address: "no device in particular", broadcasts via Skip-ROM
    pub const ANY: Address = Address { raw: [0; 8] };

    pub fn is_any(&self) -> bool {
        self.raw == [0; 8]
    }

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    /// The six serial bytes between family code and checksum
    pub fn serial(&self) -> &[u8] {
        &self.raw[1..7]
    }

    pub fn crc(&self) -> u8 {
        self[7]
    }

    pub fn is_valid(&self) -> bool {
        crc8(&self.raw[..7]) == self.crc()
    }

    /// Checks the trailing checksum byte against the other seven bytes
    pub fn ensure_valid<E: Debug>(&self) -> Result<(), Error<E>> {
        let computed = crc8(&self.raw[..7]);
        if computed != self.crc() {
            Err(Error::CrcMismatch(computed, self.crc()))
        } else {
            Ok(())
        }
    }

    /// Reassembles an address from the order bits arrive on the wire during a
    /// ROM search: bit 0 of the family code first, the checksum byte last.
    pub(crate) fn from_wire_order(bits: u64) -> Self {
        Address {
            raw: bits.to_le_bytes(),
        }
    }
}

/// Error type
#[derive(Debug)]
pub enum AddressParseError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = Address::default();
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for i in 0..Self::BYTES as usize {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        addr[i] = (h << 4) | l;
                    }
                    _ => return Err(AddressParseError::Invalid),
                },
                _ => return Err(AddressParseError::NotEnough),
            }
        }

        if chars.next().is_some() {
            return Err(AddressParseError::Invalid);
        }
        Ok(addr)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}
