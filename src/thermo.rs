//! Temperature sensor command layer for the DS18x20 families.

use crate::family::{self, Resolution, ResolutionSupport};
use crate::{crc8, Address, Error, FunctionCommand, Master, OpenDrainLine};
use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Worst-case conversion time, covers 12-bit resolution on every family (ms)
pub const MAX_CONVERSION_TIME_MS: u32 = 750;

/// Snapshot of a device's 9-byte scratchpad: 8 data bytes plus CRC.
///
/// Always read fresh from the device and CRC-validated before construction,
/// never cached across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad {
    raw: [u8; Self::BYTES],
}

impl Scratchpad {
    pub const BYTES: usize = 9;

    pub fn bytes(&self) -> &[u8; Self::BYTES] {
        &self.raw
    }

    /// Two's-complement raw temperature reading, bytes 0-1 little-endian
    pub fn raw_temperature(&self) -> i16 {
        LittleEndian::read_i16(&self.raw[0..2])
    }

    /// T(H) alarm threshold register
    pub fn alarm_high(&self) -> u8 {
        self.raw[2]
    }

    /// T(L) alarm threshold register
    pub fn alarm_low(&self) -> u8 {
        self.raw[3]
    }

    /// Configuration register; only meaningful on families that have one
    pub fn config(&self) -> u8 {
        self.raw[4]
    }

    /// COUNT REMAIN register of the DS18S20
    pub fn count_remain(&self) -> u8 {
        self.raw[6]
    }

    /// COUNT PER C register of the DS18S20
    pub fn count_per_degree(&self) -> u8 {
        self.raw[7]
    }

    pub fn crc(&self) -> u8 {
        self.raw[8]
    }
}

/// Decoded temperature reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    /// Decoded with the family's documented formula
    Celsius(f32),
    /// The family code is not in the dispatch table; the standard formula
    /// was applied as a best effort and the value is low-confidence
    Unverified(f32),
}

impl Temperature {
    pub fn celsius(self) -> f32 {
        match self {
            Temperature::Celsius(value) | Temperature::Unverified(value) => value,
        }
    }

    pub fn is_verified(self) -> bool {
        matches!(self, Temperature::Celsius(_))
    }
}

impl<E: Debug, W: OpenDrainLine<Error = E>, P: OutputPin> Master<W, P> {
    /// Reads and CRC-validates the scratchpad of the addressed device
    pub fn read_scratchpad(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
    ) -> Result<Scratchpad, Error<E>> {
        self.select(delay, addr)?;
        self.write_command(delay, FunctionCommand::ReadScratchpad)?;

        let mut raw = [0u8; Scratchpad::BYTES];
        self.read_bytes(delay, &mut raw)?;

        let computed = crc8(&raw[..Scratchpad::BYTES - 1]);
        if computed != raw[Scratchpad::BYTES - 1] {
            return Err(Error::CrcMismatch(computed, raw[Scratchpad::BYTES - 1]));
        }
        Ok(Scratchpad { raw })
    }

    /// Writes the alarm thresholds and, on families that have one, the
    /// configuration register
    pub fn write_scratchpad(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
        alarm_high: u8,
        alarm_low: u8,
        config: u8,
    ) -> Result<(), Error<E>> {
        self.select(delay, addr)?;
        self.write_command(delay, FunctionCommand::WriteScratchpad)?;
        self.write_bytes(delay, &[alarm_high, alarm_low])?;

        // Unknown families are assumed to take the third byte
        let has_config = family::by_code(addr.family_code())
            .map_or(true, |family| family.has_config_register);
        if has_config {
            self.write_byte(delay, config)?;
        }
        Ok(())
    }

    /// Starts a temperature conversion on the addressed scope.
    ///
    /// With a parasite-powered scope the strong pull-up is asserted for the
    /// conversion. `wait` blocks for the worst-case 750ms and de-asserts the
    /// pull-up afterwards; without it the call returns immediately and the
    /// caller owns the timing (the pull-up drops on the next bus reset).
    pub fn convert_temperature(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
        wait: bool,
    ) -> Result<(), Error<E>> {
        self.select(delay, addr)?;
        self.write_command(delay, FunctionCommand::ConvertTemperature)?;

        if !self.psu_present() {
            self.strong_pullup(true)?;
        }
        if wait {
            delay.delay_ms(MAX_CONVERSION_TIME_MS);
            if !self.psu_present() {
                self.strong_pullup(false)?;
            }
        }
        Ok(())
    }

    /// Estimates how long a conversion on `addr` takes (ms).
    ///
    /// Reads the configured resolution for configurable families; wildcard
    /// or unknown scope, fixed-resolution families and unreadable devices
    /// all fall back to the conservative 750ms maximum.
    pub fn convert_duration(&mut self, delay: &mut impl DelayNs, addr: Address) -> u32 {
        if !addr.is_any() {
            if let Some(family) = family::by_code(addr.family_code()) {
                if family.resolution == ResolutionSupport::Configurable {
                    if let Ok(scratchpad) = self.read_scratchpad(delay, addr) {
                        return Resolution::from_config(scratchpad.config()).conversion_time_ms();
                    }
                }
            }
        }
        MAX_CONVERSION_TIME_MS
    }

    /// Reads the scratchpad and decodes the temperature per family.
    ///
    /// Unknown families yield [`Temperature::Unverified`] rather than an
    /// outright failure.
    pub fn get_temperature(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
    ) -> Result<Temperature, Error<E>> {
        let scratchpad = self.read_scratchpad(delay, addr)?;
        Ok(match family::by_code(addr.family_code()) {
            Some(family) => Temperature::Celsius((family.decode)(&scratchpad)),
            None => Temperature::Unverified(family::decode_standard(&scratchpad)),
        })
    }

    /// Reads the configured conversion resolution of a single device
    pub fn get_resolution(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
    ) -> Result<Resolution, Error<E>> {
        if addr.is_any() {
            return Err(Error::InvalidArgument);
        }
        let family = family::by_code(addr.family_code())
            .ok_or(Error::UnsupportedFamily(addr.family_code()))?;

        let scratchpad = self.read_scratchpad(delay, addr)?;
        Ok(match family.resolution {
            ResolutionSupport::Fixed(resolution) => resolution,
            ResolutionSupport::Configurable => Resolution::from_config(scratchpad.config()),
        })
    }

    /// Changes the conversion resolution of a single device and verifies the
    /// change by reading the scratchpad back
    pub fn set_resolution(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
        resolution: Resolution,
    ) -> Result<(), Error<E>> {
        if addr.is_any() {
            return Err(Error::InvalidArgument);
        }
        let family = family::by_code(addr.family_code())
            .ok_or(Error::UnsupportedFamily(addr.family_code()))?;
        if family.resolution != ResolutionSupport::Configurable {
            return Err(Error::UnsupportedFamily(addr.family_code()));
        }

        let scratchpad = self.read_scratchpad(delay, addr)?;
        let config = resolution.patch_config(scratchpad.config());
        self.write_scratchpad(
            delay,
            addr,
            scratchpad.alarm_high(),
            scratchpad.alarm_low(),
            config,
        )?;

        let readback = self.read_scratchpad(delay, addr)?;
        if Resolution::from_config(readback.config()) != resolution {
            return Err(Error::VerifyFailed);
        }
        Ok(())
    }
}
