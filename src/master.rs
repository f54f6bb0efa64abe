use crate::{Address, Command, Error, FunctionCommand, OpCode, OpenDrainLine};
use core::convert::Infallible;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin, PinState};

/// Minimum reset pulse length, both transmit and receive half (us)
const RESET_PULSE_US: u32 = 480;
/// Read/write time slot length (us)
const SLOT_US: u32 = 60;
/// Recovery time between slots, 1us minimum (us)
const RECOVERY_US: u32 = 5;

/// Driver for the MOSFET that substitutes the passive pull-up while a
/// parasite-powered device needs real supply current
pub struct StrongPullup<P> {
    pin: P,
    active_high: bool,
}

impl<P: OutputPin> StrongPullup<P> {
    /// `active_high` is the pin level that switches the MOSFET on
    pub fn new(pin: P, active_high: bool) -> Self {
        StrongPullup { pin, active_high }
    }

    pub(crate) fn set(&mut self, on: bool) -> Result<(), P::Error> {
        self.pin.set_state(PinState::from(on == self.active_high))
    }

    pub fn free(self) -> P {
        self.pin
    }
}

/// Placeholder pull-up pin for buses without a power MOSFET
pub struct NoPullup;

impl ErrorType for NoPullup {
    type Error = Infallible;
}

impl OutputPin for NoPullup {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Software 1-Wire bus master bound to one open-drain data line.
///
/// All operations are synchronous and block for their protocol-mandated
/// duration. The bus is an exclusive physical resource: the master is not
/// reentrant and must not be driven from more than one execution context.
pub struct Master<W: OpenDrainLine, P: OutputPin = NoPullup> {
    line: W,
    pullup: Option<StrongPullup<P>>,
    psu_present: bool,
}

impl<E: Debug, W: OpenDrainLine<Error = E>> Master<W, NoPullup> {
    /// Creates a master without strong pull-up control and probes whether
    /// any device on the bus runs on parasite power
    pub fn new(line: W, delay: &mut impl DelayNs) -> Self {
        Master::setup(line, None, delay)
    }
}

impl<E: Debug, W: OpenDrainLine<Error = E>, P: OutputPin> Master<W, P> {
    /// Creates a master with a strong pull-up MOSFET on a dedicated pin
    pub fn with_strong_pullup(
        line: W,
        pullup: StrongPullup<P>,
        delay: &mut impl DelayNs,
    ) -> Self {
        Master::setup(line, Some(pullup), delay)
    }

    fn setup(line: W, pullup: Option<StrongPullup<P>>, delay: &mut impl DelayNs) -> Self {
        let mut master = Master {
            line,
            pullup,
            psu_present: true,
        };
        let _ = master.strong_pullup(false);
        // An empty or faulty bus keeps the optimistic default: no device
        // that would need the strong pull-up.
        let _ = master.read_power_supply(delay, Address::ANY);
        master
    }

    /// Releases both pins and hands them back
    pub fn free(mut self) -> (W, Option<P>) {
        let _ = self.strong_pullup(false);
        let _ = self.line.release();
        (self.line, self.pullup.map(StrongPullup::free))
    }

    /// Result of the last power-supply probe: `true` when every device has
    /// external supply, `false` when at least one runs on parasite power
    pub fn psu_present(&self) -> bool {
        self.psu_present
    }

    /// Transmits a reset pulse and listens for presence pulses.
    ///
    /// Returns `Ok(true)` if at least one device answered, `Ok(false)` on an
    /// empty bus and `Err(WireFault)` if the wire seems to be shortened.
    /// Presence is never cached; every transaction starts with a fresh reset.
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.strong_pullup(false)?;
        self.ensure_wire_high(delay)?;

        self.line.drive_low()?;
        delay.delay_us(RESET_PULSE_US);
        self.line.release()?;

        // Presence pulses start 15..60us after the release and last up to
        // 240us; keep the line released for the full 480us receive half
        // regardless of when one is spotted.
        delay.delay_us(15);
        let mut present = false;
        let mut sampled = 0;
        while sampled <= 240 {
            if self.line.is_low()? {
                present = true;
                break;
            }
            delay.delay_us(10);
            sampled += 10;
        }
        delay.delay_us(RESET_PULSE_US - 15 - sampled);

        Ok(present)
    }

    fn ensure_wire_high(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        for _ in 0..125 {
            if self.line.is_high()? {
                return Ok(());
            }
            delay.delay_us(2);
        }
        Err(Error::WireFault)
    }

    /// Resets the bus and selects the device scope for a following function
    /// command: Skip-ROM broadcast for [`Address::ANY`], Match-ROM otherwise
    pub fn select(&mut self, delay: &mut impl DelayNs, addr: Address) -> Result<(), Error<E>> {
        if !self.reset(delay)? {
            return Err(Error::NoResponse);
        }
        if addr.is_any() {
            self.write_command(delay, Command::SkipRom)?;
        } else {
            self.write_command(delay, Command::MatchRom)?;
            self.write_bytes(delay, addr.as_ref())?;
        }
        Ok(())
    }

    /// Reads the ROM code of the single device on the bus.
    ///
    /// With several devices present their answers collide and the CRC check
    /// fails, so `CrcMismatch` here also means "bus not single-device".
    pub fn read_rom(&mut self, delay: &mut impl DelayNs) -> Result<Address, Error<E>> {
        if !self.reset(delay)? {
            return Err(Error::NoResponse);
        }
        self.write_command(delay, Command::ReadRom)?;

        let mut rom = Address::default();
        self.read_bytes(delay, rom.as_mut())?;
        rom.ensure_valid()?;
        Ok(rom)
    }

    /// Asks the addressed scope whether all of its devices have external
    /// supply, updating the cached [`Master::psu_present`] flag
    pub fn read_power_supply(
        &mut self,
        delay: &mut impl DelayNs,
        addr: Address,
    ) -> Result<bool, Error<E>> {
        self.select(delay, addr)?;
        self.write_command(delay, FunctionCommand::ReadPowerSupply)?;

        // A parasite-powered device holds the read slot low
        let externally_powered = self.read_bit(delay)?;
        self.psu_present = externally_powered;
        Ok(externally_powered)
    }

    pub fn write_command(
        &mut self,
        delay: &mut impl DelayNs,
        cmd: impl OpCode,
    ) -> Result<(), Error<E>> {
        self.write_byte(delay, cmd.op_code())
    }

    pub fn write_bytes(&mut self, delay: &mut impl DelayNs, bytes: &[u8]) -> Result<(), Error<E>> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, delay: &mut impl DelayNs, dst: &mut [u8]) -> Result<(), Error<E>> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    pub(crate) fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), Error<E>> {
        let mut byte = byte;
        for _ in 0..8 {
            self.write_bit(delay, (byte & 0x01) == 0x01)?;
            byte >>= 1;
        }
        Ok(())
    }

    pub(crate) fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, Error<E>> {
        let mut byte = 0_u8;
        for _ in 0..8 {
            byte >>= 1;
            if self.read_bit(delay)? {
                byte |= 0x80;
            }
        }
        Ok(byte)
    }

    pub(crate) fn write_bit(&mut self, delay: &mut impl DelayNs, bit: bool) -> Result<(), Error<E>> {
        self.line.drive_low()?;
        delay.delay_us(3);
        if bit {
            // release early, the pull-up signals the 1 for the rest of the slot
            self.line.release()?;
            delay.delay_us(SLOT_US - 3);
        } else {
            delay.delay_us(SLOT_US - 3);
            self.line.release()?;
        }
        delay.delay_us(RECOVERY_US);
        Ok(())
    }

    pub(crate) fn read_bit(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<E>> {
        self.line.drive_low()?;
        delay.delay_us(3);
        self.line.release()?;

        // the addressed device holds the line low to answer 0
        delay.delay_us(7);
        let bit = self.line.is_high()?;
        delay.delay_us(SLOT_US - 10);
        delay.delay_us(RECOVERY_US);
        Ok(bit)
    }

    pub(crate) fn strong_pullup(&mut self, on: bool) -> Result<(), Error<E>> {
        if let Some(pullup) = &mut self.pullup {
            pullup.set(on).map_err(|_| Error::PowerFault)?;
        }
        Ok(())
    }
}
