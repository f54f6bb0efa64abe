use crate::{Address, Command, Error, Master, OpenDrainLine};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Cursor of an in-progress ROM search.
///
/// The search walks the binary tree spanned by the ROM codes of all devices
/// answering on the bus; every call to [`RomSearch::next_device`] runs one
/// full 64-bit pass and yields one device. The cursor carries the candidate
/// address between passes and cannot be rewound, only replaced by a fresh one.
#[derive(Debug, Clone)]
pub struct RomSearch {
    /// Candidate address in wire bit order (family code LSB first)
    address: u64,
    /// 1-based bit position of the last unexplored branch point, 0 for none
    last_discrepancy: u8,
    done: bool,
    command: Command,
}

impl Default for RomSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl RomSearch {
    /// Search enumerating every device on the bus
    pub fn new() -> Self {
        RomSearch {
            address: 0,
            last_discrepancy: 0,
            done: false,
            command: Command::SearchRom,
        }
    }

    /// Search enumerating only devices in an alarm state
    pub fn alarmed() -> Self {
        RomSearch {
            command: Command::AlarmSearch,
            ..Self::new()
        }
    }

    /// Runs one search pass, yielding the next device address.
    ///
    /// `Ok(None)` once the tree is exhausted or when no device answers a
    /// pass; `Err(CrcMismatch)` for an address that fails validation, with
    /// the cursor left usable so the caller can skip it and continue.
    pub fn next_device<E, W, P>(
        &mut self,
        master: &mut Master<W, P>,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<E>>
    where
        E: Debug,
        W: OpenDrainLine<Error = E>,
        P: OutputPin,
    {
        if self.done {
            return Ok(None);
        }

        if !master.reset(delay)? {
            self.last_discrepancy = 0;
            return Ok(None);
        }

        master.write_command(delay, self.command)?;

        let mut discrepancy = 0;
        for position in 1..=Address::BITS {
            let bit = master.read_bit(delay)?;
            let complement = master.read_bit(delay)?;

            if bit && complement {
                // nobody answered this position, bus glitch or device gone
                self.last_discrepancy = 0;
                return Ok(None);
            }
            if bit == complement {
                // devices disagree here, pick a branch
                if position == self.last_discrepancy {
                    // other branch than last time
                    set_bit(&mut self.address, position - 1, true);
                } else if position > self.last_discrepancy {
                    // fresh branch point, take 0 first and remember it
                    set_bit(&mut self.address, position - 1, false);
                    discrepancy = position;
                } else if !get_bit(self.address, position - 1) {
                    // revisited branch point still on its 0 side
                    discrepancy = position;
                }
            } else {
                // all remaining devices agree
                set_bit(&mut self.address, position - 1, bit);
            }

            // deselect every device not matching the chosen bit
            master.write_bit(delay, get_bit(self.address, position - 1))?;
        }

        self.last_discrepancy = discrepancy;
        if discrepancy == 0 {
            self.done = true;
        }

        let address = Address::from_wire_order(self.address);
        address.ensure_valid()?;
        Ok(Some(address))
    }

    pub fn into_iter<'a, E, W, P, D>(
        self,
        master: &'a mut Master<W, P>,
        delay: &'a mut D,
    ) -> RomSearchIter<'a, W, P, D>
    where
        E: Debug,
        W: OpenDrainLine<Error = E>,
        P: OutputPin,
        D: DelayNs,
    {
        RomSearchIter {
            search: Some(self),
            master,
            delay,
        }
    }
}

pub struct RomSearchIter<'a, W: OpenDrainLine, P: OutputPin, D: DelayNs> {
    search: Option<RomSearch>,
    master: &'a mut Master<W, P>,
    delay: &'a mut D,
}

impl<'a, E, W, P, D> Iterator for RomSearchIter<'a, W, P, D>
where
    E: Debug,
    W: OpenDrainLine<Error = E>,
    P: OutputPin,
    D: DelayNs,
{
    type Item = Result<Address, Error<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = search
            .next_device(self.master, &mut *self.delay)
            .transpose()?;
        self.search = Some(search);
        Some(result)
    }
}

fn get_bit(bits: u64, position: u8) -> bool {
    bits & (1 << position) != 0
}

fn set_bit(bits: &mut u64, position: u8, value: bool) {
    *bits = (*bits & !(1u64 << position)) | ((value as u64) << position);
}

impl<E: Debug, W: OpenDrainLine<Error = E>, P: OutputPin> Master<W, P> {
    /// Enumerates every device on the bus into `found`.
    ///
    /// Returns the number of devices written. `NoResponse` when the initial
    /// reset finds an empty bus; `CapacityExceeded(n)` when more devices
    /// exist than `found` can hold, with the first `n` entries valid.
    /// Addresses failing their CRC are skipped, not fatal.
    pub fn search_rom(
        &mut self,
        delay: &mut impl DelayNs,
        found: &mut [Address],
    ) -> Result<usize, Error<E>> {
        self.search(delay, found, RomSearch::new())
    }

    /// Like [`Master::search_rom`], but only devices in an alarm state answer
    pub fn search_alarmed(
        &mut self,
        delay: &mut impl DelayNs,
        found: &mut [Address],
    ) -> Result<usize, Error<E>> {
        self.search(delay, found, RomSearch::alarmed())
    }

    fn search(
        &mut self,
        delay: &mut impl DelayNs,
        found: &mut [Address],
        mut search: RomSearch,
    ) -> Result<usize, Error<E>> {
        if found.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if !self.reset(delay)? {
            return Err(Error::NoResponse);
        }

        let mut count = 0;
        loop {
            match search.next_device(self, delay) {
                Ok(Some(address)) => {
                    if count >= found.len() {
                        return Err(Error::CapacityExceeded(count));
                    }
                    found[count] = address;
                    count += 1;
                }
                Ok(None) => return Ok(count),
                Err(Error::CrcMismatch(..)) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
