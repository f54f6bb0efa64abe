//! Pure-software simulation of a 1-Wire bus.
//!
//! Emulated devices decode the master's pulses at the electrical level: a
//! low pulse of at least 400us is a reset, shorter pulses are time slots
//! classified by length (under 15us reads as a 1 or a read slot, longer as
//! a 0). Device answers are wired-AND onto the line, so collisions behave
//! like the real bus. The simulated clock only advances through the delay
//! handed to the master.
#![allow(dead_code)]

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use onewire_gpio::{crc8, Address, OpenDrainLine};
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

/// How long a presence pulse keeps the line low after a reset release (us)
const PRESENCE_PULSE_US: u64 = 75;
/// How long a device holds the line low when answering 0 in a slot (us)
const SLOT_HOLD_US: u64 = 25;

/// Configuration of one emulated device
#[derive(Clone)]
pub struct Device {
    pub rom: [u8; 8],
    pub scratchpad: [u8; 9],
    pub parasitic: bool,
    pub alarmed: bool,
    /// Transmit the scratchpad with a deliberately wrong CRC byte
    pub corrupt_crc: bool,
    /// Drop writes to the configuration register byte
    pub ignore_config_writes: bool,
}

impl Device {
    pub fn new(family: u8, serial: [u8; 6]) -> Self {
        let mut rom = [0u8; 8];
        rom[0] = family;
        rom[1..7].copy_from_slice(&serial);
        rom[7] = crc8(&rom[..7]);
        Device::from_rom(rom)
    }

    /// Device with a verbatim ROM, checksum byte included (may be invalid)
    pub fn from_rom(rom: [u8; 8]) -> Self {
        Device {
            rom,
            // power-on reset scratchpad of a DS18B20, CRC recomputed on read
            scratchpad: [0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x00],
            parasitic: false,
            alarmed: false,
            corrupt_crc: false,
            ignore_config_writes: false,
        }
    }

    pub fn raw_temperature(mut self, raw: i16) -> Self {
        let bytes = raw.to_le_bytes();
        self.scratchpad[0] = bytes[0];
        self.scratchpad[1] = bytes[1];
        self
    }

    pub fn scratchpad_bytes(mut self, bytes: [u8; 8]) -> Self {
        self.scratchpad[..8].copy_from_slice(&bytes);
        self
    }

    pub fn parasitic(mut self) -> Self {
        self.parasitic = true;
        self
    }

    pub fn alarmed(mut self) -> Self {
        self.alarmed = true;
        self
    }

    pub fn corrupt_crc(mut self) -> Self {
        self.corrupt_crc = true;
        self
    }

    pub fn ignore_config_writes(mut self) -> Self {
        self.ignore_config_writes = true;
        self
    }

    pub fn address(&self) -> Address {
        Address::from(self.rom)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum SearchStep {
    Bit,
    Complement,
    Direction,
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    /// Accumulating the ROM command byte after a reset
    RomCommand { bits: u8, byte: u8 },
    Search { position: u8, step: SearchStep },
    ReadRom { position: u8 },
    MatchRom { position: u8 },
    /// Accumulating a function command byte after ROM selection
    FnCommand { bits: u8, byte: u8 },
    TxScratchpad { position: u8 },
    RxScratchpad { position: u8 },
    PowerBit,
    /// Ignore slots until the next reset
    Quiet,
}

struct Slave {
    cfg: Device,
    /// ROM in wire bit order: bit 0 of the family code first
    wire_rom: u64,
    selected: bool,
    searching: bool,
    matching: bool,
}

struct SimBus {
    now: u64,
    master_low_since: Option<u64>,
    device_low_until: u64,
    phase: Phase,
    alarm_only: bool,
    slaves: Vec<Slave>,
}

fn rom_bit(rom: u64, position: u8) -> bool {
    rom & (1u64 << position) != 0
}

impl SimBus {
    fn in_search(&self, slave: &Slave) -> bool {
        slave.searching && (!self.alarm_only || slave.cfg.alarmed)
    }

    /// Wired-AND level the devices put on the line for the slot that just
    /// started; true when nobody pulls low
    fn slot_output(&self) -> bool {
        match self.phase {
            Phase::Search { position, step } => {
                let mut level = true;
                for slave in self.slaves.iter().filter(|s| self.in_search(s)) {
                    let bit = rom_bit(slave.wire_rom, position);
                    match step {
                        SearchStep::Bit => level &= bit,
                        SearchStep::Complement => level &= !bit,
                        SearchStep::Direction => {}
                    }
                }
                level
            }
            Phase::ReadRom { position } => self
                .slaves
                .iter()
                .all(|slave| rom_bit(slave.wire_rom, position)),
            Phase::TxScratchpad { position } => {
                let byte = (position / 8) as usize;
                let bit = position % 8;
                self.slaves
                    .iter()
                    .filter(|slave| slave.selected)
                    .all(|slave| slave.cfg.scratchpad[byte] & (1 << bit) != 0)
            }
            // a parasite-powered device answers the power-supply query with 0
            Phase::PowerBit => !self
                .slaves
                .iter()
                .any(|slave| slave.selected && slave.cfg.parasitic),
            _ => true,
        }
    }

    fn drive_low(&mut self) {
        if self.master_low_since.is_none() {
            self.master_low_since = Some(self.now);
            if !self.slot_output() {
                self.device_low_until = self.now + SLOT_HOLD_US;
            }
        }
    }

    fn release(&mut self) {
        let Some(since) = self.master_low_since.take() else {
            return;
        };
        let pulse = self.now - since;
        if pulse >= 400 {
            self.reset_pulse();
        } else {
            self.slot(pulse < 15);
        }
    }

    fn reset_pulse(&mut self) {
        self.phase = Phase::RomCommand { bits: 0, byte: 0 };
        self.alarm_only = false;
        for slave in &mut self.slaves {
            slave.selected = false;
            slave.searching = true;
            slave.matching = true;
        }
        if !self.slaves.is_empty() {
            self.device_low_until = self.now + PRESENCE_PULSE_US;
        }
    }

    /// Consumes one finished time slot; `bit` is the level the master wrote
    /// (1 for both write-1 and read slots)
    fn slot(&mut self, bit: bool) {
        match self.phase {
            Phase::RomCommand { bits, byte } => {
                let byte = byte | ((bit as u8) << bits);
                if bits < 7 {
                    self.phase = Phase::RomCommand {
                        bits: bits + 1,
                        byte,
                    };
                } else {
                    self.rom_command(byte);
                }
            }
            Phase::Search { position, step } => match step {
                SearchStep::Bit => {
                    self.phase = Phase::Search {
                        position,
                        step: SearchStep::Complement,
                    };
                }
                SearchStep::Complement => {
                    self.phase = Phase::Search {
                        position,
                        step: SearchStep::Direction,
                    };
                }
                SearchStep::Direction => {
                    let alarm_only = self.alarm_only;
                    for slave in &mut self.slaves {
                        if slave.searching
                            && (!alarm_only || slave.cfg.alarmed)
                            && rom_bit(slave.wire_rom, position) != bit
                        {
                            slave.searching = false;
                        }
                    }
                    self.phase = if position == 63 {
                        Phase::Quiet
                    } else {
                        Phase::Search {
                            position: position + 1,
                            step: SearchStep::Bit,
                        }
                    };
                }
            },
            Phase::ReadRom { position } => {
                self.phase = if position == 63 {
                    Phase::Quiet
                } else {
                    Phase::ReadRom {
                        position: position + 1,
                    }
                };
            }
            Phase::MatchRom { position } => {
                for slave in &mut self.slaves {
                    if rom_bit(slave.wire_rom, position) != bit {
                        slave.matching = false;
                    }
                }
                if position == 63 {
                    for slave in &mut self.slaves {
                        slave.selected = slave.matching;
                    }
                    self.phase = Phase::FnCommand { bits: 0, byte: 0 };
                } else {
                    self.phase = Phase::MatchRom {
                        position: position + 1,
                    };
                }
            }
            Phase::FnCommand { bits, byte } => {
                let byte = byte | ((bit as u8) << bits);
                if bits < 7 {
                    self.phase = Phase::FnCommand {
                        bits: bits + 1,
                        byte,
                    };
                } else {
                    self.function_command(byte);
                }
            }
            Phase::TxScratchpad { position } => {
                self.phase = if position == 71 {
                    Phase::Quiet
                } else {
                    Phase::TxScratchpad {
                        position: position + 1,
                    }
                };
            }
            Phase::RxScratchpad { position } => {
                let byte = 2 + (position / 8) as usize;
                let mask = 1u8 << (position % 8);
                for slave in &mut self.slaves {
                    if !slave.selected || (byte == 4 && slave.cfg.ignore_config_writes) {
                        continue;
                    }
                    if bit {
                        slave.cfg.scratchpad[byte] |= mask;
                    } else {
                        slave.cfg.scratchpad[byte] &= !mask;
                    }
                }
                self.phase = if position == 23 {
                    Phase::Quiet
                } else {
                    Phase::RxScratchpad {
                        position: position + 1,
                    }
                };
            }
            Phase::PowerBit => self.phase = Phase::Quiet,
            Phase::Quiet => {}
        }
    }

    fn rom_command(&mut self, byte: u8) {
        self.phase = match byte {
            0xF0 => Phase::Search {
                position: 0,
                step: SearchStep::Bit,
            },
            0xEC => {
                self.alarm_only = true;
                Phase::Search {
                    position: 0,
                    step: SearchStep::Bit,
                }
            }
            0x33 => Phase::ReadRom { position: 0 },
            0x55 => Phase::MatchRom { position: 0 },
            0xCC => {
                for slave in &mut self.slaves {
                    slave.selected = true;
                }
                Phase::FnCommand { bits: 0, byte: 0 }
            }
            _ => Phase::Quiet,
        };
    }

    fn function_command(&mut self, byte: u8) {
        self.phase = match byte {
            0xBE => {
                for slave in &mut self.slaves {
                    if slave.selected {
                        let crc = crc8(&slave.cfg.scratchpad[..8]);
                        slave.cfg.scratchpad[8] =
                            if slave.cfg.corrupt_crc { crc ^ 0x55 } else { crc };
                    }
                }
                Phase::TxScratchpad { position: 0 }
            }
            0x4E => Phase::RxScratchpad { position: 0 },
            0xB4 => Phase::PowerBit,
            // conversions are modeled by the pre-set scratchpad contents
            _ => Phase::Quiet,
        };
    }

    fn is_high(&self) -> bool {
        self.master_low_since.is_none() && self.now >= self.device_low_until
    }
}

/// Handle to a simulated bus; hand [`Sim::line`] and [`Sim::delay`] to the
/// master under test
pub struct Sim {
    bus: Rc<RefCell<SimBus>>,
}

impl Sim {
    pub fn new(devices: &[Device]) -> Self {
        let slaves = devices
            .iter()
            .map(|cfg| Slave {
                wire_rom: u64::from_le_bytes(cfg.rom),
                cfg: cfg.clone(),
                selected: false,
                searching: true,
                matching: true,
            })
            .collect();
        Sim {
            bus: Rc::new(RefCell::new(SimBus {
                now: 0,
                master_low_since: None,
                device_low_until: 0,
                phase: Phase::Quiet,
                alarm_only: false,
                slaves,
            })),
        }
    }

    pub fn line(&self) -> SimLine {
        SimLine {
            bus: self.bus.clone(),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            bus: self.bus.clone(),
        }
    }

    /// Simulated microseconds burned so far
    pub fn elapsed_us(&self) -> u64 {
        self.bus.borrow().now
    }

    /// Current scratchpad contents of device `index`
    pub fn scratchpad(&self, index: usize) -> [u8; 9] {
        self.bus.borrow().slaves[index].cfg.scratchpad
    }
}

#[derive(Clone)]
pub struct SimLine {
    bus: Rc<RefCell<SimBus>>,
}

impl OpenDrainLine for SimLine {
    type Error = Infallible;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().drive_low();
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().release();
        Ok(())
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.bus.borrow().is_high())
    }
}

#[derive(Clone)]
pub struct SimDelay {
    bus: Rc<RefCell<SimBus>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.bus.borrow_mut().now += u64::from(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.bus.borrow_mut().now += u64::from(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.bus.borrow_mut().now += u64::from(ms) * 1000;
    }
}

/// Recording stand-in for the strong pull-up MOSFET gate pin
#[derive(Clone, Default)]
pub struct PullupPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl PullupPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every level ever written to the pin, in order
    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }
}

impl ErrorType for PullupPin {
    type Error = Infallible;
}

impl OutputPin for PullupPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}
