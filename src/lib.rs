#![no_std]
#![doc = include_str!("../README.md")]

mod address;
mod command;
mod crc8;
mod error;
#[cfg(feature = "thermo")]
pub mod family;
mod line;
mod master;
mod search;
#[cfg(feature = "thermo")]
mod thermo;

pub use address::Address;
pub use command::{Command, FunctionCommand, OpCode};
pub use crc8::{crc8, crc8_update};
pub use error::Error;
pub use line::{Inverted, OpenDrainLine};
pub use master::{Master, NoPullup, StrongPullup};
pub use search::{RomSearch, RomSearchIter};
#[cfg(feature = "thermo")]
pub use thermo::{Scratchpad, Temperature, MAX_CONVERSION_TIME_MS};
