use core::fmt::Debug;

/// Error type
///
/// `E` is the error of the underlying pin implementation.
#[derive(Debug)]
pub enum Error<E: Sized + Debug> {
    /// Malformed request at the API boundary, e.g. an empty search buffer or
    /// the wildcard address where a concrete device address is required
    InvalidArgument,
    /// Wire stuck low
    WireFault,
    /// No presence pulse after a bus reset
    NoResponse,
    /// CRC-8 validation failed (computed, received)
    ///
    /// On a single-device operation such as read-ROM this is also the
    /// signature of several devices answering at once.
    CrcMismatch(u8, u8),
    /// More devices on the bus than the output buffer can hold; the first
    /// `n` entries written are still valid
    CapacityExceeded(usize),
    /// Recognized-but-unhandled or unknown device family code
    UnsupportedFamily(u8),
    /// A write could not be confirmed by the subsequent read-back
    VerifyFailed,
    /// Strong pull-up control pin failed
    PowerFault,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}
