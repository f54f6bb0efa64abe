use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Open-drain view of the 1-Wire data line.
///
/// The bus idles high through an external pull-up resistor. The master only
/// ever pulls the line to ground or lets it float; `release` must put the pin
/// into a state where other devices can drive it low.
pub trait OpenDrainLine {
    type Error: Error;

    /// Actively drives the line to ground.
    fn drive_low(&mut self) -> Result<(), Self::Error>;

    /// Stops driving the line, letting the pull-up (or a device) set the level.
    fn release(&mut self) -> Result<(), Self::Error>;

    /// Samples the line level.
    ///
    /// *NOTE* only meaningful while the line is released.
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Samples the line level.
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Single bidirectional pin configured as open-drain output
impl<IO> OpenDrainLine for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

/// Split line: separate sense input and low-side driver output
impl<E, I, O> OpenDrainLine for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

/// Adapter for transceivers that invert the line level
pub struct Inverted<P>(pub P);

impl<I: ErrorType> ErrorType for Inverted<I> {
    type Error = I::Error;
}

impl<I> InputPin for Inverted<I>
where
    I: InputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

impl<O> OutputPin for Inverted<O>
where
    O: OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}
