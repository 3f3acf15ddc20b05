use crate::{
    microcontroller_src::{board::OutputPin, peripherals::PeripheralError},
    utils::auxiliary::{SharableRef, SharableRefExt},
};
use sharable_reference_macro::sharable_reference_wrapper;
use std::{fmt, ops::Not};

/// Level of a digital output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(value: Level) -> Self {
        value == Level::High
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Self::Output {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Enums the different errors possible when working with a digital output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigitalOutError {
    CannotSetPinAsOutput,
    InvalidPin,
    InvalidPeripheral(PeripheralError),
    WriteFailed(usize),
}

impl fmt::Display for DigitalOutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitalOutError::CannotSetPinAsOutput => write!(f, "pin cannot be set as output"),
            DigitalOutError::InvalidPin => write!(f, "invalid pin"),
            DigitalOutError::InvalidPeripheral(err) => write!(f, "invalid peripheral: {err:?}"),
            DigitalOutError::WriteFailed(pin_num) => write!(f, "could not write pin {pin_num}"),
        }
    }
}

impl From<PeripheralError> for DigitalOutError {
    fn from(value: PeripheralError) -> Self {
        DigitalOutError::InvalidPeripheral(value)
    }
}

/// Driver to handle a digital output for a particular Pin
/// - `pin_num`: Number of the pin on the board.
/// - `pin`: The board output the levels are written to.
/// - `level`: Last level successfully commanded. The hardware holds the true state.
struct _DigitalOut {
    pin_num: usize,
    pin: Box<dyn OutputPin>,
    level: Level,
}

/// Driver to handle a digital output for a particular Pin. Clones refer to the same output, and
/// writes coming from different threads are serialized.
#[derive(Clone)]
pub struct DigitalOut {
    inner: SharableRef<_DigitalOut>,
}

#[sharable_reference_wrapper]
impl _DigitalOut {
    fn new(pin_num: usize, pin: Box<dyn OutputPin>) -> _DigitalOut {
        _DigitalOut {
            pin_num,
            pin,
            level: Level::Low,
        }
    }

    pub fn pin_num(&self) -> usize {
        self.pin_num
    }

    /// Sets the pin level to either `High` or `Low`.
    ///
    /// # Errors
    ///
    /// Whatever error the board reports for the write. The recorded level is left unchanged.
    pub fn set_level(&mut self, level: Level) -> Result<(), DigitalOutError> {
        self.pin.write(level)?;
        self.level = level;
        Ok(())
    }

    /// Gets the last level commanded to the pin.
    pub fn get_level(&self) -> Level {
        self.level
    }

    pub fn set_high(&mut self) -> Result<(), DigitalOutError> {
        self.set_level(Level::High)
    }

    pub fn set_low(&mut self) -> Result<(), DigitalOutError> {
        self.set_level(Level::Low)
    }

    /// Changes the pin level.
    pub fn toggle(&mut self) -> Result<(), DigitalOutError> {
        self.set_level(!self.level)
    }
}

impl DigitalOut {
    pub fn new<P: OutputPin + 'static>(pin_num: usize, pin: P) -> DigitalOut {
        DigitalOut {
            inner: SharableRef::new_sharable(_DigitalOut::new(pin_num, Box::new(pin))),
        }
    }
}

impl fmt::Debug for DigitalOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock_shared();
        f.debug_struct("DigitalOut")
            .field("pin_num", &inner.pin_num)
            .field("level", &inner.level)
            .finish()
    }
}
