use crate::microcontroller_src::{board::AnalogSampler, peripherals::PeripheralError};
use std::fmt;

/// Enums the different errors possible when working with the analog in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalogInError {
    ChannelCreationError,
    ErrorReading,
    InvalidPeripheral(PeripheralError),
    InvalidPin,
}

impl fmt::Display for AnalogInError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalogInError::ChannelCreationError => write!(f, "analog channel could not be created"),
            AnalogInError::ErrorReading => write!(f, "analog pin could not be read"),
            AnalogInError::InvalidPeripheral(err) => write!(f, "invalid peripheral: {err:?}"),
            AnalogInError::InvalidPin => write!(f, "invalid analog pin"),
        }
    }
}

impl From<PeripheralError> for AnalogInError {
    fn from(value: PeripheralError) -> Self {
        AnalogInError::InvalidPeripheral(value)
    }
}

/// Driver for receiving analog inputs from a particular pin
/// - `pin_num`: Number of the analog pin on the board
/// - `sampler`: The board input the samples are read from
pub struct AnalogIn {
    pin_num: usize,
    sampler: Box<dyn AnalogSampler>,
}

impl AnalogIn {
    pub fn new<S: AnalogSampler + 'static>(pin_num: usize, sampler: S) -> AnalogIn {
        AnalogIn {
            pin_num,
            sampler: Box::new(sampler),
        }
    }

    pub fn pin_num(&self) -> usize {
        self.pin_num
    }

    /// Returns the most recent sample of the pin scaled to [0, 1].
    ///
    /// # Returns
    ///
    /// `None` if the board has not reported a sample yet. Samples out of range are clamped, and
    /// a NaN sample is treated as missing.
    pub fn read_normalized(&mut self) -> Option<f32> {
        self.sampler
            .read_normalized()
            .filter(|value| !value.is_nan())
            .map(|value| value.clamp(0.0, 1.0))
    }

    /// Reads multiple times from the analog pin and returns the average of the samples that were
    /// present. It is used to get a more stable value from the analog pin.
    ///
    /// # Returns
    ///
    /// `None` if no sample was present on any of the reads.
    pub fn smooth_read(&mut self, amount_of_samples: u16) -> Option<f32> {
        let (sum, present) = (0..amount_of_samples)
            .filter_map(|_| self.read_normalized())
            .fold((0.0f32, 0u16), |(sum, present), value| (sum + value, present + 1));
        (present > 0).then(|| sum / present as f32)
    }
}

impl fmt::Debug for AnalogIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalogIn").field("pin_num", &self.pin_num).finish()
    }
}
