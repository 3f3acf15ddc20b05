use std::fmt;

use crate::gpio::{AnalogIn, AnalogInError, DigitalOut, DigitalOutError, Level};

/// Raw digital output of a board. Writes are fire and forget: an `Ok` only means the command was
/// handed to the hardware.
pub trait OutputPin: Send {
    fn write(&mut self, level: Level) -> Result<(), DigitalOutError>;
}

/// Raw analog input of a board.
pub trait AnalogSampler: Send {
    /// Returns the most recent sample scaled to [0, 1], or `None` if the board has not reported
    /// one yet. Must not block.
    fn read_normalized(&mut self) -> Option<f32>;
}

/// A connected board, handing out its pins. Each pin can be taken once. The board stays on the
/// thread that connected it, only the pins it hands out move to other threads.
pub trait Board {
    fn set_pin_as_digital_out(&mut self, pin_num: usize) -> Result<DigitalOut, DigitalOutError>;

    fn set_pin_as_analog_in(&mut self, pin_num: usize) -> Result<AnalogIn, AnalogInError>;
}

/// Opens a connection with a board.
pub trait BoardConnector {
    type Board: Board + 'static;

    fn connect(&mut self, port: &str) -> Result<Self::Board, ConnectionError>;
}

/// Enums the different errors possible when connecting to a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    PortNotFound(String),
    HandshakeFailed { port: String, reason: String },
    PeripheralsAlreadyTaken(String),
}

impl ConnectionError {
    pub fn port(&self) -> &str {
        match self {
            ConnectionError::PortNotFound(port) => port,
            ConnectionError::HandshakeFailed { port, .. } => port,
            ConnectionError::PeripheralsAlreadyTaken(port) => port,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to connect to {}", self.port())
    }
}
