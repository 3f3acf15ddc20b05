use std::fmt;

use crate::{
    control::ManualControlError,
    gpio::{AnalogInError, DigitalOutError},
    microcontroller_src::board::ConnectionError,
    pulse::{SchedulerError, WaveformError},
    utils::timer_driver::TimerDriverError,
};

#[derive(Debug)]
pub enum GateControllerError {
    NotConnected,
    AnalogInError(AnalogInError),
    ConnectionError(ConnectionError),
    DigitalOutError(DigitalOutError),
    ManualControlError(ManualControlError),
    SchedulerError(SchedulerError),
    TimerDriverError(TimerDriverError),
    WaveformError(WaveformError),
}

impl fmt::Display for GateControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateControllerError::NotConnected => write!(f, "Enter a port and click Initialize"),
            GateControllerError::AnalogInError(err) => write!(f, "Error: {err}"),
            GateControllerError::ConnectionError(err) => write!(f, "{err}"),
            GateControllerError::DigitalOutError(err) => write!(f, "Error: {err}"),
            GateControllerError::ManualControlError(err) => write!(f, "{err}"),
            GateControllerError::SchedulerError(err) => write!(f, "{err}"),
            GateControllerError::TimerDriverError(err) => write!(f, "Error: display timer: {err:?}"),
            GateControllerError::WaveformError(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GateControllerError {}

impl From<AnalogInError> for GateControllerError {
    fn from(value: AnalogInError) -> Self {
        GateControllerError::AnalogInError(value)
    }
}

impl From<ConnectionError> for GateControllerError {
    fn from(value: ConnectionError) -> Self {
        GateControllerError::ConnectionError(value)
    }
}

impl From<DigitalOutError> for GateControllerError {
    fn from(value: DigitalOutError) -> Self {
        GateControllerError::DigitalOutError(value)
    }
}

impl From<ManualControlError> for GateControllerError {
    fn from(value: ManualControlError) -> Self {
        GateControllerError::ManualControlError(value)
    }
}

impl From<SchedulerError> for GateControllerError {
    fn from(value: SchedulerError) -> Self {
        GateControllerError::SchedulerError(value)
    }
}

impl From<TimerDriverError> for GateControllerError {
    fn from(value: TimerDriverError) -> Self {
        GateControllerError::TimerDriverError(value)
    }
}

impl From<WaveformError> for GateControllerError {
    fn from(value: WaveformError) -> Self {
        GateControllerError::WaveformError(value)
    }
}
