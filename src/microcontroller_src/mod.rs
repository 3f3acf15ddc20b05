pub mod board;
#[cfg(feature = "esp32")]
pub mod esp32;
pub mod gate_controller;
pub mod peripherals;
pub mod simulated;

pub use self::gate_controller::GateController;
