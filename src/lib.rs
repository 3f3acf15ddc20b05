mod microcontroller_src;
mod utils;

pub mod config;
pub mod control;
pub mod display;
pub mod gpio;
pub mod pulse;

#[cfg(feature = "esp32")]
pub use microcontroller_src::esp32;
pub use microcontroller_src::{board, peripherals, simulated, GateController};
pub use utils::gate_controller_error::{self, GateControllerError};
pub use utils::timer_driver;
pub use config::GateControllerConfig;
