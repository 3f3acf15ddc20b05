pub mod auxiliary;
pub mod gate_controller_error;
pub mod notification;
pub mod timer_driver;
