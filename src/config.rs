use std::time::Duration;

use crate::{
    display::{VoltageInput, BATTERY_CALIBRATION, SUPERCAP_3V_CALIBRATION, SUPERCAP_9V_CALIBRATION},
    gpio::ChannelId,
    pulse::DEFAULT_WORKER_STACK_SIZE,
};

/// Gate number and the digital pin it is wired to
const GATE_PINS: [(u8, usize); 5] = [(1, 3), (2, 5), (3, 6), (4, 9), (5, 10)];
const DISPLAY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const PORT_PREFIX: &str = "COM";

/// Wiring and timing of the gate controller board
/// - `gate_pins`: Gate id and digital pin of every output, created on initialization.
/// - `voltage_inputs`: Analog inputs shown on the display.
/// - `display_poll_interval`: Time between two display polls.
/// - `port_prefix`: Prepended to the port number the operator enters.
/// - `scheduler_stack_size`: Stack size of the pulse scheduler worker.
#[derive(Debug, Clone, PartialEq)]
pub struct GateControllerConfig {
    pub gate_pins: Vec<(ChannelId, usize)>,
    pub voltage_inputs: Vec<VoltageInput>,
    pub display_poll_interval: Duration,
    pub port_prefix: String,
    pub scheduler_stack_size: usize,
}

impl GateControllerConfig {
    /// Full port name for what the operator typed, `3` becomes `COM3`.
    pub fn port_name(&self, port: &str) -> String {
        format!("{}{}", self.port_prefix, port.trim())
    }
}

impl Default for GateControllerConfig {
    fn default() -> Self {
        GateControllerConfig {
            gate_pins: GATE_PINS.iter().map(|(id, pin)| (ChannelId(*id), *pin)).collect(),
            voltage_inputs: vec![
                VoltageInput {
                    label: "9V Super Capacitor".to_string(),
                    pin_num: 0,
                    calibration: SUPERCAP_9V_CALIBRATION,
                },
                VoltageInput {
                    label: "3V Super Capacitor".to_string(),
                    pin_num: 1,
                    calibration: SUPERCAP_3V_CALIBRATION,
                },
                VoltageInput {
                    label: "Battery".to_string(),
                    pin_num: 2,
                    calibration: BATTERY_CALIBRATION,
                },
            ],
            display_poll_interval: DISPLAY_POLL_INTERVAL,
            port_prefix: PORT_PREFIX.to_string(),
            scheduler_stack_size: DEFAULT_WORKER_STACK_SIZE,
        }
    }
}
