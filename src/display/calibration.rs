/// Converts a normalized analog reading into volts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calibration {
    /// `volts = gain * r`
    Linear { gain: f64 },
    /// `volts = a3 * r^3 + a2 * r^2 + a1 * r`
    Cubic { a3: f64, a2: f64, a1: f64 },
}

/// Divider in front of the 9V super capacitor input
pub const SUPERCAP_9V_CALIBRATION: Calibration = Calibration::Linear { gain: 25.0 };

/// Cubic fit of the 3V super capacitor input
pub const SUPERCAP_3V_CALIBRATION: Calibration = Calibration::Cubic {
    a3: 2.5897,
    a2: -4.8153,
    a1: 5.6571,
};

pub const BATTERY_CALIBRATION: Calibration = Calibration::Linear { gain: 25.0 };

impl Calibration {
    pub fn apply(&self, reading: f64) -> f64 {
        match *self {
            Calibration::Linear { gain } => gain * reading,
            Calibration::Cubic { a3, a2, a1 } => ((a3 * reading + a2) * reading + a1) * reading,
        }
    }
}
