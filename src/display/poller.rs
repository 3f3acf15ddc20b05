use std::{fmt, time::Duration};

use log::debug;

use crate::{
    gpio::AnalogIn,
    utils::{
        auxiliary::{SharableRef, SharableRefExt},
        timer_driver::{TimerDriver, TimerDriverError},
    },
};

use super::{Calibration, StatusReport, StatusSender, VoltageReading};

/// An analog input shown on the display
/// - `label`: Name shown next to the value.
/// - `pin_num`: Analog pin of the board.
/// - `calibration`: Conversion from normalized reading to volts.
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageInput {
    pub label: String,
    pub pin_num: usize,
    pub calibration: Calibration,
}

/// Last value shown for each monitored input, in the order the inputs were given. An input that
/// never reported a sample has no value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoltageDisplay {
    entries: Vec<(String, Option<f64>)>,
}

impl VoltageDisplay {
    fn new(labels: impl Iterator<Item = String>) -> VoltageDisplay {
        VoltageDisplay {
            entries: labels.map(|label| (label, None)).collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(entry_label, _)| entry_label == label)
            .and_then(|(_, volts)| *volts)
    }

    pub fn readings(&self) -> impl Iterator<Item = VoltageReading> + '_ {
        self.entries.iter().filter_map(|(label, volts)| {
            volts.map(|volts| VoltageReading {
                label: label.clone(),
                volts,
            })
        })
    }
}

impl fmt::Display for VoltageDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, volts) in &self.entries {
            match volts {
                Some(volts) => writeln!(f, "{label}: {volts:.2} V")?,
                None => writeln!(f, "{label}: -- V")?,
            }
        }
        Ok(())
    }
}

struct MonitoredInput {
    label: String,
    calibration: Calibration,
    input: AnalogIn,
}

/// Periodically reads the monitored inputs, converts them to volts and reports them. Each tick is
/// a bounded read, convert and report; ticks never overlap. Polling ends when the poller is
/// stopped or dropped.
pub struct DisplayPoller {
    timer: TimerDriver,
    display: SharableRef<VoltageDisplay>,
}

impl DisplayPoller {
    /// Starts polling every `interval`, beginning right away.
    ///
    /// # Arguments
    ///
    /// - `inputs`: Each monitored input along with the analog input it is read from.
    /// - `interval`: Time between two polls.
    /// - `reporter`: Where calibrated values are reported.
    ///
    /// # Errors
    ///
    /// Any `TimerDriverError` raised when creating the polling timer.
    pub fn start(
        inputs: Vec<(VoltageInput, AnalogIn)>,
        interval: Duration,
        reporter: StatusSender,
    ) -> Result<DisplayPoller, TimerDriverError> {
        let display = SharableRef::new_sharable(VoltageDisplay::new(
            inputs.iter().map(|(config, _)| config.label.clone()),
        ));
        let mut monitored: Vec<MonitoredInput> = inputs
            .into_iter()
            .map(|(config, input)| MonitoredInput {
                label: config.label,
                calibration: config.calibration,
                input,
            })
            .collect();

        let display_ref = display.clone();
        let timer = TimerDriver::interrupt_every("display-poller", interval, move || {
            poll_inputs(&mut monitored, &display_ref, &reporter)
        })?;

        Ok(DisplayPoller { timer, display })
    }

    /// Returns a copy of the values currently shown.
    pub fn display(&self) -> VoltageDisplay {
        self.display.lock_shared().clone()
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_active()
    }

    /// Stops polling. The shown values are kept.
    pub fn stop(&mut self) {
        self.timer.cancel()
    }
}

/// Reads every input once. Inputs without a sample keep their previous value and are not
/// reported.
fn poll_inputs(inputs: &mut [MonitoredInput], display: &SharableRef<VoltageDisplay>, reporter: &StatusSender) {
    for (index, monitored) in inputs.iter_mut().enumerate() {
        let Some(reading) = monitored.input.read_normalized() else {
            debug!("{}: no sample yet", monitored.label);
            continue;
        };
        let volts = monitored.calibration.apply(reading as f64);
        if let Some(entry) = display.lock_shared().entries.get_mut(index) {
            entry.1 = Some(volts);
        }
        reporter.report(StatusReport::Voltage(VoltageReading {
            label: monitored.label.clone(),
            volts,
        }));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        display::{status_channel, StatusReceiver, BATTERY_CALIBRATION, SUPERCAP_3V_CALIBRATION, SUPERCAP_9V_CALIBRATION},
        microcontroller_src::{
            board::{Board, BoardConnector},
            simulated::{BoardProbe, SimulatedConnector},
        },
    };
    use std::thread;

    const LABELS: [&str; 3] = ["9V Super Capacitor", "3V Super Capacitor", "Battery"];

    fn initialize_test(interval: Duration) -> (DisplayPoller, BoardProbe, StatusReceiver) {
        let mut connector = SimulatedConnector::new(["COM3"]);
        let probe = connector.probe();
        let mut board = connector.connect("COM3").unwrap();
        let calibrations = [SUPERCAP_9V_CALIBRATION, SUPERCAP_3V_CALIBRATION, BATTERY_CALIBRATION];
        let inputs = LABELS
            .iter()
            .zip(calibrations)
            .enumerate()
            .map(|(pin_num, (label, calibration))| {
                let config = VoltageInput {
                    label: label.to_string(),
                    pin_num,
                    calibration,
                };
                (config, board.set_pin_as_analog_in(pin_num).unwrap())
            })
            .collect();
        let (sender, receiver) = status_channel();
        let poller = DisplayPoller::start(inputs, interval, sender).unwrap();
        (poller, probe, receiver)
    }

    fn drain(receiver: &mut StatusReceiver) -> Vec<String> {
        let mut reports = Vec::new();
        while let Ok(Some(report)) = receiver.try_next() {
            reports.push(report.to_string());
        }
        reports
    }

    #[test]
    fn calibrated_values_are_reported() {
        let (mut poller, probe, mut receiver) = initialize_test(Duration::from_millis(5));
        probe.set_analog(0, Some(0.2));
        probe.set_analog(1, Some(1.0));
        probe.set_analog(2, Some(0.2));
        thread::sleep(Duration::from_millis(40));
        poller.stop();

        let reports = drain(&mut receiver);
        assert!(reports.contains(&"9V Super Capacitor: 5.00 V".to_string()));
        assert!(reports.contains(&"3V Super Capacitor: 3.33 V".to_string()));
        assert!(reports.contains(&"Battery: 5.00 V".to_string()));
        assert_eq!(
            poller.display().to_string(),
            "9V Super Capacitor: 5.00 V\n3V Super Capacitor: 3.33 V\nBattery: 5.00 V\n"
        );
    }

    #[test]
    fn missing_sample_keeps_previous_value() {
        let (mut poller, probe, mut receiver) = initialize_test(Duration::from_millis(5));
        probe.set_analog(2, Some(0.5));
        thread::sleep(Duration::from_millis(30));
        probe.set_analog(2, None);
        thread::sleep(Duration::from_millis(15));
        drain(&mut receiver);
        thread::sleep(Duration::from_millis(30));
        poller.stop();

        assert!(drain(&mut receiver).is_empty());
        let display = poller.display();
        assert_eq!(display.get("Battery"), Some(12.5));
        assert_eq!(display.get("9V Super Capacitor"), None);
        assert!(display.to_string().starts_with("9V Super Capacitor: -- V\n"));
    }

    #[test]
    fn stopped_poller_reports_nothing_else() {
        let (mut poller, probe, mut receiver) = initialize_test(Duration::from_millis(5));
        poller.stop();
        assert!(!poller.is_polling());
        assert!(drain(&mut receiver).is_empty());

        probe.set_analog(0, Some(0.4));
        thread::sleep(Duration::from_millis(20));
        assert!(drain(&mut receiver).is_empty());
    }
}
