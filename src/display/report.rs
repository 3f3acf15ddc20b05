use std::fmt;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub type StatusReceiver = UnboundedReceiver<StatusReport>;

/// Calibrated value of one monitored input
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageReading {
    pub label: String,
    pub volts: f64,
}

impl fmt::Display for VoltageReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2} V", self.label, self.volts)
    }
}

/// Everything the controller tells the operator
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    /// Connection status, or any other status line.
    Status(String),
    /// Why a requested action was refused.
    Rejected(String),
    Voltage(VoltageReading),
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Status(text) | StatusReport::Rejected(text) => write!(f, "{text}"),
            StatusReport::Voltage(reading) => write!(f, "{reading}"),
        }
    }
}

/// Sending half of the status channel. Reports sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct StatusSender {
    sender: UnboundedSender<StatusReport>,
}

impl StatusSender {
    pub fn report(&self, report: StatusReport) {
        if let Err(err) = self.sender.unbounded_send(report) {
            log::debug!("Status report dropped: {}", err.into_inner());
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        self.report(StatusReport::Status(text.into()))
    }

    pub fn rejected(&self, reason: impl fmt::Display) {
        self.report(StatusReport::Rejected(reason.to_string()))
    }
}

/// Creates the channel status reports are delivered on.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (sender, receiver) = mpsc::unbounded();
    (StatusSender { sender }, receiver)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn voltage_is_shown_with_two_decimals() {
        let reading = VoltageReading {
            label: "Battery".to_string(),
            volts: 12.3456,
        };
        assert_eq!(StatusReport::Voltage(reading).to_string(), "Battery: 12.35 V");
    }

    #[test]
    fn reports_arrive_in_order() {
        let (sender, mut receiver) = status_channel();
        sender.status("Connected to COM3");
        sender.rejected("Error: Dead band must be less than period");
        assert_eq!(
            receiver.try_next().unwrap(),
            Some(StatusReport::Status("Connected to COM3".to_string()))
        );
        assert_eq!(
            receiver.try_next().unwrap(),
            Some(StatusReport::Rejected("Error: Dead band must be less than period".to_string()))
        );
        assert!(receiver.try_next().is_err());
    }

    #[test]
    fn reporting_without_receiver_is_ignored() {
        let (sender, receiver) = status_channel();
        drop(receiver);
        sender.status("nobody listens");
    }
}
