mod calibration;
mod poller;
mod report;

pub use {calibration::*, poller::*, report::*};
