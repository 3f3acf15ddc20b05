//! Two phase software pulse scheduler.
//!
//! A single worker thread drives the charging and discharging channels through the cycle
//! `charging on, dead band, discharging on, dead band`. Holds are waits on monotonic deadlines
//! accumulated from the first cycle, so the error of one hold does not carry into the next one.
//! Timing is best effort and bounded by the host's sleep granularity; this is not a hardware PWM.

use std::{
    fmt,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::{
    gpio::{set_all, ChannelBank, ChannelId, DigitalOut, DigitalOutError, Level, UnknownChannel},
    utils::notification::{Notification, Notifier},
};

use super::WaveformParameters;

pub const DEFAULT_WORKER_STACK_SIZE: usize = 7000;

/// Enums the different errors possible when working with the pulse scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    UnknownChannel(ChannelId),
    CouldNotSpawnWorker,
    SafetyResetFailed(DigitalOutError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::UnknownChannel(id) => write!(f, "Error: {id} is not connected"),
            SchedulerError::CouldNotSpawnWorker => write!(f, "Error: could not start switching"),
            SchedulerError::SafetyResetFailed(err) => write!(f, "Error: could not turn gates off: {err}"),
        }
    }
}

impl From<UnknownChannel> for SchedulerError {
    fn from(value: UnknownChannel) -> Self {
        SchedulerError::UnknownChannel(value.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

type Outputs = Vec<(ChannelId, DigitalOut)>;

/// One half of the cycle: the outputs raised and how long they are held high. A phase with a
/// zero duty cycle never raises its outputs.
struct Phase {
    outputs: Outputs,
    on_time: Duration,
    raised: bool,
}

struct PulsePattern {
    charging: Phase,
    discharging: Phase,
    dead_band: Duration,
    cycle: Duration,
}

/// The run currently owned by the scheduler
struct ActiveRun {
    parameters: WaveformParameters,
    stop: Notifier,
    handle: JoinHandle<()>,
    driven: Outputs,
}

/// Owns the run state of the pulse pattern. At most one worker exists at any time: starting a new
/// pattern stops the previous one first, and stopping drives every output the pattern used low.
pub struct PulseScheduler {
    channels: ChannelBank,
    stack_size: usize,
    active: Option<ActiveRun>,
}

impl PulseScheduler {
    pub fn new(channels: ChannelBank) -> PulseScheduler {
        PulseScheduler {
            channels,
            stack_size: DEFAULT_WORKER_STACK_SIZE,
            active: None,
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> PulseScheduler {
        self.stack_size = stack_size;
        self
    }

    pub fn state(&self) -> SchedulerState {
        match self.active {
            Some(_) => SchedulerState::Running,
            None => SchedulerState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Parameters of the pattern being driven, if any.
    pub fn parameters(&self) -> Option<&WaveformParameters> {
        self.active.as_ref().map(|run| &run.parameters)
    }

    /// Starts driving the pattern described by `parameters` on a background thread. Returns as
    /// soon as the worker is launched.
    ///
    /// If a pattern is already running it is stopped first, and its outputs are low before the
    /// new worker writes anything.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::UnknownChannel`: If a channel of the pattern has no output. Checked before
    ///   anything is stopped or written.
    /// - `SchedulerError::SafetyResetFailed`: If the previous pattern could not be turned off. The
    ///   new pattern is not started.
    /// - `SchedulerError::CouldNotSpawnWorker`: If the worker thread could not be created.
    pub fn start(&mut self, parameters: WaveformParameters) -> Result<(), SchedulerError> {
        let charging = self.channels.resolve(parameters.charging_channels())?;
        let discharging = self.channels.resolve(parameters.discharging_channels())?;

        if self.is_running() {
            info!("Superseding running pulse pattern");
            self.stop()?;
        }

        let driven = self.channels.resolve(&parameters.driven_channels())?;
        let pattern = PulsePattern {
            charging: Phase {
                outputs: charging,
                on_time: parameters.charging_time(),
                raised: parameters.charging_duty_cycle() > 0.0,
            },
            discharging: Phase {
                outputs: discharging,
                on_time: parameters.discharging_time(),
                raised: parameters.discharging_duty_cycle() > 0.0,
            },
            dead_band: parameters.dead_band(),
            cycle: parameters.cycle(),
        };

        let notification = Notification::new();
        let stop = notification.notifier();
        let handle = thread::Builder::new()
            .name("pulse-scheduler".to_string())
            .stack_size(self.stack_size)
            .spawn(move || run_pattern(pattern, notification))
            .map_err(|_| SchedulerError::CouldNotSpawnWorker)?;

        info!(
            "Switching started: {} Hz, dead band {:?}, charging {:?} on {:?}, discharging {:?} on {:?}",
            parameters.frequency_hz(),
            parameters.dead_band(),
            parameters.charging_time(),
            parameters.charging_channels(),
            parameters.discharging_time(),
            parameters.discharging_channels(),
        );

        self.active = Some(ActiveRun {
            parameters,
            stop,
            handle,
            driven,
        });
        Ok(())
    }

    /// Stops the running pattern and drives every output it used low. Stopping an idle scheduler
    /// does nothing.
    ///
    /// The outputs are driven low right away, without waiting for the worker to notice, and once
    /// more after the worker has exited. When this returns the worker is gone and no later write
    /// from it can happen.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SafetyResetFailed`: If an output could not be driven low. Every output is
    ///   still attempted, and the scheduler is idle regardless.
    pub fn stop(&mut self) -> Result<(), SchedulerError> {
        let Some(run) = self.active.take() else {
            return Ok(());
        };

        run.stop.notify();
        let immediate = set_all(run.driven.iter().map(|(id, out)| (*id, out)), Level::Low);
        if run.handle.join().is_err() {
            error!("Pulse scheduler worker panicked");
        }
        let after_exit = set_all(run.driven.iter().map(|(id, out)| (*id, out)), Level::Low);

        info!("Switching stopped");
        immediate.and(after_exit).map_err(SchedulerError::SafetyResetFailed)
    }
}

impl Drop for PulseScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("Could not stop switching on drop: {err}");
        }
    }
}

fn drive(outputs: &Outputs, level: Level) {
    for (id, out) in outputs {
        if let Err(err) = out.set_level(level) {
            warn!("{id}: could not set {level:?}: {err}");
        }
    }
}

/// Body of the worker thread. Returns once `stop` is notified.
fn run_pattern(pattern: PulsePattern, stop: Notification) {
    let mut deadline = Instant::now();
    loop {
        for phase in [&pattern.charging, &pattern.discharging] {
            if stop.is_notified() {
                return;
            }
            if phase.raised {
                drive(&phase.outputs, Level::High);
                deadline += phase.on_time;
                if stop.wait_until(deadline) {
                    return;
                }
                drive(&phase.outputs, Level::Low);
            }
            deadline += pattern.dead_band;
            if stop.wait_until(deadline) {
                return;
            }
        }

        let now = Instant::now();
        if now.saturating_duration_since(deadline) > pattern.cycle {
            debug!("Pulse scheduler fell behind by {:?}, resynchronizing", now - deadline);
            deadline = now;
        }
        if pattern.cycle.is_zero() {
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::microcontroller_src::{
        board::{Board, BoardConnector},
        simulated::{BoardProbe, LevelChange, SimulatedConnector},
    };
    use std::collections::{BTreeSet, HashSet};

    const GATE_PINS: [(u8, usize); 4] = [(1, 3), (2, 5), (3, 6), (4, 9)];

    fn initialize_test() -> (PulseScheduler, BoardProbe) {
        let mut connector = SimulatedConnector::new(["COM3"]);
        let probe = connector.probe();
        let mut board = connector.connect("COM3").unwrap();
        let mut bank = ChannelBank::new();
        for (id, pin) in GATE_PINS {
            bank.insert(ChannelId(id), board.set_pin_as_digital_out(pin).unwrap());
        }
        (PulseScheduler::new(bank), probe)
    }

    fn ids(ids: &[u8]) -> BTreeSet<ChannelId> {
        ids.iter().map(|id| ChannelId(*id)).collect()
    }

    fn pattern(frequency: f64, dead_band: f64, charging: &[u8], discharging: &[u8]) -> WaveformParameters {
        WaveformParameters::new(frequency, dead_band, 0.3, 0.3, ids(charging), ids(discharging)).unwrap()
    }

    fn all_writes(probe: &BoardProbe, pins: &[usize]) -> Vec<(usize, LevelChange)> {
        let mut writes: Vec<(usize, LevelChange)> = pins
            .iter()
            .flat_map(|pin| probe.history(*pin).into_iter().map(move |change| (*pin, change)))
            .collect();
        writes.sort_by_key(|(_, change)| change.seq);
        writes
    }

    #[test]
    fn stop_before_start_does_nothing() {
        let (mut scheduler, probe) = initialize_test();
        assert_eq!(scheduler.stop(), Ok(()));
        assert_eq!(scheduler.stop(), Ok(()));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        for (_, pin) in GATE_PINS {
            assert!(probe.history(pin).is_empty());
        }
    }

    #[test]
    fn stop_right_after_start_leaves_every_driven_channel_low() {
        let (mut scheduler, probe) = initialize_test();
        // one hertz: the worker is in the middle of a long hold when stop arrives
        scheduler.start(pattern(1.0, 0.0, &[1, 2], &[3])).unwrap();
        assert!(scheduler.is_running());
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        scheduler.stop().unwrap();
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        for pin in [3, 5, 6] {
            assert_eq!(probe.level(pin), Some(Level::Low));
        }
        assert!(probe.history(9).is_empty());
    }

    #[test]
    fn phases_alternate_and_never_overlap() {
        let (mut scheduler, probe) = initialize_test();
        scheduler.start(pattern(50.0, 0.001, &[1], &[2])).unwrap();
        thread::sleep(Duration::from_millis(250));
        scheduler.stop().unwrap();

        let charging_highs = probe.history(3).iter().filter(|c| c.level == Level::High).count();
        let discharging_highs = probe.history(5).iter().filter(|c| c.level == Level::High).count();
        assert!(charging_highs >= 3, "only {charging_highs} charging pulses");
        assert!(discharging_highs >= 3, "only {discharging_highs} discharging pulses");

        let (mut charging, mut discharging) = (Level::Low, Level::Low);
        for (pin, change) in all_writes(&probe, &[3, 5]) {
            match pin {
                3 => charging = change.level,
                _ => discharging = change.level,
            }
            assert!(!(charging == Level::High && discharging == Level::High));
        }
    }

    #[test]
    fn charging_phase_comes_first() {
        let (mut scheduler, probe) = initialize_test();
        scheduler.start(pattern(20.0, 0.0, &[1], &[2])).unwrap();
        thread::sleep(Duration::from_millis(60));
        scheduler.stop().unwrap();

        let writes = all_writes(&probe, &[3, 5]);
        assert_eq!(writes[0].0, 3);
        assert_eq!(writes[0].1.level, Level::High);
    }

    #[test]
    fn starting_twice_stops_the_first_worker_before_the_second_writes() {
        let (mut scheduler, probe) = initialize_test();
        scheduler.start(pattern(100.0, 0.0005, &[1], &[2])).unwrap();
        thread::sleep(Duration::from_millis(40));
        scheduler.start(pattern(100.0, 0.0005, &[1, 3], &[2])).unwrap();
        thread::sleep(Duration::from_millis(40));
        scheduler.stop().unwrap();

        let test_thread = thread::current().id();
        let writes = all_writes(&probe, &[3, 5, 6]);
        let workers: Vec<_> = writes
            .iter()
            .map(|(_, change)| change.thread)
            .filter(|thread| *thread != test_thread)
            .fold(Vec::new(), |mut seen, thread| {
                if !seen.contains(&thread) {
                    seen.push(thread);
                }
                seen
            });
        assert_eq!(workers.len(), 2);

        let last_of_first = writes.iter().filter(|(_, c)| c.thread == workers[0]).map(|(_, c)| c.seq).max().unwrap();
        let first_of_second = writes.iter().filter(|(_, c)| c.thread == workers[1]).map(|(_, c)| c.seq).min().unwrap();
        assert!(last_of_first < first_of_second);

        // every output of the first pattern was low when the second one started
        for pin in [3, 5] {
            let before_second = probe.history(pin).into_iter().filter(|c| c.seq < first_of_second).last().unwrap();
            assert_eq!(before_second.level, Level::Low);
        }
    }

    #[test]
    fn unknown_channel_is_rejected_without_touching_anything() {
        let (mut scheduler, probe) = initialize_test();
        assert_eq!(
            scheduler.start(pattern(10.0, 0.0, &[1], &[7])),
            Err(SchedulerError::UnknownChannel(ChannelId(7)))
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(probe.history(3).is_empty());
    }

    #[test]
    fn unknown_channel_does_not_stop_the_running_pattern() {
        let (mut scheduler, _probe) = initialize_test();
        let running = pattern(10.0, 0.0, &[1], &[2]);
        scheduler.start(running.clone()).unwrap();
        assert!(scheduler.start(pattern(10.0, 0.0, &[9], &[2])).is_err());
        assert_eq!(scheduler.parameters(), Some(&running));
        scheduler.stop().unwrap();
    }

    #[test]
    fn zero_duty_phase_never_goes_high() {
        let (mut scheduler, probe) = initialize_test();
        let params = WaveformParameters::new(50.0, 0.001, 0.0, 0.5, ids(&[1]), ids(&[2])).unwrap();
        scheduler.start(params).unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.stop().unwrap();

        assert!(probe.history(3).iter().all(|c| c.level == Level::Low));
        assert!(probe.history(5).iter().any(|c| c.level == Level::High));
    }

    #[test]
    fn overlapping_channel_is_driven_on_both_phases() {
        let (mut scheduler, probe) = initialize_test();
        scheduler.start(pattern(25.0, 0.001, &[1, 2], &[2])).unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.stop().unwrap();

        let highs = probe.history(5).iter().filter(|c| c.level == Level::High).count();
        let charging_highs = probe.history(3).iter().filter(|c| c.level == Level::High).count();
        assert!(highs > charging_highs);
    }

    #[test]
    fn failing_output_does_not_stop_the_pattern() {
        let (mut scheduler, probe) = initialize_test();
        probe.fail_writes(3);
        scheduler.start(pattern(50.0, 0.001, &[1], &[2])).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            scheduler.stop(),
            Err(SchedulerError::SafetyResetFailed(DigitalOutError::WriteFailed(3)))
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(probe.history(5).iter().filter(|c| c.level == Level::High).count() >= 2);
        assert_eq!(probe.level(5), Some(Level::Low));
    }

    #[test]
    fn dropping_a_running_scheduler_turns_outputs_off() {
        let (mut scheduler, probe) = initialize_test();
        scheduler.start(pattern(2.0, 0.0, &[1], &[2])).unwrap();
        thread::sleep(Duration::from_millis(20));
        drop(scheduler);
        assert_eq!(probe.level(3), Some(Level::Low));
        let workers: HashSet<_> = probe.history(3).into_iter().map(|c| c.thread).collect();
        assert!(workers.len() >= 2);
    }

    #[test]
    fn stop_during_discharging_leaves_every_driven_channel_low() {
        let (mut scheduler, probe) = initialize_test();
        // one hertz, 30% duty: discharging is high from 300 ms to 600 ms
        scheduler.start(pattern(1.0, 0.0, &[1], &[3])).unwrap();
        thread::sleep(Duration::from_millis(450));
        assert_eq!(probe.level(3), Some(Level::Low));
        assert_eq!(probe.level(6), Some(Level::High));

        let start = Instant::now();
        scheduler.stop().unwrap();
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(probe.level(3), Some(Level::Low));
        assert_eq!(probe.level(6), Some(Level::Low));
    }

    #[test]
    fn long_running_pattern_keeps_a_bounded_history() {
        let mut connector = SimulatedConnector::new(["COM3"]).with_history_limit(8);
        let probe = connector.probe();
        let mut board = connector.connect("COM3").unwrap();
        let mut bank = ChannelBank::new();
        bank.insert(ChannelId(1), board.set_pin_as_digital_out(3).unwrap());
        bank.insert(ChannelId(2), board.set_pin_as_digital_out(5).unwrap());
        let mut scheduler = PulseScheduler::new(bank);

        scheduler.start(pattern(500.0, 0.0001, &[1], &[2])).unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.stop().unwrap();

        for pin in [3, 5] {
            let history = probe.history(pin);
            assert!(history.len() <= 8, "{} writes kept on pin {pin}", history.len());
            assert!(history.last().is_some_and(|change| change.seq > 16));
            assert_eq!(probe.level(pin), Some(Level::Low));
        }
    }
}
