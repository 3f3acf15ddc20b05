use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use super::notification::{Notification, Notifier};

const TIMER_STACK_SIZE: usize = 4096 * 4;

#[derive(Debug)]
pub enum TimerDriverError {
    InvalidInterval,
    CouldNotSpawnTimer,
}

/// Recurring timer running on its own thread. The callback is executed once every `interval`,
/// always on the same thread, so two executions never overlap. If a callback runs late the
/// missed ticks are dropped instead of being executed back to back.
///
/// The timer stops when [`TimerDriver::cancel`] is called or when the driver is dropped.
pub struct TimerDriver {
    name: String,
    notifier: Notifier,
    handle: Option<JoinHandle<()>>,
}

impl TimerDriver {
    /// Starts a timer that executes `callback` every `interval`. The first execution happens
    /// right away.
    ///
    /// # Arguments
    ///
    /// - `name`: Name of the timer thread, used on logs.
    /// - `interval`: Time between the start of two consecutive executions. Must not be zero.
    /// - `callback`: Closure executed on every tick.
    ///
    /// # Errors
    ///
    /// - `TimerDriverError::InvalidInterval`: If `interval` is zero.
    /// - `TimerDriverError::CouldNotSpawnTimer`: If the timer thread could not be created.
    pub fn interrupt_every<F>(name: &str, interval: Duration, mut callback: F) -> Result<TimerDriver, TimerDriverError>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(TimerDriverError::InvalidInterval);
        }

        let notification = Notification::new();
        let notifier = notification.notifier();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .stack_size(TIMER_STACK_SIZE)
            .spawn(move || {
                let mut next_tick = Instant::now();
                loop {
                    callback();
                    let (following, missed) = following_tick(next_tick + interval, Instant::now(), interval);
                    if missed > 0 {
                        log::debug!("{thread_name}: skipping {missed} late ticks");
                    }
                    next_tick = following;
                    if notification.wait_until(next_tick) {
                        break;
                    }
                }
            })
            .map_err(|_| TimerDriverError::CouldNotSpawnTimer)?;

        Ok(TimerDriver {
            name: name.to_string(),
            notifier,
            handle: Some(handle),
        })
    }

    /// Returns true while the timer keeps ticking.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the timer and waits for an in-flight callback to finish. Cancelling an already
    /// cancelled timer does nothing.
    pub fn cancel(&mut self) {
        self.notifier.notify();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{}: timer callback panicked", self.name);
            }
        }
    }
}

/// Returns the deadline of the next tick, given the deadline it was due at and the current time,
/// along with how many ticks were missed. When late, the timer restarts from `now`.
fn following_tick(due: Instant, now: Instant, interval: Duration) -> (Instant, u128) {
    if due >= now {
        return (due, 0);
    }
    let missed = (now - due).as_nanos() / interval.as_nanos() + 1;
    (now + interval, missed)
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.cancel()
    }
}
