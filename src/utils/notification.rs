use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::Instant,
};

/// One-shot signal a background worker waits on. Once notified it stays notified, so a worker
/// that checks after the notification was sent still sees it.
pub struct Notification {
    notif: Arc<Signal>,
}

/// Sending half of a [`Notification`]. Can be cloned and moved to other threads.
#[derive(Clone)]
pub struct Notifier {
    notif: Arc<Signal>,
}

struct Signal {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Notification {
    pub fn new() -> Self {
        Self {
            notif: Arc::new(Signal {
                notified: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn notifier(&self) -> Notifier {
        Notifier::from(self)
    }

    /// Returns true if a notification was sent.
    pub fn is_notified(&self) -> bool {
        *self.notif.notified.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `deadline` is reached or a notification arrives, whichever happens first.
    ///
    /// # Returns
    ///
    /// `true` if the wait ended because of a notification, `false` if the deadline passed.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut notified = self.notif.notified.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *notified {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            notified = self
                .notif
                .condvar
                .wait_timeout(notified, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&Notification> for Notifier {
    fn from(value: &Notification) -> Self {
        Self {
            notif: value.notif.clone(),
        }
    }
}

impl Notifier {
    pub fn notify(&self) {
        let mut notified = self.notif.notified.lock().unwrap_or_else(PoisonError::into_inner);
        *notified = true;
        self.notif.condvar.notify_all();
    }
}
