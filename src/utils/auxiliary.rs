use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle to a value shared between the controlling thread and the background workers.
pub type SharableRef<T> = Arc<Mutex<T>>;

pub trait SharableRefExt<T> {
    fn new_sharable(inner: T) -> SharableRef<T>;

    /// Locks the shared value. A poisoned lock is recovered, the guarded values hold no
    /// invariant a panicking writer could leave half updated.
    fn lock_shared(&self) -> MutexGuard<'_, T>;
}

impl<T> SharableRefExt<T> for SharableRef<T> {
    fn new_sharable(inner: T) -> SharableRef<T> {
        Arc::new(Mutex::new(inner))
    }

    fn lock_shared(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
