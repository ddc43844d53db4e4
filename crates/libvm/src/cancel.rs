use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Shared switch that aborts timed waits.
///
/// Every [`Canceller::cancel`] bumps a shared counter. A canceller is
/// cancelled once the counter moved past the value it was created or
/// renewed at, so clones observe the same cancellations while a
/// [`Canceller::renew`]ed one only sees those that come after it.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    inner: Arc<(Mutex<u64>, Condvar)>,
    epoch: u64,
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn counter(&self) -> MutexGuard<'_, u64> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort every wait on this canceller and on those sharing it.
    pub fn cancel(&self) {
        let mut counter = self.counter();
        *counter = counter.wrapping_add(1);
        self.inner.1.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.counter() != self.epoch
    }

    /// Canceller sharing this one, blind to earlier cancellations.
    pub fn renew(&self) -> Self {
        Canceller {
            inner: self.inner.clone(),
            epoch: *self.counter(),
        }
    }

    /// Sleep for `timeout` unless cancelled first.
    ///
    /// Returns `true` if the wait ended because of cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counter = self.counter();
        while *counter == self.epoch {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            counter = self
                .inner
                .1
                .wait_timeout(counter, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *counter != self.epoch
    }
}
