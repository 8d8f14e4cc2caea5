//! Cooperative cancellation shared by every blocking step of a validation.
//!
//! A [`CancellationToken`] is checked between SMTP/DNS steps, caps every
//! socket timeout by its optional deadline, and interrupts sockets that are
//! registered with it so a blocked read returns as soon as the token fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Callback that aborts an in-flight socket operation.
pub type Interrupter = Box<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
    deadline: Option<Instant>,
    interrupters: Mutex<Vec<(u64, Interrupter)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that behaves as cancelled once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: Some(deadline),
                ..Inner::default()
            }),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Fires the token: wakes sleepers and interrupts registered sockets.
    pub fn cancel(&self) {
        {
            let mut cancelled = self.inner.cancelled.lock();
            if *cancelled {
                return;
            }
            *cancelled = true;
        }
        self.inner.wakeup.notify_all();
        for (_, interrupt) in self.inner.interrupters.lock().iter() {
            interrupt();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.inner.cancelled.lock() {
            return true;
        }
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Caps `timeout` by the time left before the deadline. `None` means the
    /// token is already cancelled or expired.
    pub fn bounded(&self, timeout: Duration) -> Option<Duration> {
        if self.is_cancelled() {
            return None;
        }
        match self.inner.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    None
                } else {
                    Some(timeout.min(left))
                }
            }
            None => Some(timeout),
        }
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` when the
    /// sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let Some(duration) = self.bounded(duration) else {
            return false;
        };
        let until = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.wakeup.wait_until(&mut cancelled, until).timed_out() {
                break;
            }
        }
        drop(cancelled);
        !self.is_cancelled()
    }

    /// Registers `interrupt` until the returned guard is dropped. If the token
    /// already fired, the callback runs immediately.
    pub fn register(&self, interrupt: Interrupter) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut interrupters = self.inner.interrupters.lock();
        if *self.inner.cancelled.lock() {
            interrupt();
        }
        interrupters.push((id, interrupt));
        drop(interrupters);
        Registration {
            token: self.clone(),
            id,
        }
    }
}

#[must_use = "dropping the registration unregisters the interrupter"]
pub struct Registration {
    token: CancellationToken,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.token
            .inner
            .interrupters
            .lock()
            .retain(|(id, _)| *id != self.id);
    }
}
