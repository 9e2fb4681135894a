//! Injectable time and cancellation.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use time::OffsetDateTime;

use crate::{Error, Result};

/// Sleeps are cut into slices no longer than this so a cancel is noticed.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Source of "now" and a way to wait.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
    fn sleep(&self, dur: Duration);
}

/// Wall clock time and [`thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
    fn sleep(&self, dur: Duration) {
        thread::sleep(dur)
    }
}

/// Cancellation flag plus an optional deadline.
///
/// Clones share the flag, so one handle can be given to a provider call and
/// another kept to cancel it.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
    deadline: Option<OffsetDateTime>,
}

impl Cancel {
    /// Never cancelled unless [`cancel`](#method.cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expires at `deadline` as seen by the clock in use.
    pub fn with_deadline(deadline: OffsetDateTime) -> Self {
        Cancel {
            deadline: Some(deadline),
            ..Default::default()
        }
    }

    /// Expires `timeout` from now.
    pub fn with_timeout(clock: &dyn Clock, timeout: Duration) -> Self {
        Self::with_deadline(clock.now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<OffsetDateTime> {
        self.deadline
    }

    /// `Cancelled` if cancelled, `Timeout` if past the deadline.
    pub fn check(&self, clock: &dyn Clock) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if clock.now() >= deadline {
                return Err(Error::Timeout("deadline".into()));
            }
        }
        Ok(())
    }

    /// Sleep `dur` in slices, checking between each.
    pub fn sleep(&self, clock: &dyn Clock, dur: Duration) -> Result<()> {
        let mut left = dur;
        while !left.is_zero() {
            self.check(clock)?;
            let slice = left.min(SLEEP_SLICE);
            clock.sleep(slice);
            left -= slice;
        }
        self.check(clock)
    }
}
