//! Polling a remote resource until it reaches a terminal state.
use std::time::Duration;

use crate::clock::{Cancel, Clock};
use crate::{Error, Result};

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState<T> {
    /// Not done yet, poll again.
    Pending,
    /// Done, with the value to return.
    Issued(T),
    /// The remote gave up. Carries the reason.
    Failed(String),
}

/// Repeats a check with a fixed interval between attempts.
///
/// Ends on `Issued` (ok), `Failed` (`IssuanceFailed`), running out of
/// attempts (`Timeout`), or the [`Cancel`] firing.
pub struct Poller<'a> {
    clock: &'a dyn Clock,
    cancel: &'a Cancel,
    interval: Duration,
    max_attempts: u32,
    what: &'static str,
}

impl<'a> Poller<'a> {
    pub fn new(
        clock: &'a dyn Clock,
        cancel: &'a Cancel,
        interval: Duration,
        max_attempts: u32,
        what: &'static str,
    ) -> Self {
        Poller {
            clock,
            cancel,
            interval,
            max_attempts,
            what,
        }
    }

    /// Run `check` (called with the 1-based attempt number) to completion.
    pub fn run<T, F>(&self, mut check: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<PollState<T>>,
    {
        for attempt in 1..=self.max_attempts {
            self.cancel.check(self.clock)?;
            match check(attempt)? {
                PollState::Issued(v) => return Ok(v),
                PollState::Failed(reason) => return Err(Error::IssuanceFailed(reason)),
                PollState::Pending => {
                    trace!("{} pending (attempt {})", self.what, attempt);
                }
            }
            if attempt < self.max_attempts {
                self.cancel.sleep(self.clock, self.interval)?;
            }
        }
        Err(Error::Timeout(self.what.to_string()))
    }
}
