//! Bounded busy-wait polling.
//!
//! Hardware status flags (calibration done, conversion ready, transmit empty) are polled with an
//! explicit budget instead of an open loop. For waits measured in ticks, use
//! [`TimerQueue::poll_until`](crate::TimerQueue::poll_until), which suspends between checks.

use crate::TimeoutError;

/// Poll `condition` up to `budget` times, spinning in between.
///
/// Returns the number of polls it took for the condition to hold.
pub fn spin_until<C>(budget: u32, mut condition: C) -> Result<u32, TimeoutError>
where
    C: FnMut() -> bool,
{
    for attempt in 1..=budget {
        if condition() {
            return Ok(attempt);
        }
        core::hint::spin_loop();
    }

    Err(TimeoutError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_the_attempt_that_succeeded() {
        let mut reads = 0;
        let polls = spin_until(10, || {
            reads += 1;
            reads == 4
        });

        assert_eq!(polls, Ok(4));
    }

    #[test]
    fn gives_up_after_the_budget() {
        let mut reads = 0;
        let result = spin_until(5, || {
            reads += 1;
            false
        });

        assert_eq!(result, Err(TimeoutError));
        assert_eq!(reads, 5);
    }

    #[test]
    fn zero_budget_never_polls() {
        assert_eq!(spin_until(0, || true), Err(TimeoutError));
    }
}
