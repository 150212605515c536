//! Tests that verify the correctness of the [`TimerQueue`].
//!
//! To run these tests, you need to activate the `critical-section/std` feature.

use core::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};

use cassette::Cassette;
use futures_util::future::join;
use parking_lot::Mutex;
use relay_time::{TimeoutError, TimerQueue};

#[test]
fn timer_queue() {
    let queue: TimerQueue<u64, 8> = TimerQueue::new();
    let finished: Mutex<Vec<(u64, u64)>> = Mutex::new(Vec::new());

    let build_delay_test = |pre_delay: Option<u64>, delay: u64| {
        let total = pre_delay.unwrap_or(0) + delay;
        let queue = &queue;
        let finished = &finished;

        async move {
            // A `pre_delay` simulates a task that only gets to request its delay later.
            if let Some(pre_delay) = pre_delay {
                queue.delay_until(pre_delay).await;
            }

            queue.delay(delay).await;

            let elapsed = queue.now();
            println!("{total} ticks delay reached after {elapsed} ticks");
            finished.lock().push((total, elapsed));
        }
    };

    let d1 = pin!(build_delay_test(Some(100), 100));
    let mut d1 = Cassette::new(d1);
    let d2 = pin!(build_delay_test(None, 300));
    let mut d2 = Cassette::new(d2);
    let d3 = pin!(build_delay_test(None, 400));
    let mut d3 = Cassette::new(d3);

    macro_rules! poll {
        ($($fut:ident),*) => {
            $(if !$fut.is_done() {
                    $fut.poll_on();
            })*
        };
    }

    // Do an initial poll to set up all of the waiting futures
    poll!(d1, d2, d3);
    assert_eq!(queue.pending(), 3);

    for _ in 0..500 {
        // Only poll the waiting futures if the tick released something.
        if queue.advance() > 0 {
            poll!(d1, d2, d3);
        }

        if queue.now() == 150 {
            // The pre-delay was released and the 100 tick delay is queued in its place.
            assert_eq!(queue.pending(), 3);
        }

        if queue.now() == 350 {
            assert_eq!(queue.pending(), 1);
        }
    }

    assert!(d1.is_done() && d2.is_done() && d3.is_done());
    assert_eq!(queue.pending(), 0);

    for (total, elapsed) in finished.lock().iter() {
        assert_eq!(
            total, elapsed,
            "{total} ticks delay was not on time ({elapsed} ticks passed instead)"
        );
    }
}

#[test]
fn timeout_expires_exactly_at_the_deadline() {
    let queue: TimerQueue<u32, 4> = TimerQueue::new();

    let never = pin!(queue.timeout_after(5, core::future::pending::<()>()));
    let mut never = Cassette::new(never);

    assert!(never.poll_on().is_none());

    for tick in 1..=5 {
        queue.advance();
        let result = never.poll_on();

        if tick < 5 {
            assert!(result.is_none(), "timed out early at tick {tick}");
        } else {
            assert_eq!(result, Some(Err(TimeoutError)));
        }
    }

    // The wrapped future finishing in time wins.
    let in_time = pin!(queue.timeout_after(5, queue.delay(3)));
    let mut in_time = Cassette::new(in_time);
    assert!(in_time.poll_on().is_none());

    for _ in 0..3 {
        queue.advance();
    }
    assert_eq!(in_time.poll_on(), Some(Ok(())));
}

#[test]
fn poll_until_rechecks_every_tick() {
    let queue: TimerQueue<u32, 4> = TimerQueue::new();
    let ready = AtomicBool::new(false);

    let wait = pin!(queue.poll_until(10, || ready.load(Ordering::Relaxed)));
    let mut wait = Cassette::new(wait);
    assert!(wait.poll_on().is_none());

    for _ in 0..6 {
        queue.advance();
        assert!(wait.poll_on().is_none());
    }

    ready.store(true, Ordering::Relaxed);
    queue.advance();
    assert_eq!(wait.poll_on(), Some(Ok(())));
    assert_eq!(queue.now(), 7);
}

#[test]
fn poll_until_gives_up() {
    let queue: TimerQueue<u32, 4> = TimerQueue::new();

    let wait = pin!(queue.poll_until(3, || false));
    let mut wait = Cassette::new(wait);
    assert!(wait.poll_on().is_none());

    let mut result = None;
    while result.is_none() {
        queue.advance();
        result = wait.poll_on();
    }

    assert_eq!(result, Some(Err(TimeoutError)));
    assert_eq!(queue.now(), 3);
}

#[test]
fn joined_delays_share_the_clock() {
    let queue: TimerQueue<u32, 4> = TimerQueue::new();

    let both = pin!(join(queue.delay(2), queue.delay(5)));
    let mut both = Cassette::new(both);
    assert!(both.poll_on().is_none());
    assert_eq!(queue.pending(), 2);

    let mut ticks = 0;
    while !both.is_done() {
        queue.advance();
        ticks += 1;
        both.poll_on();
    }

    assert_eq!(ticks, 5);
}
