//! Blocking semaphore waits through the kernel.
//!
//! To run these tests, you need to activate the `critical-section/std` feature.

use parking_lot::Mutex;
use relay::{
    GiveOutcome, Kernel, KernelConfig, Semaphore, TaskConfig, TimeoutError, Wait,
};

type Results = Mutex<Vec<(Result<(), TimeoutError>, u32)>>;

fn kernel() -> &'static Kernel {
    Box::leak(Box::new(Kernel::new(KernelConfig::new())))
}

fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

#[test]
fn take_gives_up_after_the_timeout() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let results: &'static Results = leak(Mutex::new(Vec::new()));

    k.spawn(
        TaskConfig::new("waiter", 1),
        leak(async move {
            loop {
                let r = k.take(sem, Wait::Ticks(5)).await;
                results.lock().push((r, k.now()));
            }
        }),
    )
    .unwrap();

    k.start().unwrap();
    k.run_for(4);
    assert!(results.lock().is_empty());

    k.run_for(1);
    assert_eq!(*results.lock(), vec![(Err(TimeoutError), 5)]);

    k.run_for(5);
    assert_eq!(results.lock().last(), Some(&(Err(TimeoutError), 10)));
}

#[test]
fn give_before_the_deadline_is_received() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let results: &'static Results = leak(Mutex::new(Vec::new()));

    k.spawn(
        TaskConfig::new("waiter", 1),
        leak(async move {
            let r = k.take(sem, Wait::Ticks(10)).await;
            results.lock().push((r, k.now()));
            core::future::pending::<()>().await;
        }),
    )
    .unwrap();

    k.start().unwrap();
    k.run_for(3);

    assert_eq!(sem.give(), GiveOutcome::Woke);
    k.dispatch();

    assert_eq!(*results.lock(), vec![(Ok(()), 3)]);
    assert_eq!(sem.count(), 0);
}

#[test]
fn zero_timeout_never_suspends() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let results: &'static Results = leak(Mutex::new(Vec::new()));

    k.spawn(
        TaskConfig::new("poller", 1),
        leak(async move {
            let r = k.take(sem, Wait::Ticks(0)).await;
            results.lock().push((r, k.now()));
            sem.give();
            let r = k.take(sem, Wait::Ticks(0)).await;
            results.lock().push((r, k.now()));
        }),
    )
    .unwrap();

    k.start().unwrap();

    assert_eq!(
        *results.lock(),
        vec![(Err(TimeoutError), 0), (Ok(()), 0)]
    );
}

#[test]
fn repeated_binary_give_is_taken_once() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let results: &'static Results = leak(Mutex::new(Vec::new()));

    assert_eq!(sem.give(), GiveOutcome::Stored);
    assert_eq!(sem.give(), GiveOutcome::Coalesced);

    k.spawn(
        TaskConfig::new("taker", 1),
        leak(async move {
            for _ in 0..2 {
                let r = k.take(sem, Wait::Ticks(3)).await;
                results.lock().push((r, k.now()));
            }
        }),
    )
    .unwrap();

    k.start().unwrap();
    k.run_for(3);

    assert_eq!(
        *results.lock(),
        vec![(Ok(()), 0), (Err(TimeoutError), 3)]
    );
}

#[test]
fn waiters_are_served_in_arrival_order() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::counting(4, 0));
    let order: &'static Mutex<Vec<&'static str>> = leak(Mutex::new(Vec::new()));

    // Equal priorities, so arrival order is spawn order.
    for name in ["first", "second", "third"] {
        k.spawn(
            TaskConfig::new(name, 1),
            leak(async move {
                k.take(sem, Wait::Forever).await.unwrap();
                order.lock().push(name);
            }),
        )
        .unwrap();
    }

    k.start().unwrap();
    assert_eq!(sem.waiting(), 3);

    sem.give();
    sem.give();
    k.dispatch();
    assert_eq!(*order.lock(), vec!["first", "second"]);

    sem.give();
    k.dispatch();
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[test]
fn timed_out_waiter_does_not_swallow_a_give() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let results: &'static Results = leak(Mutex::new(Vec::new()));

    k.spawn(
        TaskConfig::new("impatient", 2),
        leak(async move {
            let r = k.take(sem, Wait::Ticks(2)).await;
            results.lock().push((r, k.now()));
            core::future::pending::<()>().await;
        }),
    )
    .unwrap();

    k.start().unwrap();
    k.run_for(2);
    assert_eq!(*results.lock(), vec![(Err(TimeoutError), 2)]);
    assert_eq!(sem.waiting(), 0);

    assert_eq!(sem.give(), GiveOutcome::Stored);
    assert!(sem.try_take());
}

#[test]
fn gives_before_the_taker_runs_coalesce() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let taken: &'static Mutex<u32> = leak(Mutex::new(0));
    let outcomes: &'static Mutex<Vec<GiveOutcome>> = leak(Mutex::new(Vec::new()));

    k.spawn(
        TaskConfig::new("taker", 3),
        leak(async move {
            loop {
                k.take(sem, Wait::Forever).await.unwrap();
                *taken.lock() += 1;
            }
        }),
    )
    .unwrap();

    k.spawn(
        TaskConfig::new("signaller", 2),
        leak(async move {
            // Both gives land in one slice, before the taker can run.
            outcomes.lock().push(sem.give());
            outcomes.lock().push(sem.give());
            core::future::pending::<()>().await;
        }),
    )
    .unwrap();

    k.start().unwrap();
    k.run_for(5);

    assert_eq!(
        *outcomes.lock(),
        vec![GiveOutcome::Woke, GiveOutcome::Coalesced]
    );
    assert_eq!(*taken.lock(), 1);
    assert_eq!(sem.count(), 0);
    assert_eq!(sem.waiting(), 1);
}
