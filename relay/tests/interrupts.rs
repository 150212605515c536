//! Interrupt entry and the switch to the tasks a handler wakes.
//!
//! To run these tests, you need to activate the `critical-section/std` feature.

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use relay::{InterruptHandler, Kernel, KernelConfig, Semaphore, TaskConfig, Wait};

type Log = Mutex<Vec<&'static str>>;

fn kernel() -> &'static Kernel {
    Box::leak(Box::new(Kernel::new(KernelConfig::new())))
}

fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

/// An interrupt line whose handler gives a semaphore.
struct Line {
    kernel: &'static Kernel,
    semaphore: &'static Semaphore,
    pending: AtomicBool,
    handled: AtomicU32,
    in_isr: AtomicBool,
}

impl Line {
    fn new(kernel: &'static Kernel, semaphore: &'static Semaphore) -> &'static Self {
        leak(Self {
            kernel,
            semaphore,
            pending: AtomicBool::new(false),
            handled: AtomicU32::new(0),
            in_isr: AtomicBool::new(false),
        })
    }

    fn pend(&self) {
        self.pending.store(true, Ordering::Release);
    }
}

impl InterruptHandler for Line {
    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn on_interrupt(&self) {
        self.pending.store(false, Ordering::Release);
        self.in_isr.store(self.kernel.in_interrupt(), Ordering::Release);
        self.handled.fetch_add(1, Ordering::AcqRel);
        self.semaphore.give();
    }

    fn name(&self) -> &'static str {
        "line"
    }
}

fn spawn_waiter(k: &'static Kernel, sem: &'static Semaphore, log: &'static Log, priority: u8) {
    k.spawn(
        TaskConfig::new("waiter", priority),
        leak(async move {
            loop {
                k.take(sem, Wait::Forever).await.unwrap();
                log.lock().push("high");
            }
        }),
    )
    .unwrap();
}

#[test]
fn raise_runs_the_woken_task_before_returning() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let log: &'static Log = leak(Mutex::new(Vec::new()));
    let line = Line::new(k, sem);

    spawn_waiter(k, sem, log, 2);
    k.start().unwrap();
    assert!(log.lock().is_empty());

    k.raise(line);

    assert_eq!(*log.lock(), vec!["high"]);
    assert!(line.in_isr.load(Ordering::Acquire));
    assert!(!k.in_interrupt());
    assert_eq!(k.stats().interrupts, 1);
}

#[test]
fn raise_inside_a_slice_switches_at_the_next_suspension_point() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let log: &'static Log = leak(Mutex::new(Vec::new()));
    let line = Line::new(k, sem);

    spawn_waiter(k, sem, log, 2);
    k.spawn(
        TaskConfig::new("low", 1),
        leak(async move {
            log.lock().push("low:before");
            k.raise(line);
            log.lock().push("low:after-raise");
            k.yield_now().await;
            log.lock().push("low:resumed");
            core::future::pending::<()>().await;
        }),
    )
    .unwrap();

    k.start().unwrap();
    assert_eq!(*log.lock(), vec!["low:before", "low:after-raise", "high"]);

    k.run_for(1);
    assert_eq!(
        *log.lock(),
        vec!["low:before", "low:after-raise", "high", "low:resumed"]
    );
}

#[test]
fn bound_lines_are_serviced_on_the_tick() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let log: &'static Log = leak(Mutex::new(Vec::new()));
    let line = Line::new(k, sem);

    spawn_waiter(k, sem, log, 2);
    k.bind_interrupt(line).unwrap();
    k.start().unwrap();

    k.run_for(3);
    assert_eq!(line.handled.load(Ordering::Acquire), 0);
    assert!(log.lock().is_empty());

    line.pend();
    k.run_for(1);
    assert_eq!(line.handled.load(Ordering::Acquire), 1);
    assert!(line.in_isr.load(Ordering::Acquire));
    assert_eq!(*log.lock(), vec!["high"]);

    k.run_for(2);
    assert_eq!(line.handled.load(Ordering::Acquire), 1);
    assert_eq!(k.stats().interrupts, 1);
}

#[test]
fn woken_task_preempts_a_lower_priority_ready_task() {
    let k = kernel();
    let sem: &'static Semaphore = leak(Semaphore::binary());
    let log: &'static Log = leak(Mutex::new(Vec::new()));
    let line = Line::new(k, sem);

    spawn_waiter(k, sem, log, 3);
    k.spawn(
        TaskConfig::new("busy", 1),
        leak(async move {
            loop {
                log.lock().push("busy");
                k.yield_now().await;
            }
        }),
    )
    .unwrap();
    k.bind_interrupt(line).unwrap();
    k.start().unwrap();

    line.pend();
    k.run_for(1);

    assert_eq!(*log.lock(), vec!["busy", "high", "busy"]);
}
