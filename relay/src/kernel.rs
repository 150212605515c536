//! The kernel: task table, dispatcher, tick and interrupt entry.
//!
//! Tasks are futures. A task runs from one suspension point to the next (a *slice*) without
//! being interleaved with other tasks, and every return to the dispatcher re-evaluates which
//! ready task has the highest priority. Interrupt handlers run to completion in interrupt context
//! and only mark tasks ready. The switch to a task they woke happens as soon as no slice is in
//! progress: immediately after the handler returns when it interrupted the dispatcher, or at the
//! interrupted slice's next suspension point.

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use critical_section::Mutex;
use heapless::Vec;
use log::{debug, info, trace, warn};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};
use relay_common::dropper::OnDrop;
use relay_sync::Semaphore;
use relay_time::{Delay, Timeout, TimeoutError, TimerQueue, Wait};

use crate::config::{KernelConfig, TaskConfig};
use crate::interrupt::InterruptHandler;
use crate::task::{TaskId, TaskInfo, TaskSlot, TaskState};
use crate::waker::task_waker;
use crate::{Error, Instant, MAX_INTERRUPTS, MAX_TASKS, TIMER_SLOTS};

mod scheduler;
use scheduler::Candidate;

/// Kernel-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct SchedulerStats {
    /// Ticks processed.
    pub ticks: u64,
    /// Slices executed.
    pub dispatches: u64,
    /// Slices that ran a different task than the slice before.
    pub context_switches: u64,
    /// Ticks after which no task was ready.
    pub idle_ticks: u64,
    /// Interrupt handlers executed.
    pub interrupts: u64,
}

struct State {
    tasks: Vec<TaskSlot, MAX_TASKS>,
    running: Option<TaskId>,
    last_dispatched: Option<TaskId>,
    stamp: u64,
    stats: SchedulerStats,
}

/// A fixed-priority preemptive kernel for a fixed set of tasks.
///
/// The kernel must live in a `static` (or be leaked) because task wakers point into it.
pub struct Kernel {
    config: KernelConfig,
    timers: TimerQueue<Instant, TIMER_SLOTS>,
    state: Mutex<RefCell<State>>,
    interrupts: Mutex<RefCell<Vec<&'static dyn InterruptHandler, MAX_INTERRUPTS>>>,
    woken: [AtomicBool; MAX_TASKS],
    isr_depth: AtomicU8,
    started: AtomicBool,
}

impl Kernel {
    /// Create a kernel with no tasks.
    pub const fn new(config: KernelConfig) -> Self {
        Self {
            config,
            timers: TimerQueue::new(),
            state: Mutex::new(RefCell::new(State {
                tasks: Vec::new(),
                running: None,
                last_dispatched: None,
                stamp: 0,
                stats: SchedulerStats {
                    ticks: 0,
                    dispatches: 0,
                    context_switches: 0,
                    idle_ticks: 0,
                    interrupts: 0,
                },
            })),
            interrupts: Mutex::new(RefCell::new(Vec::new())),
            woken: [const { AtomicBool::new(false) }; MAX_TASKS],
            isr_depth: AtomicU8::new(0),
            started: AtomicBool::new(false),
        }
    }

    /// The configuration the kernel was created with.
    pub fn config(&self) -> KernelConfig {
        self.config
    }

    /// Create a task. Tasks are created before [`Kernel::start`] and live forever.
    ///
    /// The future is the task's saved context, so its size must fit `config.stack_size`.
    pub fn spawn<F>(&self, config: TaskConfig, future: &'static mut F) -> Result<TaskId, Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }

        let required = core::mem::size_of::<F>();
        if required > config.stack_size {
            return Err(Error::StackTooSmall {
                required,
                provided: config.stack_size,
            });
        }

        let id = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let id = TaskId(state.tasks.len() as u8);
            state
                .tasks
                .push(TaskSlot::new(config, Pin::static_mut(future)))
                .map_err(|_| Error::TaskLimit)?;
            Ok(id)
        })?;

        debug!(
            "created task {} ({:?}) priority {} context {}/{} bytes",
            config.name, id, config.priority, required, config.stack_size
        );

        Ok(id)
    }

    /// Bind a handler to an interrupt line. Every tick samples the line and runs the handler
    /// when it is pending.
    pub fn bind_interrupt(&self, handler: &'static dyn InterruptHandler) -> Result<(), Error> {
        critical_section::with(|cs| {
            self.interrupts
                .borrow_ref_mut(cs)
                .push(handler)
                .map_err(|_| Error::InterruptLimit)
        })?;

        debug!("bound interrupt {}", handler.name());
        Ok(())
    }

    /// Start scheduling and run every task up to its first suspension point.
    pub fn start(&'static self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let tasks = critical_section::with(|cs| self.state.borrow_ref(cs).tasks.len());
        info!(
            "scheduler started with {} tasks at {} Hz",
            tasks, self.config.tick_hz
        );

        self.dispatch();
        Ok(())
    }

    /// Check if [`Kernel::start`] was called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The tick interrupt: advance time, service pending interrupt lines, then dispatch.
    pub fn tick(&'static self) {
        {
            let _isr = self.enter_interrupt();

            self.timers.advance();
            self.update_stats(|s| s.ticks += 1);

            let lines = critical_section::with(|cs| self.interrupts.borrow_ref(cs).clone());
            for handler in lines {
                if handler.is_pending() {
                    self.service(handler);
                }
            }
        }

        if self.dispatch() == 0 && self.is_started() {
            self.update_stats(|s| s.idle_ticks += 1);
        }
    }

    /// Run `ticks` ticks back to back.
    pub fn run_for(&'static self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Pend and run an interrupt handler now, the way a software-triggered interrupt would.
    ///
    /// From outside a slice the dispatcher runs right after the handler, so a task woken by it
    /// runs before this returns. From inside a slice the switch waits for the slice's next
    /// suspension point.
    pub fn raise(&'static self, handler: &dyn InterruptHandler) {
        {
            let _isr = self.enter_interrupt();
            self.service(handler);
        }

        self.dispatch();
    }

    /// Run ready tasks, highest priority first, until none is ready.
    ///
    /// Does nothing before `start`, in interrupt context or from inside a slice. Returns the
    /// number of slices executed.
    pub fn dispatch(&'static self) -> usize {
        if !self.is_started() || self.in_interrupt() || self.current().is_some() {
            return 0;
        }

        let mut slices = 0;
        while let Some(id) = self.select_next() {
            self.run_slice(id);
            slices += 1;
        }

        slices
    }

    /// Current time in ticks.
    pub fn now(&self) -> Instant {
        self.timers.now()
    }

    /// Convert milliseconds to ticks at the configured tick rate.
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        self.config.ms_to_ticks(ms)
    }

    /// Block the calling task for `ticks` ticks. A zero delay does not suspend.
    ///
    /// # Panics
    ///
    /// Polling the wait panics when all [`TIMER_SLOTS`] timed waits are taken. Every task may hold
    /// two at once, so nest at most one `timeout_after` around a `delay` or a timed `take`.
    pub fn delay(&self, ticks: u32) -> Delay<'_, Instant, TIMER_SLOTS> {
        self.timers.delay(ticks)
    }

    /// Block the calling task until `instant`, for drift-free periodic activation.
    ///
    /// # Panics
    ///
    /// When the timed waits run out, as for [`Kernel::delay`].
    pub fn delay_until(&self, instant: Instant) -> Delay<'_, Instant, TIMER_SLOTS> {
        self.timers.delay_until(instant)
    }

    /// Run `future` for at most `ticks` ticks.
    ///
    /// # Panics
    ///
    /// When the timed waits run out, as for [`Kernel::delay`].
    pub fn timeout_after<F: Future>(
        &self,
        ticks: u32,
        future: F,
    ) -> Timeout<'_, Instant, TIMER_SLOTS, F> {
        self.timers.timeout_after(ticks, future)
    }

    /// Re-check `condition` every tick for at most `ticks` ticks.
    pub async fn poll_until<C>(&self, ticks: u32, condition: C) -> Result<(), TimeoutError>
    where
        C: FnMut() -> bool,
    {
        self.timers.poll_until(ticks, condition).await
    }

    /// Take a unit from `semaphore`, blocking the calling task for at most `wait`.
    pub async fn take<const W: usize>(
        &self,
        semaphore: &Semaphore<W>,
        wait: Wait,
    ) -> Result<(), TimeoutError> {
        match wait {
            Wait::Forever => {
                semaphore.take().await;
                Ok(())
            }
            Wait::Ticks(ticks) => {
                let result = self.timers.timeout_after(ticks, semaphore.take()).await;
                if result.is_err() {
                    debug!("semaphore not acquired within {} ticks", ticks);
                }
                result
            }
        }
    }

    /// Give up the processor to ready tasks of the same priority. The task is not picked again
    /// before the next tick, and lower priorities still wait for it to block.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow { yielded: false }
    }

    /// Park a task until [`Kernel::resume`]. A task may suspend itself, it stops at its next
    /// suspension point.
    pub fn suspend(&self, id: TaskId) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let running = state.running;
            let slot = state
                .tasks
                .get_mut(id.index())
                .ok_or(Error::UnknownTask)?;

            if running == Some(id) {
                slot.suspend_requested = true;
            } else {
                slot.state = TaskState::Suspended;
            }
            Ok(())
        })?;

        debug!("suspended {:?}", id);
        Ok(())
    }

    /// Make a suspended task ready again. Tasks that finished stay suspended.
    pub fn resume(&self, id: TaskId) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state
                .tasks
                .get_mut(id.index())
                .ok_or(Error::UnknownTask)?;

            slot.suspend_requested = false;
            if slot.state == TaskState::Suspended && slot.future.is_some() {
                slot.state = TaskState::Ready;
                slot.yielded_at = None;
            }
            Ok(())
        })?;

        debug!("resumed {:?}", id);
        Ok(())
    }

    /// The task whose slice is executing, if any.
    pub fn current(&self) -> Option<TaskId> {
        critical_section::with(|cs| self.state.borrow_ref(cs).running)
    }

    /// Check if an interrupt handler is executing.
    pub fn in_interrupt(&self) -> bool {
        self.isr_depth.load(Ordering::Acquire) > 0
    }

    /// Snapshot of one task.
    pub fn task_info(&self, id: TaskId) -> Result<TaskInfo, Error> {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .tasks
                .get(id.index())
                .map(|slot| slot.info(id))
                .ok_or(Error::UnknownTask)
        })
    }

    /// Snapshot of every task.
    pub fn tasks(&self) -> Vec<TaskInfo, MAX_TASKS> {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .tasks
                .iter()
                .enumerate()
                .map(|(idx, slot)| slot.info(TaskId(idx as u8)))
                .collect()
        })
    }

    /// Kernel-wide counters.
    pub fn stats(&self) -> SchedulerStats {
        critical_section::with(|cs| self.state.borrow_ref(cs).stats)
    }

    fn update_stats(&self, f: impl FnOnce(&mut SchedulerStats)) {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs).stats));
    }

    fn enter_interrupt(&self) -> OnDrop<impl FnOnce() + '_> {
        self.isr_depth.fetch_add(1, Ordering::AcqRel);
        OnDrop::new(move || {
            self.isr_depth.fetch_sub(1, Ordering::AcqRel);
        })
    }

    fn service(&self, handler: &dyn InterruptHandler) {
        trace!("interrupt {}", handler.name());
        handler.on_interrupt();
        self.update_stats(|s| s.interrupts += 1);
    }

    fn select_next(&self) -> Option<TaskId> {
        let now = self.now();

        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);

            for (idx, slot) in state.tasks.iter_mut().enumerate() {
                if slot.state == TaskState::Blocked && self.woken[idx].load(Ordering::Acquire) {
                    slot.state = TaskState::Ready;
                }
            }

            scheduler::select(state.tasks.iter().map(|slot| Candidate {
                priority: slot.config.priority,
                last_run: slot.last_run,
                ready: slot.state == TaskState::Ready,
                deferred: slot.yielded_at == Some(now),
            }))
            .map(|idx| TaskId(idx as u8))
        })
    }

    fn run_slice(&'static self, id: TaskId) {
        let idx = id.index();

        let (future, name) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let state = &mut *state;
            debug_assert!(state.running.is_none(), "two tasks running at once");

            state.stamp += 1;
            state.stats.dispatches += 1;
            if state.last_dispatched != Some(id) {
                state.stats.context_switches += 1;
                state.last_dispatched = Some(id);
            }
            state.running = Some(id);

            let slot = &mut state.tasks[idx];
            slot.state = TaskState::Running;
            slot.last_run = state.stamp;
            slot.yielded_at = None;
            slot.stats.activations += 1;
            self.woken[idx].store(false, Ordering::Release);

            (slot.future.take(), slot.config.name)
        });

        trace!("dispatch {}", name);

        let outcome = future.map(|mut future| {
            let waker = task_waker(&self.woken[idx]);
            let mut cx = Context::from_waker(&waker);
            let poll = future.as_mut().poll(&mut cx);
            (future, poll)
        });

        let now = self.now();
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.running = None;
            let slot = &mut state.tasks[idx];

            match outcome {
                Some((future, Poll::Pending)) => {
                    slot.future = Some(future);

                    if core::mem::take(&mut slot.suspend_requested) {
                        slot.state = TaskState::Suspended;
                    } else if self.woken[idx].load(Ordering::Acquire) {
                        slot.state = TaskState::Ready;
                        slot.yielded_at = Some(now);
                        slot.stats.yields += 1;
                    } else {
                        slot.state = TaskState::Blocked;
                    }
                    false
                }
                Some((_, Poll::Ready(()))) | None => {
                    slot.state = TaskState::Suspended;
                    true
                }
            }
        });

        if finished {
            warn!("task {} returned, it stays suspended", name);
        }
    }
}

/// Future returned by [`Kernel::yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
