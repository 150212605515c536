//! A preemptive, fixed-priority kernel for interrupt-driven async tasks.
//!
//! The kernel manages a fixed set of tasks created at start-up. Each task is an `async` block
//! whose future is its saved context. Tasks suspend only at explicit points: a delay, a yield, or
//! a wait on a semaphore or a channel. A periodic tick moves time forward, samples the bound
//! interrupt lines and re-evaluates which task runs:
//!
//! - the highest priority ready task always runs next,
//! - ready tasks of equal priority take turns,
//! - interrupt handlers run to completion and only mark tasks ready.
//!
//! All shared state is guarded by `critical-section`, so a host build needs the
//! `critical-section/std` feature and a target build needs a platform implementation.

#![no_std]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod config;
mod error;
pub mod interrupt;
mod kernel;
pub mod task;
mod waker;

pub use config::{KernelConfig, TaskConfig, DEFAULT_STACK_SIZE, DEFAULT_TICK_HZ};
pub use error::Error;
pub use interrupt::InterruptHandler;
pub use kernel::{Kernel, SchedulerStats, YieldNow};
pub use task::{TaskId, TaskInfo, TaskState, TaskStats};

pub use relay_sync as sync;
pub use relay_sync::{GiveOutcome, Semaphore, SemaphoreKind};
pub use relay_time as time;
pub use relay_time::{TimeoutError, Wait};

/// A point in time, in ticks since start-up. Wraps around.
pub type Instant = u32;

/// Maximum number of tasks.
pub const MAX_TASKS: usize = 16;

/// Maximum number of bound interrupt lines.
pub const MAX_INTERRUPTS: usize = 8;

/// Concurrent timed waits: one delay plus one timeout per task. Exceeding it panics.
pub const TIMER_SLOTS: usize = 2 * MAX_TASKS;

const _: () = assert!(
    MAX_TASKS <= relay_sync::MAX_WAITERS,
    "every task must be able to block on the same primitive"
);
