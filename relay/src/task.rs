//! Task identity, state and bookkeeping.

use core::future::Future;
use core::pin::Pin;

use crate::config::TaskConfig;
use crate::Instant;

/// Index of a task in the kernel's task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// The slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TaskState {
    /// Can be dispatched.
    Ready,
    /// Currently executing a slice.
    Running,
    /// Waiting for a delay, a semaphore or a message.
    Blocked,
    /// Parked until resumed, or finished.
    Suspended,
}

/// Per-task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TaskStats {
    /// Slices executed.
    pub activations: u32,
    /// Slices that ended with the task waking itself.
    pub yields: u32,
}

/// Snapshot of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TaskInfo {
    /// The task.
    pub id: TaskId,
    /// Name given at creation.
    pub name: &'static str,
    /// Priority given at creation.
    pub priority: u8,
    /// Current state.
    pub state: TaskState,
    /// Counters.
    pub stats: TaskStats,
}

/// The saved execution context of a task.
pub(crate) type TaskFuture = Pin<&'static mut (dyn Future<Output = ()> + Send)>;

pub(crate) struct TaskSlot {
    pub(crate) config: TaskConfig,
    pub(crate) state: TaskState,
    // `None` while the task is running and after it finished.
    pub(crate) future: Option<TaskFuture>,
    pub(crate) last_run: u64,
    // A task that woke itself is not eligible again before the next tick.
    pub(crate) yielded_at: Option<Instant>,
    pub(crate) suspend_requested: bool,
    pub(crate) stats: TaskStats,
}

impl TaskSlot {
    pub(crate) fn new(config: TaskConfig, future: TaskFuture) -> Self {
        Self {
            config,
            state: TaskState::Ready,
            future: Some(future),
            last_run: 0,
            yielded_at: None,
            suspend_requested: false,
            stats: TaskStats::default(),
        }
    }

    pub(crate) fn info(&self, id: TaskId) -> TaskInfo {
        TaskInfo {
            id,
            name: self.config.name,
            priority: self.config.priority,
            state: self.state,
            stats: self.stats,
        }
    }
}
