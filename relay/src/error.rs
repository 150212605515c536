use core::fmt;

/// Errors returned by the kernel's setup and task management calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// All task slots are in use.
    TaskLimit,
    /// The task's saved context does not fit its stack budget.
    StackTooSmall {
        /// Bytes the task needs.
        required: usize,
        /// Bytes the task was given.
        provided: usize,
    },
    /// All interrupt lines are bound.
    InterruptLimit,
    /// No task has this id.
    UnknownTask,
    /// The scheduler is already running.
    AlreadyStarted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TaskLimit => write!(f, "no free task slot (max {})", crate::MAX_TASKS),
            Error::StackTooSmall { required, provided } => write!(
                f,
                "task needs {required} bytes of stack but was given {provided}"
            ),
            Error::InterruptLimit => {
                write!(f, "no free interrupt line (max {})", crate::MAX_INTERRUPTS)
            }
            Error::UnknownTask => f.write_str("unknown task"),
            Error::AlreadyStarted => f.write_str("the scheduler is already running"),
        }
    }
}
