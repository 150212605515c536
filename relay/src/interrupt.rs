//! Interrupt lines.

/// A handler bound to an interrupt line.
///
/// Handlers run in interrupt context: they must not block, must not allocate and should only
/// publish data and signal tasks. Waking a task from a handler never switches to it directly;
/// the switch happens when the handler returns.
pub trait InterruptHandler: Sync {
    /// Sample the line's hardware flag. Bound lines are sampled once per tick.
    fn is_pending(&self) -> bool;

    /// Service the line.
    fn on_interrupt(&self);

    /// Name used in logs.
    fn name(&self) -> &'static str {
        "irq"
    }
}
