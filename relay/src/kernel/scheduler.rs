//! The dispatch rule.

/// What the dispatcher needs to know about one task slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub(crate) priority: u8,
    pub(crate) last_run: u64,
    pub(crate) ready: bool,
    // Yielded during the current tick.
    pub(crate) deferred: bool,
}

/// Pick the slot to run next.
///
/// Only the highest priority among ready slots is considered. Within it, the slot dispatched
/// least recently wins, skipping slots that yielded this tick. If every slot at that priority
/// yielded, nothing runs: a yield makes way for equal priorities, never for lower ones.
pub(crate) fn select<I>(candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = Candidate>,
    I::IntoIter: Clone,
{
    let candidates = candidates.into_iter();

    let top = candidates
        .clone()
        .filter(|c| c.ready)
        .map(|c| c.priority)
        .max()?;

    let mut best: Option<(usize, Candidate)> = None;

    for (idx, candidate) in candidates.enumerate() {
        if !candidate.ready || candidate.deferred || candidate.priority != top {
            continue;
        }

        let better = match best {
            None => true,
            Some((_, current)) => candidate.last_run < current.last_run,
        };

        if better {
            best = Some((idx, candidate));
        }
    }

    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(priority: u8, last_run: u64, ready: bool) -> Candidate {
        Candidate {
            priority,
            last_run,
            ready,
            deferred: false,
        }
    }

    fn yielded(priority: u8, last_run: u64) -> Candidate {
        Candidate {
            deferred: true,
            ..c(priority, last_run, true)
        }
    }

    #[test]
    fn highest_priority_wins() {
        let picked = select([c(1, 0, true), c(3, 9, true), c(2, 0, true)]);
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn equal_priorities_take_turns() {
        let picked = select([c(2, 7, true), c(2, 3, true), c(2, 5, true)]);
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn blocked_slots_are_skipped() {
        assert_eq!(select([c(5, 0, false), c(1, 0, true)]), Some(1));
        assert_eq!(select([c(5, 0, false)]), None);
        assert_eq!(select(core::iter::empty()), None);
    }

    #[test]
    fn yield_makes_way_for_equal_priority_only() {
        assert_eq!(select([yielded(2, 9), c(2, 10, true)]), Some(1));
        assert_eq!(select([yielded(2, 9), c(1, 0, true)]), None);
        assert_eq!(select([yielded(2, 9), c(3, 10, true)]), Some(1));
    }
}
