//! # Machine lifecycle
//!
//! `Created -> Attach -> Started -> (Paused <-> Running)* -> Reset | Freed`,
//! expressed as an explicit transition table rather than an ordinal ladder:
//! `Paused <-> Running` is a genuine cycle, so a plain
//! `current_stage <= target_stage` check does not express the allowed
//! moves.

use crate::error::MachineError;

/// One stage in a [`crate::Machine`]'s lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    /// Constructed, no devices attached yet.
    Created,
    /// Device/MMIO attachment underway; hart threads do not exist yet.
    Attached,
    /// Hart threads and the event thread are running.
    Running,
    /// Hart threads are parked at the pause barrier.
    Paused,
    /// A reset was requested; harts are being rewound to their reset PC.
    Resetting,
    /// Torn down; devices released in reverse attach order. Terminal.
    Freed,
}

impl LifecycleStage {
    /// Whether moving from `self` to `target` is a legal single step.
    #[must_use]
    pub fn can_move_to(self, target: LifecycleStage) -> bool {
        use LifecycleStage::{Attached, Created, Freed, Paused, Resetting, Running};
        matches!(
            (self, target),
            (Created, Attached)
                | (Attached, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Resetting)
                | (Paused, Resetting)
                | (Resetting, Running)
                | (Created, Freed)
                | (Attached, Freed)
                | (Running, Freed)
                | (Paused, Freed)
        )
    }

    /// Validate and describe a move from `self` to `target`, for callers
    /// that want the error rather than a bare bool.
    pub fn check_move_to(self, target: LifecycleStage) -> Result<(), MachineError> {
        if self.can_move_to(target) {
            Ok(())
        } else {
            Err(MachineError::InvalidTransition { from: self, to: target })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleStage::{Attached, Created, Freed, Paused, Resetting, Running};

    #[test]
    fn pause_and_resume_cycle() {
        assert!(Running.can_move_to(Paused));
        assert!(Paused.can_move_to(Running));
    }

    #[test]
    fn cannot_skip_attach() {
        assert!(!Created.can_move_to(Running));
    }

    #[test]
    fn reset_returns_to_running_not_attached() {
        assert!(Resetting.can_move_to(Running));
        assert!(!Resetting.can_move_to(Attached));
    }

    #[test]
    fn freed_is_terminal() {
        assert!(!Freed.can_move_to(Running));
        assert!(!Freed.can_move_to(Created));
    }
}
