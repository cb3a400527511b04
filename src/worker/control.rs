//! State shared between a worker thread and its controller.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use super::debug::Directive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Started = 1,
    Running = 2,
    SuspendedDebugger = 3,
    SuspendedInput = 4,
    Completed = 5,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Idle,
            1 => WorkerState::Started,
            2 => WorkerState::Running,
            3 => WorkerState::SuspendedDebugger,
            4 => WorkerState::SuspendedInput,
            _ => WorkerState::Completed,
        }
    }

    pub fn is_suspended(self) -> bool {
        matches!(self, WorkerState::SuspendedDebugger | WorkerState::SuspendedInput)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Started => "started",
            WorkerState::Running => "running",
            WorkerState::SuspendedDebugger => "suspended (debugger)",
            WorkerState::SuspendedInput => "suspended (input)",
            WorkerState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Directive and input slots polled by a suspended worker.
///
/// Each queued directive or line is consumed by exactly one suspension.
/// Quit is sticky: once delivered, every later suspension point reports it.
pub struct ControlBlock {
    /// Current `WorkerState` as its `u8` discriminant
    state: AtomicU8,
    /// Sticky quit request
    quit: AtomicBool,
    /// Pending continue/step/raise directives, one per suspension
    directives: Mutex<VecDeque<Directive>>,
    /// Lines supplied for input requests
    inputs: Mutex<VecDeque<String>>,
}

impl ControlBlock {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Idle as u8),
            quit: AtomicBool::new(false),
            directives: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(VecDeque::new()),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        let previous = WorkerState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            log::debug!("worker state {} -> {}", previous, state);
        }
    }

    pub fn deliver(&self, directive: Directive) {
        if directive == Directive::Quit {
            self.quit.store(true, Ordering::Release);
        } else {
            self.directives
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(directive);
        }
    }

    pub fn supply_input(&self, line: String) {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(line);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    pub(crate) fn take_directive(&self) -> Option<Directive> {
        if self.quit_requested() {
            return Some(Directive::Quit);
        }
        self.directives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub(crate) fn take_input(&self) -> Option<String> {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_consumed_once() {
        let control = ControlBlock::new();
        assert_eq!(control.take_directive(), None);
        control.deliver(Directive::Continue);
        control.deliver(Directive::Step);
        assert_eq!(control.take_directive(), Some(Directive::Continue));
        assert_eq!(control.take_directive(), Some(Directive::Step));
        assert_eq!(control.take_directive(), None);
    }

    #[test]
    fn test_quit_is_sticky() {
        let control = ControlBlock::new();
        control.deliver(Directive::Continue);
        control.deliver(Directive::Quit);
        assert_eq!(control.take_directive(), Some(Directive::Quit));
        assert_eq!(control.take_directive(), Some(Directive::Quit));
        assert!(control.quit_requested());
    }

    #[test]
    fn test_state_round_trip() {
        let control = ControlBlock::new();
        assert_eq!(control.state(), WorkerState::Idle);
        control.set_state(WorkerState::SuspendedInput);
        assert_eq!(control.state(), WorkerState::SuspendedInput);
        assert!(control.state().is_suspended());
        control.set_state(WorkerState::Completed);
        assert_eq!(control.state(), WorkerState::Completed);
    }

    #[test]
    fn test_inputs_in_order() {
        let control = ControlBlock::new();
        control.supply_input("first".to_string());
        control.supply_input("second".to_string());
        assert_eq!(control.take_input().as_deref(), Some("first"));
        assert_eq!(control.take_input().as_deref(), Some("second"));
        assert_eq!(control.take_input(), None);
    }
}
