//! The worker-side view of a running script.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use super::channel::Channel;
use super::control::{ControlBlock, WorkerState};
use super::debug::{DebuggerEvent, Directive, StepAction};
use super::message::{FinalResult, WorkerMessage};
use super::payload::{StartupPayload, WorkerFlags};

/// Raised out of a suspension point when the controller asked to quit.
/// Executors propagate it with `?` to unwind the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("execution stopped by quit directive")]
    Quit,
}

/// Runs one script inside a worker.
pub trait Executor: Send {
    fn execute(&mut self, ctx: &WorkerContext) -> Result<FinalResult, Interrupted>;
}

impl<F> Executor for F
where
    F: FnMut(&WorkerContext) -> Result<FinalResult, Interrupted> + Send,
{
    fn execute(&mut self, ctx: &WorkerContext) -> Result<FinalResult, Interrupted> {
        self(ctx)
    }
}

/// Handed to the executor for the duration of one run.
///
/// The working directory is exposed rather than applied to the process, so
/// several workers can run side by side.
pub struct WorkerContext {
    working_dir: PathBuf,
    flags: WorkerFlags,
    script: Vec<u8>,
    /// Encoded messages to the controller
    outbox: Arc<Channel<Vec<u8>>>,
    /// Polled while suspended
    control: Arc<ControlBlock>,
    /// Sleep between polls of `control`
    poll_interval: Duration,
}

impl WorkerContext {
    pub(crate) fn new(
        payload: StartupPayload,
        outbox: Arc<Channel<Vec<u8>>>,
        control: Arc<ControlBlock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            working_dir: payload.working_dir,
            flags: payload.flags,
            script: payload.script,
            outbox,
            control,
            poll_interval,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn flags(&self) -> WorkerFlags {
        self.flags
    }

    /// Script path or source text, as sent.
    pub fn script(&self) -> &[u8] {
        &self.script
    }

    pub(crate) fn emit(&self, message: &WorkerMessage) {
        if self.outbox.send(message.encode()).is_err() {
            log::debug!("controller gone, dropping {:?} message", message.tag() as char);
        }
    }

    /// Forward an already encoded message, e.g. one relayed from a child
    /// process. The controller validates it on receipt.
    pub fn send_raw(&self, bytes: Vec<u8>) {
        if self.outbox.send(bytes).is_err() {
            log::debug!("controller gone, dropping raw message");
        }
    }

    pub fn stdout(&self, line: &str) {
        self.emit(&WorkerMessage::Stdout(line.to_string()));
    }

    pub fn stderr(&self, line: &str) {
        self.emit(&WorkerMessage::Stderr(line.to_string()));
    }

    pub fn fs_synced(&self) {
        self.emit(&WorkerMessage::FsSynced);
    }

    /// Cheap check for executors that run long without suspending.
    pub fn check_interrupt(&self) -> Result<(), Interrupted> {
        if self.control.quit_requested() {
            Err(Interrupted::Quit)
        } else {
            Ok(())
        }
    }

    /// Report a debugger stop and wait for the controller's directive.
    pub fn debugger_break(&self, event: DebuggerEvent) -> Result<StepAction, Interrupted> {
        self.control.set_state(WorkerState::SuspendedDebugger);
        self.emit(&WorkerMessage::Debugger(event));
        let directive = self.poll(|control| control.take_directive());
        self.control.set_state(WorkerState::Running);
        log::debug!("debugger resumed with {}", directive);
        directive.step_action().ok_or(Interrupted::Quit)
    }

    /// Ask the controller for a line of input.
    pub fn input(&self, prompt: &str) -> Result<String, Interrupted> {
        self.control.set_state(WorkerState::SuspendedInput);
        self.emit(&WorkerMessage::Input(prompt.to_string()));
        let line = self.poll(|control| {
            if control.quit_requested() {
                Some(None)
            } else {
                control.take_input().map(Some)
            }
        });
        self.control.set_state(WorkerState::Running);
        line.ok_or(Interrupted::Quit)
    }

    fn poll<T>(&self, mut ready: impl FnMut(&ControlBlock) -> Option<T>) -> T {
        loop {
            if let Some(value) = ready(&self.control) {
                return value;
            }
            thread::sleep(self.poll_interval);
        }
    }
}
