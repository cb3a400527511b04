//! Controller side of a worker: spawning, message dispatch and resumption.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::channel::Channel;
use super::context::{Executor, Interrupted, WorkerContext};
use super::control::{ControlBlock, WorkerState};
use super::debug::{DebuggerEvent, Directive};
use super::frame::FrameWriter;
use super::message::{FinalResult, WorkerMessage};
use super::payload::StartupPayload;
use crate::config::WorkerConfig;

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker thread panicked: {0}")]
    Panicked(String),
    #[error("worker exited without a result")]
    Disconnected,
}

/// Callbacks for [`Worker::run`].
pub trait WorkerHandler {
    fn on_stdout(&mut self, _line: &str) {}

    fn on_stderr(&mut self, _line: &str) {}

    fn on_fs_synced(&mut self) {}

    /// Decide how a suspended worker continues.
    fn on_debugger(&mut self, _event: &DebuggerEvent) -> Directive {
        Directive::Continue
    }

    /// Line for an input request. `None` stops the worker.
    fn on_input(&mut self, _prompt: &str) -> Option<String> {
        None
    }

    fn on_result(&mut self, _result: &FinalResult) {}
}

/// Guarantees the single final message and the channel close, including
/// when the executor panics.
struct Completion {
    outbox: Arc<Channel<Vec<u8>>>,
    control: Arc<ControlBlock>,
    /// Whether the final message went out
    sent: bool,
}

impl Completion {
    fn finish(&mut self, result: FinalResult) {
        if self.sent {
            return;
        }
        self.sent = true;
        self.control.set_state(WorkerState::Completed);
        let _ = self.outbox.send(WorkerMessage::Result(result).encode());
        self.outbox.close();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish(FinalResult::None);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn worker_main<E: Executor>(
    raw_payload: Vec<u8>,
    mut executor: E,
    outbox: Arc<Channel<Vec<u8>>>,
    control: Arc<ControlBlock>,
    config: WorkerConfig,
) {
    let mut completion = Completion {
        outbox: Arc::clone(&outbox),
        control: Arc::clone(&control),
        sent: false,
    };

    let payload = match StartupPayload::decode(&raw_payload) {
        Ok(payload) => payload,
        Err(e) => {
            let _ = outbox.send(WorkerMessage::Stderr(format!("bad startup payload: {}", e)).encode());
            completion.finish(FinalResult::None);
            return;
        }
    };

    let ctx = WorkerContext::new(payload, outbox, Arc::clone(&control), config.poll_interval());
    control.set_state(WorkerState::Started);
    ctx.emit(&WorkerMessage::Input(config.ready_message.clone()));

    control.set_state(WorkerState::Running);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&ctx)));
    match outcome {
        Ok(Ok(result)) => completion.finish(result),
        Ok(Err(Interrupted::Quit)) => {
            log::debug!("worker stopped by quit directive");
            completion.finish(FinalResult::None);
        }
        Err(payload) => {
            ctx.stderr(&format!("worker panicked: {}", panic_message(payload.as_ref())));
            completion.finish(FinalResult::None);
        }
    }
}

/// Controller handle to one running worker.
pub struct Worker {
    /// Process-wide worker id, used in the thread name and in logs
    id: usize,
    /// Encoded messages from the worker thread
    inbox: Arc<Channel<Vec<u8>>>,
    /// State and resume slots shared with the worker thread
    control: Arc<ControlBlock>,
    /// Join handle; `None` once joined
    handle: Option<JoinHandle<()>>,
    /// Body of the readiness message to swallow
    ready_message: String,
    /// Whether the readiness message has been seen
    ready: bool,
    /// Whether the final result has been received
    finished: bool,
    /// Sink for raw frames, set by `record`
    recorder: Option<FrameWriter<Box<dyn Write + Send>>>,
}

impl Worker {
    /// Start `executor` on a new thread with an encoded startup payload.
    pub fn spawn<E>(payload: Vec<u8>, executor: E, config: &WorkerConfig) -> Result<Self, WorkerError>
    where
        E: Executor + 'static,
    {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let inbox = Channel::new();
        let control = Arc::new(ControlBlock::new());

        let outbox = Arc::clone(&inbox);
        let worker_control = Arc::clone(&control);
        let worker_config = config.clone();
        let handle = thread::Builder::new()
            .name(format!("heapbridge-worker-{}", id))
            .spawn(move || worker_main(payload, executor, outbox, worker_control, worker_config))?;

        log::debug!("spawned worker {}", id);
        Ok(Self {
            id,
            inbox,
            control,
            handle: Some(handle),
            ready_message: config.ready_message.clone(),
            ready: false,
            finished: false,
            recorder: None,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// Whether the readiness message has been seen.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Copy every raw message received from now on to `writer` as frames.
    pub fn record(&mut self, writer: impl Write + Send + 'static) {
        self.recorder = Some(FrameWriter::new(Box::new(writer)));
    }

    /// Next decoded message, waiting at most `timeout` (forever when
    /// `None`). Returns `None` on timeout or once the worker is done.
    ///
    /// Malformed messages are logged and skipped. The readiness message is
    /// consumed here and never returned.
    pub fn next_message(&mut self, timeout: Option<Duration>) -> Option<WorkerMessage> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let raw = match deadline {
                None => self.inbox.recv()?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        self.inbox.try_recv()?
                    } else {
                        self.inbox.recv_timeout(remaining)?
                    }
                }
            };

            if let Some(recorder) = self.recorder.as_mut() {
                if let Err(e) = recorder.write_frame(&raw).and_then(|_| recorder.flush()) {
                    log::warn!("worker {}: recording stopped: {}", self.id, e);
                    self.recorder = None;
                }
            }

            let message = match WorkerMessage::decode(&raw) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("worker {}: dropping malformed message: {}", self.id, e);
                    continue;
                }
            };
            match message {
                WorkerMessage::Input(ref prompt) if !self.ready && *prompt == self.ready_message => {
                    self.ready = true;
                    log::debug!("worker {} is ready", self.id);
                }
                WorkerMessage::Result(_) => {
                    self.finished = true;
                    return Some(message);
                }
                other => return Some(other),
            }
        }
    }

    /// Deliver a debugger directive. Each one releases one suspension.
    pub fn resume(&self, directive: Directive) {
        self.control.deliver(directive);
    }

    /// Supply the line for a pending (or the next) input request.
    pub fn send_input(&self, line: impl Into<String>) {
        self.control.supply_input(line.into());
    }

    /// Dispatch messages to `handler` until the final result arrives, then
    /// join the worker thread.
    pub fn run(&mut self, handler: &mut dyn WorkerHandler) -> Result<FinalResult, WorkerError> {
        while let Some(message) = self.next_message(None) {
            match message {
                WorkerMessage::Stdout(line) => handler.on_stdout(&line),
                WorkerMessage::Stderr(line) => handler.on_stderr(&line),
                WorkerMessage::FsSynced => handler.on_fs_synced(),
                WorkerMessage::Debugger(event) => {
                    let directive = handler.on_debugger(&event);
                    self.resume(directive);
                }
                WorkerMessage::Input(prompt) => match handler.on_input(&prompt) {
                    Some(line) => self.send_input(line),
                    None => self.resume(Directive::Quit),
                },
                WorkerMessage::Result(result) => {
                    handler.on_result(&result);
                    self.join()?;
                    return Ok(result);
                }
            }
        }
        self.join()?;
        Err(WorkerError::Disconnected)
    }

    /// Ask the worker to quit, drain what it still sends and join it.
    pub fn terminate(mut self) -> Result<(), WorkerError> {
        self.resume(Directive::Quit);
        while self.next_message(None).is_some() {}
        self.join()
    }

    pub fn join(&mut self) -> Result<(), WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let joined = handle
            .join()
            .map_err(|e| WorkerError::Panicked(panic_message(e.as_ref())));
        let (sent, received) = self.inbox.stats();
        log::debug!("worker {} joined: {} messages sent, {} received", self.id, sent, received);
        joined
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.finished {
            // Unblock any suspension; the thread is detached
            self.control.deliver(Directive::Quit);
            log::debug!("worker {} dropped while {}", self.id, self.control.state());
        }
    }
}
