//! Worker protocol: running one script in an isolated execution context.
//!
//! The worker thread reports back over an ordered queue of tagged messages
//! (see [`message`]). The controller steers it through a [`ControlBlock`]
//! that the worker polls while suspended in a debugger stop or an input
//! request.
//!
//! ```text
//! Idle -> Started -> Running -> (SuspendedDebugger | SuspendedInput)* -> Completed
//! ```

pub mod channel;
mod context;
pub mod control;
mod controller;
pub mod debug;
pub mod frame;
pub mod message;
pub mod payload;

pub use channel::Channel;
pub use context::{Executor, Interrupted, WorkerContext};
pub use control::{ControlBlock, WorkerState};
pub use controller::{Worker, WorkerError, WorkerHandler};
pub use debug::{DebuggerEvent, Directive, LineTable, StepAction};
pub use frame::{FrameReader, FrameWriter};
pub use message::{FinalResult, WorkerMessage, WorkerProtocolError};
pub use payload::{StartupPayload, WorkerFlags};
