//! heapbridge - interop between a managed interpreter heap and a foreign host heap
//!
//! This library provides the handle table, value marshalling, proxies and
//! callable wrappers in both directions, and the worker protocol used to run
//! scripts off the host thread.
//! For C/C++ embedding, use the FFI module functions.

pub mod bridge;
pub mod config;
pub mod ffi;
pub mod worker;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeError, ForeignValue, Handle, Value};
pub use config::{BridgeConfig, IntegerPolicy, WorkerConfig};
pub use worker::{FinalResult, Worker, WorkerContext, WorkerMessage};

// Re-export FFI types for C bindings
pub use ffi::*;
