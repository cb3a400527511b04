//! C ABI over a bridge context.
//!
//! These are the entry points the host side calls: handle refcounting,
//! leak diagnostics, the finalization signal for managed callable wrappers
//! and error retrieval.
//!
//! # Safety
//!
//! Every function taking an `HbContext` pointer accepts NULL (and then does
//! nothing or reports `ErrorInvalidArg`). Any other pointer must come from
//! `hb_context_new()` or `hb_context_from_config()` and not yet be freed.
//! A context is not thread safe; use it from one thread.

mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::{HbContext, HbResult};

/// Version information
pub const HB_VERSION_MAJOR: u32 = 0;
pub const HB_VERSION_MINOR: u32 = 1;
pub const HB_VERSION_PATCH: u32 = 0;

/// Get the version string
#[unsafe(no_mangle)]
pub extern "C" fn hb_version() -> *const std::ffi::c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr() as *const std::ffi::c_char
}
