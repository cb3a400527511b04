//! Error handling FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_char;

use super::context::{get_wrapper, get_wrapper_mut};
use super::types::HbContext;

/// Get the last error message.
///
/// Returns NULL if there is none. The pointer stays valid until the next
/// call on the same context.
///
/// # Example (C)
/// ```c
/// if (hb_decref(ctx, handle) != HB_RESULT_OK) {
///     fprintf(stderr, "bridge: %s\n", hb_get_error(ctx));
/// }
/// ```
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_get_error(ctx: *const HbContext) -> *const c_char {
    match get_wrapper(ctx).and_then(|wrapper| wrapper.last_error.as_ref()) {
        Some(error) => error.as_ptr(),
        None => std::ptr::null(),
    }
}

/// Clear the last error.
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_clear_error(ctx: *mut HbContext) {
    if let Some(wrapper) = get_wrapper_mut(ctx) {
        wrapper.clear_error();
    }
}

/// Whether an error is pending.
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_has_error(ctx: *const HbContext) -> bool {
    get_wrapper(ctx).is_some_and(|wrapper| wrapper.last_error.is_some())
}
