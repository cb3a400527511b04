//! Context lifecycle and handle refcounting entry points.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::{CStr, c_char};

use super::types::{ContextWrapper, HbContext, HbResult};
use crate::bridge::Handle;
use crate::config::BridgeConfig;

/// Create a bridge context with the default configuration.
///
/// The returned context must be freed with `hb_context_free()`.
#[unsafe(no_mangle)]
pub extern "C" fn hb_context_new() -> *mut HbContext {
    let wrapper = Box::new(ContextWrapper::new(BridgeConfig::default()));
    Box::into_raw(wrapper) as *mut HbContext
}

/// Create a bridge context from TOML configuration text.
///
/// Returns NULL if `config` is NULL or does not parse.
///
/// # Safety
///
/// `config` must be NULL or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_context_from_config(config: *const c_char) -> *mut HbContext {
    if config.is_null() {
        return std::ptr::null_mut();
    }
    let parsed = CStr::from_ptr(config)
        .to_str()
        .map_err(|e| e.to_string())
        .and_then(|text| BridgeConfig::from_toml_str(text).map_err(|e| e.to_string()));
    match parsed {
        Ok(config) => Box::into_raw(Box::new(ContextWrapper::new(config))) as *mut HbContext,
        Err(e) => {
            log::warn!("rejecting bridge config: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Free a bridge context.
///
/// # Safety
///
/// - `ctx` must be NULL or a pointer returned by `hb_context_new()`
/// - `ctx` must not have been freed already
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_context_free(ctx: *mut HbContext) {
    if ctx.is_null() {
        return;
    }
    let _ = Box::from_raw(ctx as *mut ContextWrapper);
}

/// Add a reference to `handle`. Permanent handles and 0 are unaffected.
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_incref(ctx: *mut HbContext, handle: u32) -> HbResult {
    let Some(wrapper) = get_wrapper_mut(ctx) else {
        return HbResult::ErrorInvalidArg;
    };
    wrapper.clear_error();
    let result = wrapper.bridge.incref(Handle::from_raw(handle));
    wrapper.report(result)
}

/// Drop a reference to `handle`, freeing the value at zero.
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_decref(ctx: *mut HbContext, handle: u32) -> HbResult {
    let Some(wrapper) = get_wrapper_mut(ctx) else {
        return HbResult::ErrorInvalidArg;
    };
    wrapper.clear_error();
    let result = wrapper.bridge.decref(Handle::from_raw(handle));
    wrapper.report(result)
}

/// Number of live refcounted handles, or 0 for a NULL context.
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_count_live(ctx: *const HbContext) -> usize {
    match get_wrapper(ctx) {
        Some(wrapper) => wrapper.bridge.count_live(),
        None => 0,
    }
}

/// Finalization signal for a managed callable wrapper. Must be delivered
/// at most once per wrapper; unknown ids are ignored.
///
/// # Safety
///
/// `ctx` must be NULL or a live context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hb_release_callable(ctx: *mut HbContext, id: u32) -> HbResult {
    let Some(wrapper) = get_wrapper_mut(ctx) else {
        return HbResult::ErrorInvalidArg;
    };
    wrapper.bridge.release_callable(id);
    HbResult::Ok
}

pub(crate) unsafe fn get_wrapper_mut<'a>(ctx: *mut HbContext) -> Option<&'a mut ContextWrapper> {
    if ctx.is_null() {
        None
    } else {
        Some(&mut *(ctx as *mut ContextWrapper))
    }
}

pub(crate) unsafe fn get_wrapper<'a>(ctx: *const HbContext) -> Option<&'a ContextWrapper> {
    if ctx.is_null() {
        None
    } else {
        Some(&*(ctx as *const ContextWrapper))
    }
}
