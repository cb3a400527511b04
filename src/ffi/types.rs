//! FFI type definitions for the C API.

use std::ffi::CString;

use crate::bridge::{Bridge, BridgeError};
use crate::config::BridgeConfig;

/// Result codes for FFI operations.
///
/// These map to the `HbResult` enum in the generated header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HbResult {
    /// Operation succeeded
    Ok = 0,
    /// Handle is not allocated
    ErrorInvalidHandle = 1,
    /// Callable id is not registered
    ErrorInvalidCallable = 2,
    /// Reference count would drop below zero
    ErrorRefcount = 3,
    /// Null context or malformed argument
    ErrorInvalidArg = 4,
    /// Any other bridge failure
    ErrorRuntime = 5,
}

impl From<&BridgeError> for HbResult {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::InvalidHandle(_) => HbResult::ErrorInvalidHandle,
            BridgeError::InvalidCallableId(_) => HbResult::ErrorInvalidCallable,
            BridgeError::RefcountUnderflow(_) => HbResult::ErrorRefcount,
            BridgeError::Argument(_) => HbResult::ErrorInvalidArg,
            _ => HbResult::ErrorRuntime,
        }
    }
}

/// Opaque bridge context type.
///
/// Created by `hb_context_new()` and released with `hb_context_free()`.
#[repr(C)]
pub struct HbContext {
    _private: [u8; 0],
}

/// What an `HbContext` pointer actually points to.
pub(crate) struct ContextWrapper {
    /// The bridge all entry points operate on
    pub bridge: Bridge,
    /// Last error message (as CString for FFI compatibility)
    pub last_error: Option<CString>,
}

impl ContextWrapper {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            bridge: Bridge::with_config(config),
            last_error: None,
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("ffi error: {}", message);
        self.last_error = Some(CString::new(message).unwrap_or_default());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Record `result`'s error, if any, and turn it into a result code.
    pub fn report(&mut self, result: Result<(), BridgeError>) -> HbResult {
        match result {
            Ok(()) => HbResult::Ok,
            Err(e) => {
                if e.is_fatal() {
                    log::error!("bridge contract violation: {}", e);
                }
                let code = HbResult::from(&e);
                self.set_error(e.to_string());
                code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(
            HbResult::from(&BridgeError::InvalidHandle(3)),
            HbResult::ErrorInvalidHandle
        );
        assert_eq!(
            HbResult::from(&BridgeError::DepthExceeded(1)),
            HbResult::ErrorRuntime
        );
    }

    #[test]
    fn test_wrapper_error() {
        let mut wrapper = ContextWrapper::new(BridgeConfig::default());
        assert!(wrapper.last_error.is_none());
        let code = wrapper.report(Err(BridgeError::RefcountUnderflow(5)));
        assert_eq!(code, HbResult::ErrorRefcount);
        assert_eq!(
            wrapper.last_error.as_ref().unwrap().to_str().unwrap(),
            "refcount underflow on handle 5"
        );
        wrapper.clear_error();
        assert!(wrapper.last_error.is_none());
    }
}
