//! Error types for the bridge.

use std::rc::Rc;

use thiserror::Error;

use super::managed::{Exception, ExceptionKind};

/// Failures raised while moving values across the boundary.
///
/// `InvalidHandle`, `InvalidCallableId` and `RefcountUnderflow` mean the
/// refcounting contract was broken somewhere; they are reported as errors so
/// the embedding can abort cleanly, but they are never expected in correct
/// operation.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid handle {0}")]
    InvalidHandle(u32),
    #[error("invalid callable id {0}")]
    InvalidCallableId(u32),
    #[error("refcount underflow on handle {0}")]
    RefcountUnderflow(u32),
    #[error("Unable to convert '{0}' to a foreign value")]
    UnsupportedType(String),
    #[error("{0}")]
    Argument(String),
    #[error("maximum conversion depth of {0} exceeded")]
    DepthExceeded(usize),
    #[error("{0}")]
    ForeignCallFailure(Rc<Exception>),
}

impl BridgeError {
    /// Whether this error indicates a broken refcounting contract.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidHandle(_)
                | BridgeError::InvalidCallableId(_)
                | BridgeError::RefcountUnderflow(_)
        )
    }

    /// Convert into the exception raised on the managed side.
    pub fn into_exception(self) -> Rc<Exception> {
        let kind = match &self {
            BridgeError::ForeignCallFailure(exc) => return Rc::clone(exc),
            BridgeError::UnsupportedType(_) | BridgeError::Argument(_) => ExceptionKind::TypeError,
            BridgeError::DepthExceeded(_) => ExceptionKind::RecursionError,
            BridgeError::InvalidHandle(_)
            | BridgeError::InvalidCallableId(_)
            | BridgeError::RefcountUnderflow(_) => {
                log::error!("bridge contract violation: {}", self);
                ExceptionKind::SystemError
            }
        };
        Exception::new(kind, self.to_string())
    }
}

impl From<BridgeError> for Rc<Exception> {
    fn from(err: BridgeError) -> Self {
        err.into_exception()
    }
}
