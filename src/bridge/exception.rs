//! Exceptions crossing the boundary.
//!
//! A managed exception thrown into foreign code travels as an `Error` object
//! holding a wrapper of the original under [`MANAGED_ERROR_KEY`]. When that
//! object is caught back on the managed side the original exception is
//! re-raised as is.

use std::rc::Rc;

use super::error::BridgeError;
use super::foreign::{ForeignValue, MANAGED_ERROR_KEY};
use super::handle::Handle;
use super::managed::{Exception, ExceptionKind, Value};
use super::Bridge;

impl Bridge {
    /// Describe `exc` and hand out a foreign handle that refers back to it.
    pub fn exception_to_foreign(&mut self, exc: &Rc<Exception>) -> Result<(String, Handle), BridgeError> {
        let handle = self.wrap_callable(&Value::Exception(Rc::clone(exc)))?;
        Ok((exc.repr(), handle))
    }

    /// Foreign error object to throw for `exc`.
    pub fn throwable(&mut self, exc: &Rc<Exception>) -> ForeignValue {
        let (description, wrapper) = match self.exception_to_foreign(exc) {
            Ok((description, handle)) => match self.pop(handle) {
                Ok(wrapper) => (description, Some(wrapper)),
                Err(e) => {
                    log::error!("dropping back-reference for {}: {}", description, e);
                    (description, None)
                }
            },
            Err(e) => {
                log::error!("cannot wrap exception {}: {}", exc, e);
                (exc.repr(), None)
            }
        };
        let error = ForeignValue::error("Error", &description);
        if let Some(wrapper) = wrapper {
            error.set(MANAGED_ERROR_KEY, wrapper);
        }
        error
    }

    /// Managed exception for a thrown foreign value.
    pub fn exception_from_foreign(&mut self, thrown: &ForeignValue) -> Rc<Exception> {
        if let Some(ForeignValue::Function(wrapper)) = thrown.get(MANAGED_ERROR_KEY) {
            if let Some(id) = wrapper.managed_id() {
                let original = self.registry.borrow().lookup(id);
                match original {
                    Ok(Value::Exception(exc)) => return exc,
                    Ok(other) => log::warn!("back-reference {} is a {}", id, other.type_name()),
                    Err(e) => log::warn!("stale back-reference: {}", e),
                }
            }
        }

        let (name, message) = match thrown {
            ForeignValue::Object(_) => {
                let name = thrown
                    .get("name")
                    .filter(|n| !matches!(n, ForeignValue::Undefined | ForeignValue::Null))
                    .map(|n| n.to_host_string())
                    .unwrap_or_else(|| "(unnamed)".to_string());
                let message = thrown.get("message").map(|m| m.to_host_string()).unwrap_or_default();
                (name, message)
            }
            other => ("(unnamed)".to_string(), other.to_host_string()),
        };

        match name.as_str() {
            "TypeError" => Exception::new(ExceptionKind::TypeError, message),
            "ReferenceError" => Exception::new(ExceptionKind::NameError, message),
            _ => Exception::new(ExceptionKind::ValueError, format!("{}: {}", name, message)),
        }
    }
}
