//! Calls across the boundary in both directions.

use std::rc::Rc;

use super::error::BridgeError;
use super::foreign::ForeignValue;
use super::handle::Handle;
use super::managed::{Exception, ExceptionKind, ManagedResult, Value};
use super::proxy::Proxy;
use super::Bridge;

impl Bridge {
    /// Expose a managed callable to the foreign side.
    ///
    /// Every call yields a fresh wrapper; the registry id behind it is stable
    /// for as long as any wrapper of the same value is alive.
    pub fn wrap_callable(&mut self, value: &Value) -> Result<Handle, BridgeError> {
        let name = match value {
            Value::Function(f) => f.name().to_string(),
            Value::Method(m) => m.method().name().to_string(),
            Value::Exception(e) => e.kind().name().to_string(),
            other => return Err(BridgeError::UnsupportedType(other.type_name())),
        };
        let id = self.registry.borrow_mut().wrap(value)?;
        let wrapper = ForeignValue::managed_wrapper(name, id, Rc::downgrade(&self.registry));
        Ok(self.allocate(wrapper))
    }

    /// Entry point for foreign code calling a managed wrapper.
    ///
    /// On failure the managed exception is converted into a thrown foreign
    /// error.
    pub fn invoke_managed(&mut self, id: u32, args: &[ForeignValue]) -> Result<ForeignValue, ForeignValue> {
        let arguments = self.allocate(ForeignValue::array(args.to_vec()));
        let outcome = self.invoke_with_arguments(id, arguments);
        if let Err(e) = self.decref(arguments) {
            log::error!("releasing call arguments: {}", e);
        }
        let result = outcome.and_then(|value| Ok(self.to_foreign(&value)?));
        match result {
            Ok(handle) => self.pop(handle).map_err(|e| {
                let exc = e.into_exception();
                self.throwable(&exc)
            }),
            Err(exc) => Err(self.throwable(&exc)),
        }
    }

    /// Call the managed value registered under `id` with the elements of
    /// the foreign array behind `arguments` as positional arguments.
    pub fn invoke_with_arguments(&mut self, id: u32, arguments: Handle) -> ManagedResult {
        let list = self.lookup(arguments)?;
        let len = list
            .len()
            .ok_or_else(|| BridgeError::Argument("call arguments must be an array".to_string()))?;
        let mut positional = Vec::with_capacity(len);
        for index in 0..len {
            let element = list.get(&index.to_string()).unwrap_or(ForeignValue::Undefined);
            positional.push(self.managed_value_of(element, None)?);
        }
        let callable = self.registry.borrow().lookup(id)?;
        self.call_value(&callable, &positional)
    }

    /// Call any managed callable.
    pub fn call_value(&mut self, callable: &Value, args: &[Value]) -> ManagedResult {
        match callable {
            Value::Function(f) => f.call(self, args),
            Value::Method(m) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(m.receiver().clone());
                full.extend_from_slice(args);
                m.method().call(self, &full)
            }
            Value::Proxy(p) if p.is_callable() => self.call_proxy(p, args, &[]),
            other => Err(Exception::new(
                ExceptionKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    /// Call the foreign function behind `proxy` with its bound receiver, or
    /// the global object when it has none.
    ///
    /// Keyword arguments are rejected before anything is marshalled.
    pub fn call_proxy(&mut self, proxy: &Proxy, args: &[Value], kwargs: &[(String, Value)]) -> ManagedResult {
        if !kwargs.is_empty() {
            return Err(BridgeError::Argument("keyword arguments unsupported in call".to_string()).into());
        }
        if !proxy.is_callable() {
            return Err(Exception::new(
                ExceptionKind::TypeError,
                "'ForeignObject' object is not callable",
            ));
        }

        let mut foreign_args = Vec::with_capacity(args.len());
        for arg in args {
            foreign_args.push(self.foreign_value_of(arg)?);
        }

        let func = self.lookup(proxy.value())?;
        let this = self.lookup(proxy.receiver().unwrap_or(self.global_object))?;
        match self.call_foreign(&func, &this, &foreign_args) {
            Ok(result) => Ok(self.managed_value_of(result, None)?),
            Err(thrown) => Err(self.exception_from_foreign(&thrown)),
        }
    }
}
