//! Value bridge between the foreign (host) heap and the managed heap.
//!
//! All crossings go through a [`Bridge`], which owns the handle table and
//! the reverse proxy registry for one interpreter instance.
//!
//! # Cycles
//!
//! Liveness across the boundary is tracked with reference counts only. A
//! cycle that spans both heaps (a foreign array holding a wrapper of a
//! managed closure that captures a proxy of the same array) is never
//! detected or broken and keeps every value on it alive until the bridge is
//! dropped. Callers are responsible for not building such cycles.

mod callable;
mod error;
mod exception;
pub mod foreign;
pub mod handle;
pub mod managed;
mod marshal;
mod object;
pub mod proxy;

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::config::BridgeConfig;

pub use error::BridgeError;
pub use foreign::{ForeignKind, ForeignValue};
pub use handle::{Handle, HandleTable, Refcount};
pub use managed::{Exception, ExceptionKind, Function, ManagedResult, Value};
pub use proxy::{Proxy, ProxyRegistry};

/// Execution context for one interpreter instance.
pub struct Bridge {
    config: BridgeConfig,
    /// Shared with every live `Proxy`, which holds it weakly
    handles: Rc<RefCell<HandleTable>>,
    /// Shared with every managed wrapper on the foreign side
    registry: Rc<RefCell<ProxyRegistry>>,
    /// Host global object, interned under a permanent handle
    global_object: Handle,
}

impl Bridge {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let mut table = HandleTable::new();
        let global_object = table.intern(ForeignValue::object_of_class("global"));
        Self {
            config,
            handles: Rc::new(RefCell::new(table)),
            registry: Rc::new(RefCell::new(ProxyRegistry::new())),
            global_object,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn allocate(&mut self, value: ForeignValue) -> Handle {
        self.handles.borrow_mut().allocate(value)
    }

    pub fn incref(&mut self, handle: Handle) -> Result<(), BridgeError> {
        self.handles.borrow_mut().incref(handle)
    }

    pub fn decref(&mut self, handle: Handle) -> Result<(), BridgeError> {
        let freed = self.handles.borrow_mut().decref(handle)?;
        drop(freed);
        Ok(())
    }

    pub fn lookup(&self, handle: Handle) -> Result<ForeignValue, BridgeError> {
        self.handles.borrow().lookup(handle)
    }

    /// Read the value behind `handle` and drop one reference to it.
    pub fn pop(&mut self, handle: Handle) -> Result<ForeignValue, BridgeError> {
        self.handles.borrow_mut().pop(handle)
    }

    pub fn count_live(&self) -> usize {
        self.handles.borrow().count_live()
    }

    /// Register a managed value with the reverse registry without creating
    /// a wrapper, for hosts that build their own. Pair every call with one
    /// [`release_callable`](Self::release_callable).
    pub fn register(&mut self, value: &Value) -> Result<u32, BridgeError> {
        self.registry.borrow_mut().wrap(value)
    }

    /// Finalization signal for a wrapper the host tracks itself.
    pub fn release_callable(&mut self, id: u32) {
        let freed = self.registry.borrow_mut().release(id);
        drop(freed);
    }

    pub fn handles(&self) -> Ref<'_, HandleTable> {
        self.handles.borrow()
    }

    pub fn registry(&self) -> Ref<'_, ProxyRegistry> {
        self.registry.borrow()
    }

    /// Wrap `value` in a proxy regardless of its kind.
    ///
    /// The proxy takes a fresh reference to the value and, if given, to the
    /// receiver.
    pub fn make_proxy(
        &mut self,
        value: ForeignValue,
        receiver: Option<Handle>,
    ) -> Result<Rc<Proxy>, BridgeError> {
        let callable = value.is_callable();
        let handle = self.allocate(value);
        if let Some(receiver) = receiver {
            if let Err(e) = self.incref(receiver) {
                self.decref(handle)?;
                return Err(e);
            }
        }
        Ok(self.adopt(handle, receiver, callable))
    }

    /// Build a proxy that takes over references already held on `value`
    /// and `receiver`.
    pub(crate) fn adopt(&self, value: Handle, receiver: Option<Handle>, callable: bool) -> Rc<Proxy> {
        Proxy::new(value, receiver, callable, Rc::downgrade(&self.handles))
    }

    /// Proxy for one of the permanent sentinels.
    pub fn sentinel_proxy(&self, handle: Handle) -> Result<Rc<Proxy>, BridgeError> {
        if !handle.is_permanent() {
            return Err(BridgeError::InvalidHandle(handle.raw()));
        }
        let value = self.lookup(handle)?;
        Ok(self.adopt(handle, None, value.is_callable()))
    }

    /// Proxy for the host global object.
    pub fn global_object(&self) -> Rc<Proxy> {
        self.adopt(self.global_object, None, false)
    }

    /// Install `value` as a property of the host global object.
    pub fn define_global(&mut self, name: &str, value: ForeignValue) -> Result<(), BridgeError> {
        let global = self.lookup(self.global_object)?;
        if global.set(name, value) {
            Ok(())
        } else {
            Err(BridgeError::Argument(format!("cannot define global '{}'", name)))
        }
    }

    /// Look up a host global. Functions are bound to the global object.
    pub fn global(&mut self, name: &str) -> ManagedResult {
        let global = self.global_object();
        match self.property(&global, name)? {
            Some(value) => Ok(value),
            None => Err(Exception::new(
                ExceptionKind::NameError,
                format!("name '{}' is not defined", name),
            )),
        }
    }

    /// Invoke a foreign callable with the given receiver.
    ///
    /// `Err` carries the thrown foreign value.
    pub fn call_foreign(
        &mut self,
        func: &ForeignValue,
        this: &ForeignValue,
        args: &[ForeignValue],
    ) -> Result<ForeignValue, ForeignValue> {
        let ForeignValue::Function(function) = func else {
            return Err(ForeignValue::error(
                "TypeError",
                &format!("{} is not a function", func.to_host_string()),
            ));
        };
        match function.kind() {
            foreign::FunctionKind::Native(body) => {
                let body = Rc::clone(body);
                body(self, this, args)
            }
            foreign::FunctionKind::Managed(wrapper) => self.invoke_managed(wrapper.id(), args),
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_proxy_takes_references() {
        let mut bridge = Bridge::new();
        let receiver = bridge.allocate(ForeignValue::object());
        let proxy = bridge
            .make_proxy(ForeignValue::function("f", |_, _, _| Ok(ForeignValue::Null)), Some(receiver))
            .unwrap();
        assert!(proxy.is_callable());
        assert_eq!(bridge.handles().refcount(receiver), Some(Refcount::Counted(2)));
        drop(proxy);
        assert_eq!(bridge.handles().refcount(receiver), Some(Refcount::Counted(1)));
        bridge.decref(receiver).unwrap();
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_make_proxy_bad_receiver() {
        let mut bridge = Bridge::new();
        let result = bridge.make_proxy(ForeignValue::object(), Some(Handle::from_raw(99)));
        assert!(matches!(result, Err(BridgeError::InvalidHandle(99))));
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_sentinel_proxy() {
        let bridge = Bridge::new();
        let undefined = bridge.sentinel_proxy(Handle::UNDEFINED).unwrap();
        assert_eq!(undefined.value(), Handle::UNDEFINED);
        drop(undefined);
        assert!(bridge.lookup(Handle::UNDEFINED).is_ok());
        assert!(bridge.sentinel_proxy(Handle::from_raw(3)).is_err());
    }

    #[test]
    fn test_globals() {
        let mut bridge = Bridge::new();
        bridge.define_global("answer", ForeignValue::Number(42.0)).unwrap();
        assert_eq!(bridge.global("answer").unwrap(), Value::Int(42));
        let missing = bridge.global("nope").unwrap_err();
        assert_eq!(missing.kind(), ExceptionKind::NameError);
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_call_foreign_not_a_function() {
        let mut bridge = Bridge::new();
        let thrown = bridge
            .call_foreign(&ForeignValue::Number(1.0), &ForeignValue::Undefined, &[])
            .unwrap_err();
        assert_eq!(thrown.get("name").unwrap().to_host_string(), "TypeError");
    }
}
