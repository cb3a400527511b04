//! Conversion of values between the two heaps.

use std::rc::Rc;

use num_bigint::BigInt;

use super::error::BridgeError;
use super::foreign::{ForeignKind, ForeignValue, MAX_SAFE_INTEGER};
use super::handle::Handle;
use super::managed::Value;
use super::Bridge;
use crate::config::IntegerPolicy;

impl Bridge {
    /// Convert a managed value into a foreign handle owning one reference.
    pub fn to_foreign(&mut self, value: &Value) -> Result<Handle, BridgeError> {
        self.to_foreign_at(value, 0)
    }

    fn to_foreign_at(&mut self, value: &Value, depth: usize) -> Result<Handle, BridgeError> {
        match value {
            Value::None => Ok(Handle::UNDEFINED),
            Value::Bool(b) => Ok(Handle::from_bool(*b)),
            Value::Int(n) if n.unsigned_abs() <= MAX_SAFE_INTEGER as u64 => {
                Ok(self.allocate(ForeignValue::Number(*n as f64)))
            }
            Value::Int(n) => {
                let foreign = self.wide_integer(&BigInt::from(*n))?;
                Ok(self.allocate(foreign))
            }
            Value::Long(n) => {
                let foreign = self.wide_integer(n)?;
                Ok(self.allocate(foreign))
            }
            Value::Float(f) => Ok(self.allocate(ForeignValue::Number(*f))),
            Value::Str(s) => Ok(self.allocate(ForeignValue::String(Rc::clone(s)))),
            Value::List(items) => {
                if depth >= self.config().max_depth {
                    return Err(BridgeError::DepthExceeded(self.config().max_depth));
                }
                // Snapshot so element conversion may touch the list
                let items: Vec<Value> = items.borrow().clone();
                let array = self.allocate(ForeignValue::array(Vec::with_capacity(items.len())));
                let target = self.lookup(array)?;
                for item in &items {
                    let element = self
                        .to_foreign_at(item, depth + 1)
                        .and_then(|handle| self.pop(handle));
                    match element {
                        Ok(element) => {
                            target.push(element);
                        }
                        Err(e) => {
                            drop(target);
                            self.decref(array)?;
                            return Err(e);
                        }
                    }
                }
                Ok(array)
            }
            Value::Proxy(proxy) => {
                self.incref(proxy.value())?;
                Ok(proxy.value())
            }
            Value::Function(_) | Value::Method(_) | Value::Exception(_) => self.wrap_callable(value),
            Value::Instance(_) => Err(BridgeError::UnsupportedType(value.type_name())),
        }
    }

    /// Foreign form of an integer outside the safe range.
    fn wide_integer(&self, n: &BigInt) -> Result<ForeignValue, BridgeError> {
        let text = n.to_string();
        match self.config().integer_policy {
            IntegerPolicy::DecimalString => Ok(ForeignValue::BigInt(Rc::from(text))),
            IntegerPolicy::Float => text
                .parse::<f64>()
                .map(ForeignValue::Number)
                .map_err(|e| BridgeError::Argument(format!("integer {} as float: {}", text, e))),
        }
    }

    /// Convert a foreign handle into a managed value, consuming one
    /// reference to `handle`.
    ///
    /// `receiver` is bound into the proxy when the value is callable; the
    /// proxy takes its own reference to it.
    pub fn to_managed(&mut self, handle: Handle, receiver: Option<Handle>) -> Result<Value, BridgeError> {
        self.to_managed_at(handle, receiver, 0)
    }

    fn to_managed_at(
        &mut self,
        handle: Handle,
        receiver: Option<Handle>,
        depth: usize,
    ) -> Result<Value, BridgeError> {
        let value = self.lookup(handle)?;
        let converted = match value.classify() {
            ForeignKind::Null => Value::None,
            ForeignKind::Bool(b) => Value::Bool(b),
            ForeignKind::Int(n) => Value::Int(n),
            ForeignKind::Float(f) => Value::Float(f),
            ForeignKind::BigInt(text) => match text.parse::<BigInt>() {
                Ok(n) => Value::long(n),
                Err(e) => {
                    self.decref(handle)?;
                    return Err(BridgeError::Argument(format!("malformed big integer '{}': {}", text, e)));
                }
            },
            ForeignKind::String(s) => Value::Str(s),
            ForeignKind::ManagedCallable(id) => {
                let original = self.registry.borrow().lookup(id);
                match original {
                    Ok(original) => original,
                    Err(e) => {
                        drop(value);
                        self.decref(handle)?;
                        return Err(e);
                    }
                }
            }
            ForeignKind::Array => {
                let result = self.array_to_managed(&value, depth);
                drop(value);
                self.decref(handle)?;
                return result;
            }
            ForeignKind::Callable => {
                // The consumed reference moves into the proxy
                if let Some(receiver) = receiver {
                    if let Err(e) = self.incref(receiver) {
                        self.decref(handle)?;
                        return Err(e);
                    }
                }
                return Ok(Value::Proxy(self.adopt(handle, receiver, true)));
            }
            ForeignKind::Opaque => {
                return Ok(Value::Proxy(self.adopt(handle, None, false)));
            }
        };
        drop(value);
        self.decref(handle)?;
        Ok(converted)
    }

    fn array_to_managed(&mut self, array: &ForeignValue, depth: usize) -> Result<Value, BridgeError> {
        if depth >= self.config().max_depth {
            return Err(BridgeError::DepthExceeded(self.config().max_depth));
        }
        let len = array.len().unwrap_or(0);
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            let element = array.get(&index.to_string()).unwrap_or(ForeignValue::Undefined);
            let handle = self.allocate(element);
            items.push(self.to_managed_at(handle, None, depth + 1)?);
        }
        Ok(Value::list(items))
    }

    /// Raw foreign value for a managed value. Proxies give their wrapped
    /// value directly instead of being wrapped again.
    pub(crate) fn foreign_value_of(&mut self, value: &Value) -> Result<ForeignValue, BridgeError> {
        match value {
            Value::Proxy(proxy) => self.lookup(proxy.value()),
            other => {
                let handle = self.to_foreign(other)?;
                self.pop(handle)
            }
        }
    }

    /// Managed value for a raw foreign value held by the caller.
    pub(crate) fn managed_value_of(
        &mut self,
        value: ForeignValue,
        receiver: Option<Handle>,
    ) -> Result<Value, BridgeError> {
        let handle = self.allocate(value);
        self.to_managed(handle, receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::handle::Refcount;
    use crate::bridge::managed::Function;
    use crate::config::BridgeConfig;

    #[test]
    fn test_sentinels_need_no_allocation() {
        let mut bridge = Bridge::new();
        assert_eq!(bridge.to_foreign(&Value::None).unwrap(), Handle::UNDEFINED);
        assert_eq!(bridge.to_foreign(&Value::Bool(true)).unwrap(), Handle::TRUE);
        assert_eq!(bridge.to_foreign(&Value::Bool(false)).unwrap(), Handle::FALSE);
        assert_eq!(bridge.to_managed(Handle::NULL, None).unwrap(), Value::None);
        assert_eq!(bridge.to_managed(Handle::NO_VALUE, None).unwrap(), Value::None);
        assert_eq!(bridge.to_managed(Handle::TRUE, None).unwrap(), Value::Bool(true));
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_numbers() {
        let mut bridge = Bridge::new();
        let h = bridge.to_foreign(&Value::Int(7)).unwrap();
        assert!(matches!(bridge.lookup(h), Ok(ForeignValue::Number(n)) if n == 7.0));
        assert_eq!(bridge.to_managed(h, None).unwrap(), Value::Int(7));

        let h = bridge.allocate(ForeignValue::Number(2.5));
        assert!(matches!(bridge.to_managed(h, None).unwrap(), Value::Float(f) if f == 2.5));

        // An integral double is an int on the managed side
        let h = bridge.allocate(ForeignValue::Number(3.0));
        assert_eq!(bridge.to_managed(h, None).unwrap(), Value::Int(3));
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_wide_integers_decimal_string() {
        let mut bridge = Bridge::new();
        let h = bridge.to_foreign(&Value::Int(i64::MAX)).unwrap();
        assert_eq!(bridge.lookup(h).unwrap().to_host_string(), i64::MAX.to_string());
        assert_eq!(bridge.to_managed(h, None).unwrap(), Value::Int(i64::MAX));

        let huge: BigInt = "-98765432109876543210987654321".parse().unwrap();
        let h = bridge.to_foreign(&Value::long(huge.clone())).unwrap();
        match bridge.to_managed(h, None).unwrap() {
            Value::Long(n) => assert_eq!(*n, huge),
            other => panic!("expected long, got {:?}", other),
        }
    }

    #[test]
    fn test_wide_integers_float_policy() {
        let config = BridgeConfig {
            integer_policy: IntegerPolicy::Float,
            ..BridgeConfig::default()
        };
        let mut bridge = Bridge::with_config(config);
        let h = bridge.to_foreign(&Value::Int((1 << 53) + 1)).unwrap();
        assert!(matches!(bridge.lookup(h), Ok(ForeignValue::Number(n)) if n == 9007199254740992.0));
        bridge.decref(h).unwrap();
    }

    #[test]
    fn test_list_roundtrip() {
        let mut bridge = Bridge::new();
        let list = Value::list(vec![
            Value::Int(1),
            Value::str("two"),
            Value::list(vec![Value::Bool(true), Value::None]),
            Value::Float(0.5),
        ]);
        let h = bridge.to_foreign(&list).unwrap();
        assert_eq!(bridge.lookup(h).unwrap().len(), Some(4));
        assert_eq!(bridge.to_managed(h, None).unwrap(), list);
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_list_failure_releases_partial_array() {
        let mut bridge = Bridge::new();
        let list = Value::list(vec![
            Value::str("kept"),
            Value::Instance(crate::bridge::managed::Instance::new("Widget")),
        ]);
        let err = bridge.to_foreign(&list).unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedType(name) if name == "Widget"));
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_depth_limit() {
        let config = BridgeConfig {
            max_depth: 2,
            ..BridgeConfig::default()
        };
        let mut bridge = Bridge::with_config(config);
        let nested = Value::list(vec![Value::list(vec![Value::list(vec![])])]);
        assert!(matches!(bridge.to_foreign(&nested), Err(BridgeError::DepthExceeded(2))));
        assert_eq!(bridge.count_live(), 0);

        let inner = ForeignValue::array(vec![ForeignValue::array(vec![])]);
        let outer = bridge.allocate(ForeignValue::array(vec![inner]));
        assert!(matches!(bridge.to_managed(outer, None), Err(BridgeError::DepthExceeded(2))));
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_proxy_passes_through() {
        let mut bridge = Bridge::new();
        let h = bridge.allocate(ForeignValue::object());
        let value = bridge.to_managed(h, None).unwrap();
        let proxy = value.as_proxy().unwrap().clone();
        assert_eq!(proxy.value(), h);

        let again = bridge.to_foreign(&value).unwrap();
        assert_eq!(again, h);
        assert_eq!(bridge.handles().refcount(h), Some(Refcount::Counted(2)));
        bridge.decref(again).unwrap();
        drop(value);
        drop(proxy);
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_callable_keeps_receiver() {
        let mut bridge = Bridge::new();
        let receiver = bridge.allocate(ForeignValue::object());
        let f = bridge.allocate(ForeignValue::function("f", |_, _, _| Ok(ForeignValue::Null)));
        let value = bridge.to_managed(f, Some(receiver)).unwrap();
        assert!(value.is_callable());
        assert_eq!(value.as_proxy().unwrap().receiver(), Some(receiver));
        assert_eq!(bridge.handles().refcount(receiver), Some(Refcount::Counted(2)));
        drop(value);
        bridge.decref(receiver).unwrap();
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_managed_function_unwraps() {
        let mut bridge = Bridge::new();
        let f = Value::Function(Function::new("f", |_, _| Ok(Value::None)));
        let h = bridge.to_foreign(&f).unwrap();
        let back = bridge.to_managed(h, None).unwrap();
        assert_eq!(back, f);
        assert_eq!(bridge.count_live(), 0);
        assert!(bridge.registry().is_empty());
    }
}
