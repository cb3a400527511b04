//! Attribute protocol of foreign objects seen through a proxy.

use std::rc::Rc;

use super::error::BridgeError;
use super::foreign::ForeignValue;
use super::managed::{Exception, ExceptionKind, ManagedResult, Value};
use super::proxy::Proxy;
use super::Bridge;

impl Bridge {
    /// A proxy around a fresh, empty foreign object.
    pub fn new_object(&mut self) -> Result<Value, BridgeError> {
        self.managed_value_of(ForeignValue::object(), None)
    }

    /// Read `name` off the proxied value, or `None` when it has no such
    /// property. Callable results are bound to the proxied value.
    pub(crate) fn property(&mut self, proxy: &Proxy, name: &str) -> Result<Option<Value>, BridgeError> {
        let target = self.lookup(proxy.value())?;
        match target.get(name) {
            Some(value) => Ok(Some(self.managed_value_of(value, Some(proxy.value()))?)),
            None => Ok(None),
        }
    }

    pub fn get_attr(&mut self, proxy: &Proxy, name: &str) -> ManagedResult {
        match self.property(proxy, name)? {
            Some(value) => Ok(value),
            None => Err(Exception::new(
                ExceptionKind::AttributeError,
                format!("'ForeignObject' object has no attribute '{}'", name),
            )),
        }
    }

    pub fn set_attr(&mut self, proxy: &Proxy, name: &str, value: &Value) -> Result<(), Rc<Exception>> {
        if name.starts_with("__") {
            return Err(Exception::new(
                ExceptionKind::AttributeError,
                format!("'ForeignObject' attribute '{}' is read-only", name),
            ));
        }
        let foreign = self.foreign_value_of(value)?;
        let target = self.lookup(proxy.value())?;
        if target.set(name, foreign) {
            Ok(())
        } else {
            Err(Exception::new(
                ExceptionKind::TypeError,
                format!("cannot set property '{}' on {}", name, target.type_name()),
            ))
        }
    }

    pub fn del_attr(&mut self, proxy: &Proxy, name: &str) -> Result<(), Rc<Exception>> {
        let target = self.lookup(proxy.value())?;
        let removed = target.delete(name);
        drop(target);
        match removed {
            Some(_) => Ok(()),
            None => Err(Exception::new(
                ExceptionKind::AttributeError,
                format!("'ForeignObject' object has no attribute '{}'", name),
            )),
        }
    }

    /// Subscript access; a missing key reads as `None`.
    pub fn get_item(&mut self, proxy: &Proxy, key: &Value) -> ManagedResult {
        let key = match key {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.to_string(),
            other => self.foreign_value_of(other)?.to_host_string(),
        };
        Ok(self.property(proxy, &key)?.unwrap_or(Value::None))
    }

    /// Sorted property names, leaving out array indices and other names
    /// starting with a digit.
    pub fn dir(&self, proxy: &Proxy) -> Result<Vec<String>, BridgeError> {
        let target = self.lookup(proxy.value())?;
        let mut names: Vec<String> = target
            .keys()
            .into_iter()
            .filter(|name| !name.starts_with(|c: char| c.is_ascii_digit()))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn repr(&self, proxy: &Proxy) -> Result<String, BridgeError> {
        Ok(format!("<ForeignObject id={} '{}'>", proxy.value(), self.str(proxy)?))
    }

    pub fn str(&self, proxy: &Proxy) -> Result<String, BridgeError> {
        Ok(self.lookup(proxy.value())?.to_host_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::managed::Function;

    fn object_proxy(bridge: &mut Bridge) -> Rc<Proxy> {
        match bridge.new_object().unwrap() {
            Value::Proxy(p) => p,
            other => panic!("expected proxy, got {:?}", other),
        }
    }

    #[test]
    fn test_attribute_lifecycle() {
        let mut bridge = Bridge::new();
        let obj = object_proxy(&mut bridge);

        let err = bridge.get_attr(&obj, "x").unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::AttributeError);

        bridge.set_attr(&obj, "x", &Value::Int(5)).unwrap();
        assert_eq!(bridge.get_attr(&obj, "x").unwrap(), Value::Int(5));
        assert_eq!(bridge.get_item(&obj, &Value::str("x")).unwrap(), Value::Int(5));
        assert_eq!(bridge.get_item(&obj, &Value::str("y")).unwrap(), Value::None);

        bridge.del_attr(&obj, "x").unwrap();
        assert!(bridge.get_attr(&obj, "x").is_err());
        assert!(bridge.del_attr(&obj, "x").is_err());

        drop(obj);
        assert_eq!(bridge.count_live(), 0);
    }

    #[test]
    fn test_dunder_names_rejected() {
        let mut bridge = Bridge::new();
        let obj = object_proxy(&mut bridge);
        let err = bridge.set_attr(&obj, "__class__", &Value::None).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::AttributeError);
    }

    #[test]
    fn test_method_binds_receiver() {
        let mut bridge = Bridge::new();
        let obj = object_proxy(&mut bridge);
        bridge.set_attr(&obj, "name", &Value::str("box")).unwrap();
        let target = bridge.lookup(obj.value()).unwrap();
        target.set(
            "greet",
            ForeignValue::function("greet", |_, this, _| {
                let name = this.get("name").map(|n| n.to_host_string()).unwrap_or_default();
                Ok(ForeignValue::string(format!("hello {}", name)))
            }),
        );

        let greet = bridge.get_attr(&obj, "greet").unwrap();
        assert_eq!(greet.as_proxy().unwrap().receiver(), Some(obj.value()));
        assert_eq!(bridge.call_value(&greet, &[]).unwrap(), Value::str("hello box"));
    }

    #[test]
    fn test_managed_function_stored_on_object() {
        let mut bridge = Bridge::new();
        let obj = object_proxy(&mut bridge);
        let f = Value::Function(Function::new("f", |_, _| Ok(Value::Int(1))));
        bridge.set_attr(&obj, "callback", &f).unwrap();
        assert_eq!(bridge.registry().len(), 1);
        assert_eq!(bridge.get_attr(&obj, "callback").unwrap(), f);
        bridge.del_attr(&obj, "callback").unwrap();
        assert!(bridge.registry().is_empty());
    }

    #[test]
    fn test_dir_and_repr() {
        let mut bridge = Bridge::new();
        let obj = object_proxy(&mut bridge);
        bridge.set_attr(&obj, "b", &Value::Int(1)).unwrap();
        bridge.set_attr(&obj, "a", &Value::Int(2)).unwrap();
        bridge.set_attr(&obj, "0x", &Value::Int(3)).unwrap();
        assert_eq!(bridge.dir(&obj).unwrap(), vec!["a", "b"]);
        assert_eq!(
            bridge.repr(&obj).unwrap(),
            format!("<ForeignObject id={} '[object Object]'>", obj.value())
        );

        let arr = bridge.make_proxy(ForeignValue::array(vec![ForeignValue::Number(1.0)]), None).unwrap();
        assert_eq!(bridge.dir(&arr).unwrap(), vec!["length"]);
        assert_eq!(bridge.get_item(&arr, &Value::Int(0)).unwrap(), Value::Int(1));
        assert_eq!(bridge.str(&arr).unwrap(), "1");
    }
}
