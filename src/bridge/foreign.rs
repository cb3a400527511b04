//! Model of the foreign (host) heap.
//!
//! Heap kinds (arrays, objects, functions) are reference counted and compared
//! by pointer identity. Primitives are compared by value, which is how a host
//! `Map` keys them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::Bridge;
use super::proxy::ProxyRegistry;

/// Largest integer magnitude a double represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Property under which a thrown error carries its managed original.
pub const MANAGED_ERROR_KEY: &str = "__managed__";

/// A host function implemented in Rust.
///
/// Receives the bridge context, the receiver and the argument list. An `Err`
/// is a thrown value.
pub type NativeFn =
    dyn Fn(&mut Bridge, &ForeignValue, &[ForeignValue]) -> Result<ForeignValue, ForeignValue>;

/// A value living on the foreign heap.
#[derive(Clone)]
pub enum ForeignValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Arbitrary precision integer held as decimal text
    BigInt(Rc<str>),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<ForeignValue>>>),
    Object(Rc<ForeignObject>),
    Function(Rc<ForeignFunction>),
}

/// A plain host object: a class tag and a property map.
pub struct ForeignObject {
    /// Constructor name shown by `toString`
    class: String,
    /// Own properties, in name order
    props: RefCell<BTreeMap<String, ForeignValue>>,
}

impl ForeignObject {
    pub fn class(&self) -> &str {
        &self.class
    }
}

/// A callable host value.
pub struct ForeignFunction {
    name: String,
    /// Rust body, or a managed value behind a registry id
    kind: FunctionKind,
}

pub(crate) enum FunctionKind {
    Native(Rc<NativeFn>),
    Managed(ManagedWrapper),
}

/// Foreign-side wrapper around a managed value registered in the reverse
/// registry. Dropping the wrapper is the finalization signal: it releases one
/// use of the registry entry.
pub(crate) struct ManagedWrapper {
    /// Reverse registry id of the wrapped value
    id: u32,
    /// Weak so a wrapper outliving its bridge drops quietly
    registry: Weak<RefCell<ProxyRegistry>>,
}

impl ManagedWrapper {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for ManagedWrapper {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let freed = registry.borrow_mut().release(self.id);
            drop(freed);
        }
    }
}

impl ForeignFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the managed value this function wraps, if any.
    pub fn managed_id(&self) -> Option<u32> {
        match &self.kind {
            FunctionKind::Managed(wrapper) => Some(wrapper.id()),
            FunctionKind::Native(_) => None,
        }
    }

    pub(crate) fn kind(&self) -> &FunctionKind {
        &self.kind
    }
}

/// Classification of a foreign value, computed once per crossing.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignKind {
    Null,
    Bool(bool),
    /// A number that is a safe integer
    Int(i64),
    Float(f64),
    BigInt(Rc<str>),
    String(Rc<str>),
    Array,
    /// A wrapper around a managed value, with its registry id
    ManagedCallable(u32),
    Callable,
    Opaque,
}

/// Identity used by the handle table's reverse index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    BigInt(Rc<str>),
    String(Rc<str>),
    Ptr(usize),
}

fn number_key(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

/// Whether `n` is an integer a double holds exactly.
pub fn is_safe_integer(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64
}

impl ForeignValue {
    pub fn string(s: impl AsRef<str>) -> Self {
        ForeignValue::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<ForeignValue>) -> Self {
        ForeignValue::Array(Rc::new(RefCell::new(items)))
    }

    /// A fresh empty plain object.
    pub fn object() -> Self {
        Self::object_of_class("Object")
    }

    pub fn object_of_class(class: impl Into<String>) -> Self {
        ForeignValue::Object(Rc::new(ForeignObject {
            class: class.into(),
            props: RefCell::new(BTreeMap::new()),
        }))
    }

    /// A host error object with `name` and `message` properties.
    pub fn error(name: &str, message: &str) -> Self {
        let error = Self::object_of_class("Error");
        error.set("name", ForeignValue::string(name));
        error.set("message", ForeignValue::string(message));
        error
    }

    /// A host function backed by a Rust closure.
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Bridge, &ForeignValue, &[ForeignValue]) -> Result<ForeignValue, ForeignValue>
            + 'static,
    {
        ForeignValue::Function(Rc::new(ForeignFunction {
            name: name.into(),
            kind: FunctionKind::Native(Rc::new(f)),
        }))
    }

    pub(crate) fn managed_wrapper(
        name: impl Into<String>,
        id: u32,
        registry: Weak<RefCell<ProxyRegistry>>,
    ) -> Self {
        ForeignValue::Function(Rc::new(ForeignFunction {
            name: name.into(),
            kind: FunctionKind::Managed(ManagedWrapper { id, registry }),
        }))
    }

    pub fn classify(&self) -> ForeignKind {
        match self {
            ForeignValue::Undefined | ForeignValue::Null => ForeignKind::Null,
            ForeignValue::Bool(b) => ForeignKind::Bool(*b),
            ForeignValue::Number(n) if is_safe_integer(*n) => ForeignKind::Int(*n as i64),
            ForeignValue::Number(n) => ForeignKind::Float(*n),
            ForeignValue::BigInt(text) => ForeignKind::BigInt(Rc::clone(text)),
            ForeignValue::String(s) => ForeignKind::String(Rc::clone(s)),
            ForeignValue::Array(_) => ForeignKind::Array,
            ForeignValue::Function(f) => match f.managed_id() {
                Some(id) => ForeignKind::ManagedCallable(id),
                None => ForeignKind::Callable,
            },
            ForeignValue::Object(_) => ForeignKind::Opaque,
        }
    }

    pub fn identity(&self) -> IdentityKey {
        match self {
            ForeignValue::Undefined => IdentityKey::Undefined,
            ForeignValue::Null => IdentityKey::Null,
            ForeignValue::Bool(b) => IdentityKey::Bool(*b),
            ForeignValue::Number(n) => IdentityKey::Number(number_key(*n)),
            ForeignValue::BigInt(text) => IdentityKey::BigInt(Rc::clone(text)),
            ForeignValue::String(s) => IdentityKey::String(Rc::clone(s)),
            ForeignValue::Array(a) => IdentityKey::Ptr(Rc::as_ptr(a) as *const () as usize),
            ForeignValue::Object(o) => IdentityKey::Ptr(Rc::as_ptr(o) as *const () as usize),
            ForeignValue::Function(f) => IdentityKey::Ptr(Rc::as_ptr(f) as *const () as usize),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, ForeignValue::Function(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ForeignValue::Undefined => "undefined",
            ForeignValue::Null => "object",
            ForeignValue::Bool(_) => "boolean",
            ForeignValue::Number(_) => "number",
            ForeignValue::BigInt(_) => "bigint",
            ForeignValue::String(_) => "string",
            ForeignValue::Array(_) | ForeignValue::Object(_) => "object",
            ForeignValue::Function(_) => "function",
        }
    }

    /// Read a named property. `None` means the property does not exist,
    /// which is distinct from a property holding `undefined`.
    pub fn get(&self, name: &str) -> Option<ForeignValue> {
        match self {
            ForeignValue::Object(obj) => obj.props.borrow().get(name).cloned(),
            ForeignValue::Array(items) => {
                let items = items.borrow();
                if name == "length" {
                    return Some(ForeignValue::Number(items.len() as f64));
                }
                name.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
            }
            ForeignValue::String(s) => {
                if name == "length" {
                    return Some(ForeignValue::Number(s.chars().count() as f64));
                }
                let index = name.parse::<usize>().ok()?;
                s.chars().nth(index).map(|c| ForeignValue::string(c.to_string()))
            }
            ForeignValue::Function(f) => match name {
                "name" => Some(ForeignValue::string(&f.name)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Write a named property. Returns false if the value cannot hold it.
    pub fn set(&self, name: &str, value: ForeignValue) -> bool {
        match self {
            ForeignValue::Object(obj) => {
                obj.props.borrow_mut().insert(name.to_string(), value);
                true
            }
            ForeignValue::Array(items) => {
                let Ok(index) = name.parse::<usize>() else {
                    return false;
                };
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, ForeignValue::Undefined);
                }
                items[index] = value;
                true
            }
            _ => false,
        }
    }

    /// Remove a named property, returning the removed value.
    pub fn delete(&self, name: &str) -> Option<ForeignValue> {
        match self {
            ForeignValue::Object(obj) => obj.props.borrow_mut().remove(name),
            _ => None,
        }
    }

    /// Own property names, in property order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            ForeignValue::Object(obj) => obj.props.borrow().keys().cloned().collect(),
            ForeignValue::Array(items) => {
                let mut keys: Vec<String> = (0..items.borrow().len()).map(|i| i.to_string()).collect();
                keys.push("length".to_string());
                keys
            }
            ForeignValue::String(s) => {
                let mut keys: Vec<String> = (0..s.chars().count()).map(|i| i.to_string()).collect();
                keys.push("length".to_string());
                keys
            }
            ForeignValue::Function(_) => vec!["name".to_string()],
            _ => Vec::new(),
        }
    }

    /// Append to an array. Returns false for non-arrays.
    pub fn push(&self, value: ForeignValue) -> bool {
        match self {
            ForeignValue::Array(items) => {
                items.borrow_mut().push(value);
                true
            }
            _ => false,
        }
    }

    /// Number of elements if this is an array.
    pub fn len(&self) -> Option<usize> {
        match self {
            ForeignValue::Array(items) => Some(items.borrow().len()),
            _ => None,
        }
    }

    /// The host's `toString()` rendering.
    pub fn to_host_string(&self) -> String {
        match self {
            ForeignValue::Undefined => "undefined".to_string(),
            ForeignValue::Null => "null".to_string(),
            ForeignValue::Bool(b) => b.to_string(),
            ForeignValue::Number(n) => format_number(*n),
            ForeignValue::BigInt(text) => text.to_string(),
            ForeignValue::String(s) => s.to_string(),
            ForeignValue::Array(items) => items
                .borrow()
                .iter()
                .map(|item| match item {
                    ForeignValue::Undefined | ForeignValue::Null => String::new(),
                    other => other.to_host_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            ForeignValue::Object(obj) => {
                if obj.class == "Error" {
                    let name = self
                        .get("name")
                        .map(|n| n.to_host_string())
                        .unwrap_or_else(|| "Error".to_string());
                    let message = self.get("message").map(|m| m.to_host_string()).unwrap_or_default();
                    if message.is_empty() {
                        name
                    } else {
                        format!("{}: {}", name, message)
                    }
                } else {
                    format!("[object {}]", obj.class)
                }
            }
            ForeignValue::Function(f) => format!("function {}() {{ [native code] }}", f.name),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{}", n)
    }
}

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignValue::Undefined => write!(f, "Undefined"),
            ForeignValue::Null => write!(f, "Null"),
            ForeignValue::Bool(b) => write!(f, "Bool({})", b),
            ForeignValue::Number(n) => write!(f, "Number({})", n),
            ForeignValue::BigInt(text) => write!(f, "BigInt({})", text),
            ForeignValue::String(s) => write!(f, "String({:?})", s),
            ForeignValue::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            ForeignValue::Object(obj) => write!(f, "Object({})", obj.class),
            ForeignValue::Function(func) => write!(f, "Function({})", func.name),
        }
    }
}
