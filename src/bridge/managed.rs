//! Model of the managed (interpreter) heap as seen by the bridge.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

use super::Bridge;
use super::proxy::Proxy;

/// Result of a managed call; the error is the raised exception.
pub type ManagedResult = Result<Value, Rc<Exception>>;

/// Body of a managed callable. The bridge context stands in for the
/// interpreter's call mechanism.
pub type NativeFunction = dyn Fn(&mut Bridge, &[Value]) -> ManagedResult;

/// A managed value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// Integer outside the native width
    Long(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Method(Rc<BoundMethod>),
    Exception(Rc<Exception>),
    /// A foreign value seen from the managed side
    Proxy(Rc<Proxy>),
    /// Any other managed object; it has no foreign representation
    Instance(Rc<Instance>),
}

/// A managed function.
pub struct Function {
    /// Name used for the foreign wrapper and in reprs
    name: String,
    body: Box<NativeFunction>,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, body: F) -> Rc<Self>
    where
        F: Fn(&mut Bridge, &[Value]) -> ManagedResult + 'static,
    {
        Rc::new(Self {
            name: name.into(),
            body: Box::new(body),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, bridge: &mut Bridge, args: &[Value]) -> ManagedResult {
        (self.body)(bridge, args)
    }
}

/// A function bound to a receiver; the receiver is passed as the first
/// argument.
pub struct BoundMethod {
    /// Passed as the first argument
    receiver: Value,
    method: Rc<Function>,
}

impl BoundMethod {
    pub fn new(receiver: Value, method: Rc<Function>) -> Rc<Self> {
        Rc::new(Self { receiver, method })
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn method(&self) -> &Rc<Function> {
        &self.method
    }
}

/// An instance of a class the bridge knows nothing about.
pub struct Instance {
    class_name: String,
}

impl Instance {
    pub fn new(class_name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            class_name: class_name.into(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// Exception classes the bridge raises or maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    TypeError,
    ValueError,
    NameError,
    AttributeError,
    RecursionError,
    SystemError,
    KeyboardInterrupt,
}

impl ExceptionKind {
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::SystemError => "SystemError",
            ExceptionKind::KeyboardInterrupt => "KeyboardInterrupt",
        }
    }
}

/// A raised managed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    kind: ExceptionKind,
    /// Message as given, without the kind prefix
    message: String,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            kind,
            message: message.into(),
        })
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Interpreter-style representation, e.g. `ValueError('bad')`.
    pub fn repr(&self) -> String {
        format!("{}({})", self.kind.name(), quote(&self.message))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind.name())
        } else {
            write!(f, "{}: {}", self.kind.name(), self.message)
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// An integer, narrowed to `Int` when it fits.
    pub fn long(n: BigInt) -> Self {
        match i64::try_from(&n) {
            Ok(small) => Value::Int(small),
            Err(_) => Value::Long(Rc::new(n)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Method(_) => true,
            Value::Proxy(p) => p.is_callable(),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Rc<Proxy>> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Pointer identity for heap values that can be registered with the
    /// reverse registry.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::Method(m) => Some(Rc::as_ptr(m) as *const () as usize),
            Value::Exception(e) => Some(Rc::as_ptr(e) as *const () as usize),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) | Value::Long(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Method(_) => "method".to_string(),
            Value::Exception(e) => e.kind().name().to_string(),
            Value::Proxy(_) => "ForeignObject".to_string(),
            Value::Instance(i) => i.class_name().to_string(),
        }
    }

    /// Interpreter-style representation. Proxies render without consulting
    /// the foreign side; use `Bridge::repr` for the full form.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let parts: Vec<String> = items.borrow().iter().map(|v| v.repr()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.name()),
            Value::Method(m) => format!("<bound method {}>", m.method().name()),
            Value::Exception(e) => e.repr(),
            Value::Proxy(p) => format!("<ForeignObject id={}>", p.value()),
            Value::Instance(i) => format!("<{} object>", i.class_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Int(a), Value::Long(b)) | (Value::Long(b), Value::Int(a)) => {
                BigInt::from(*a) == **b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Proxy(a), Value::Proxy(b)) => a.value() == b.value(),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Rc<Function>> for Value {
    fn from(f: Rc<Function>) -> Self {
        Value::Function(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_narrows() {
        assert_eq!(Value::long(BigInt::from(5)), Value::Int(5));
        let big: BigInt = "123456789012345678901234567890".parse().unwrap();
        assert!(matches!(Value::long(big), Value::Long(_)));
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::list(vec![Value::Int(1), Value::str("x"), Value::None]);
        let b = Value::list(vec![Value::Int(1), Value::str("x"), Value::None]);
        assert_eq!(a, b);
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn test_function_identity() {
        let f = Function::new("f", |_, _| Ok(Value::None));
        let a = Value::Function(Rc::clone(&f));
        let b = Value::Function(f);
        assert_eq!(a.identity(), b.identity());
        let g = Value::Function(Function::new("f", |_, _| Ok(Value::None)));
        assert_ne!(a.identity(), g.identity());
        assert!(Value::Int(1).identity().is_none());
    }

    #[test]
    fn test_repr() {
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::str("it's").repr(), "'it\\'s'");
        assert_eq!(
            Value::list(vec![Value::Bool(true), Value::None]).repr(),
            "[True, None]"
        );
        let exc = Exception::new(ExceptionKind::ValueError, "bad");
        assert_eq!(exc.repr(), "ValueError('bad')");
        assert_eq!(exc.to_string(), "ValueError: bad");
    }
}
