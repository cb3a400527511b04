//! Proxies in both directions.
//!
//! `Proxy` is the managed-side stand-in for a foreign value. `ProxyRegistry`
//! is the reverse direction: it gives managed values handed to the foreign
//! side a stable numeric id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::error::BridgeError;
use super::handle::{Handle, HandleTable};
use super::managed::Value;

/// A managed object wrapping a foreign handle.
///
/// The proxy owns one reference to `value` and, when present, one to
/// `receiver`. Both are released exactly once when the proxy is dropped.
pub struct Proxy {
    /// Handle of the wrapped foreign value
    value: Handle,
    /// Bound `this` for callables read off an object
    receiver: Option<Handle>,
    /// Whether `value` was a function when the proxy was made
    callable: bool,
    /// Weak so proxies outliving their bridge drop quietly
    table: Weak<RefCell<HandleTable>>,
}

impl Proxy {
    pub(crate) fn new(
        value: Handle,
        receiver: Option<Handle>,
        callable: bool,
        table: Weak<RefCell<HandleTable>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            value,
            receiver,
            callable,
            table,
        })
    }

    pub fn value(&self) -> Handle {
        self.value
    }

    /// Receiver used when the wrapped value is invoked as a method.
    pub fn receiver(&self) -> Option<Handle> {
        self.receiver
    }

    pub fn is_callable(&self) -> bool {
        self.callable
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        for handle in std::iter::once(self.value).chain(self.receiver) {
            let released = table.borrow_mut().decref(handle);
            match released {
                Ok(freed) => drop(freed),
                Err(e) => {
                    log::error!("proxy release failed: {}", e);
                    debug_assert!(false, "proxy release failed: {}", e);
                }
            }
        }
    }
}

struct Registered {
    value: Value,
    /// Live foreign wrappers of `value`
    uses: usize,
}

/// Id-keyed table of managed values referenced from the foreign side.
pub struct ProxyRegistry {
    entries: HashMap<u32, Registered>,
    /// Managed value identity to id, so a value keeps one id while registered
    identities: HashMap<usize, u32>,
    /// Next candidate id; 0 is never handed out
    counter: u32,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            identities: HashMap::new(),
            counter: 1,
        }
    }

    /// Register one more use of `value` and return its id. The same value
    /// (by identity) always gets the same id while it is registered.
    pub fn wrap(&mut self, value: &Value) -> Result<u32, BridgeError> {
        let identity = value
            .identity()
            .ok_or_else(|| BridgeError::UnsupportedType(value.type_name()))?;

        if let Some(&id) = self.identities.get(&identity) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.uses += 1;
                return Ok(id);
            }
        }

        while self.counter == 0 || self.entries.contains_key(&self.counter) {
            self.counter = self.counter.wrapping_add(1);
        }
        let id = self.counter;
        self.counter = self.counter.wrapping_add(1);

        self.entries.insert(
            id,
            Registered {
                value: value.clone(),
                uses: 1,
            },
        );
        self.identities.insert(identity, id);
        Ok(id)
    }

    /// Drop one use of `id`. At zero the entry is removed and the value is
    /// returned so the caller can drop it outside the registry borrow.
    ///
    /// Each foreign wrapper delivers this at most once.
    #[must_use = "the freed value must be dropped outside the registry borrow"]
    pub fn release(&mut self, id: u32) -> Option<Value> {
        let Some(entry) = self.entries.get_mut(&id) else {
            log::warn!("release of unknown callable id {}", id);
            return None;
        };
        if entry.uses > 1 {
            entry.uses -= 1;
            return None;
        }
        let entry = self.entries.remove(&id)?;
        if let Some(identity) = entry.value.identity() {
            if self.identities.get(&identity) == Some(&id) {
                self.identities.remove(&identity);
            }
        }
        Some(entry.value)
    }

    pub fn lookup(&self, id: u32) -> Result<Value, BridgeError> {
        self.entries
            .get(&id)
            .map(|entry| entry.value.clone())
            .ok_or(BridgeError::InvalidCallableId(id))
    }

    pub fn uses(&self, id: u32) -> Option<usize> {
        self.entries.get(&id).map(|entry| entry.uses)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
