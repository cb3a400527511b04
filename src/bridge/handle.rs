//! Handle table for foreign values held by the bridge.
//!
//! Handles are non-zero integers. Odd handles are ephemeral and refcounted;
//! even handles are permanent sentinels that are never reclaimed. Handle zero
//! means "no value" and is never allocated.

use std::collections::HashMap;
use std::fmt;

use super::error::BridgeError;
use super::foreign::{ForeignValue, IdentityKey};

/// An opaque reference to a foreign value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub const NONE: Handle = Handle(0);
    pub const UNDEFINED: Handle = Handle(2);
    pub const TRUE: Handle = Handle(4);
    pub const FALSE: Handle = Handle(6);
    pub const NULL: Handle = Handle(8);
    pub const NO_VALUE: Handle = Handle(10);

    /// First permanent handle available for interned host objects.
    const FIRST_INTERNED: u32 = 12;

    pub fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_ephemeral(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_permanent(self) -> bool {
        self.0 != 0 && self.0 & 1 == 0
    }

    pub fn from_bool(b: bool) -> Self {
        if b { Handle::TRUE } else { Handle::FALSE }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference count of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refcount {
    Counted(usize),
    /// Never collected
    Permanent,
}

struct Entry {
    value: ForeignValue,
    /// Outstanding references; `Permanent` for sentinels and interned values
    refs: Refcount,
}

/// Registry mapping handles to foreign values.
pub struct HandleTable {
    /// Live handles, permanent ones included
    entries: HashMap<Handle, Entry>,
    /// Reverse index used to dedup allocations of the same value
    identities: HashMap<IdentityKey, Handle>,
    /// Next candidate ephemeral handle (always odd)
    counter: u32,
    /// Next handle `intern` hands out (always even)
    next_permanent: u32,
}

impl HandleTable {
    pub fn new() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
            identities: HashMap::new(),
            counter: 1,
            next_permanent: Handle::FIRST_INTERNED,
        };
        table.seed(Handle::UNDEFINED, ForeignValue::Undefined, true);
        table.seed(Handle::TRUE, ForeignValue::Bool(true), true);
        table.seed(Handle::FALSE, ForeignValue::Bool(false), true);
        table.seed(Handle::NULL, ForeignValue::Null, true);
        table.seed(Handle::NO_VALUE, ForeignValue::Undefined, false);
        table
    }

    fn seed(&mut self, handle: Handle, value: ForeignValue, index: bool) {
        if index {
            self.identities.insert(value.identity(), handle);
        }
        self.entries.insert(
            handle,
            Entry {
                value,
                refs: Refcount::Permanent,
            },
        );
    }

    /// Get a handle for `value`, reusing the existing one if this exact value
    /// is already held.
    pub fn allocate(&mut self, value: ForeignValue) -> Handle {
        let key = value.identity();
        if let Some(&handle) = self.identities.get(&key) {
            if let Some(entry) = self.entries.get_mut(&handle) {
                if let Refcount::Counted(n) = &mut entry.refs {
                    *n += 1;
                }
                return handle;
            }
        }

        while self.entries.contains_key(&Handle(self.counter)) {
            self.counter = self.counter.wrapping_add(2);
        }
        let handle = Handle(self.counter);
        self.counter = self.counter.wrapping_add(2);

        self.entries.insert(
            handle,
            Entry {
                value,
                refs: Refcount::Counted(1),
            },
        );
        self.identities.insert(key, handle);
        log::trace!("allocated handle {}", handle);
        handle
    }

    /// Register a host object under a new permanent handle. Later
    /// allocations of the same object resolve to it.
    pub fn intern(&mut self, value: ForeignValue) -> Handle {
        let handle = Handle(self.next_permanent);
        self.next_permanent += 2;
        self.identities.insert(value.identity(), handle);
        self.entries.insert(
            handle,
            Entry {
                value,
                refs: Refcount::Permanent,
            },
        );
        handle
    }

    /// Add a reference. A no-op for permanent handles and for
    /// [`Handle::NONE`], which a failed call may hand back.
    pub fn incref(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if handle.is_none() || handle.is_permanent() {
            return Ok(());
        }
        match self.entries.get_mut(&handle) {
            Some(Entry {
                refs: Refcount::Counted(n),
                ..
            }) => {
                *n += 1;
                Ok(())
            }
            _ => Err(BridgeError::InvalidHandle(handle.0)),
        }
    }

    /// Drop one reference. When the count reaches zero the entry and its
    /// identity mapping are removed together and the value is handed back, so
    /// the caller drops it after releasing any borrow of the table.
    #[must_use = "the freed value must be dropped outside the table borrow"]
    pub fn decref(&mut self, handle: Handle) -> Result<Option<ForeignValue>, BridgeError> {
        if handle.is_none() || handle.is_permanent() {
            return Ok(None);
        }
        let refs = self
            .entries
            .get(&handle)
            .map(|entry| entry.refs)
            .ok_or(BridgeError::InvalidHandle(handle.0))?;
        match refs {
            Refcount::Counted(0) => Err(BridgeError::RefcountUnderflow(handle.0)),
            Refcount::Counted(n) if n > 1 => {
                if let Some(entry) = self.entries.get_mut(&handle) {
                    entry.refs = Refcount::Counted(n - 1);
                }
                Ok(None)
            }
            Refcount::Counted(_) => {
                let Some(entry) = self.entries.remove(&handle) else {
                    return Err(BridgeError::InvalidHandle(handle.0));
                };
                let key = entry.value.identity();
                if self.identities.get(&key) == Some(&handle) {
                    self.identities.remove(&key);
                }
                log::trace!("freed handle {}", handle);
                Ok(Some(entry.value))
            }
            Refcount::Permanent => Ok(None),
        }
    }

    pub fn lookup(&self, handle: Handle) -> Result<ForeignValue, BridgeError> {
        self.entries
            .get(&handle)
            .map(|entry| entry.value.clone())
            .ok_or(BridgeError::InvalidHandle(handle.0))
    }

    /// Read a value and drop one reference to it.
    pub fn pop(&mut self, handle: Handle) -> Result<ForeignValue, BridgeError> {
        let value = self.lookup(handle)?;
        // `value` keeps the object alive, so nothing is destroyed here
        let _freed = self.decref(handle)?;
        Ok(value)
    }

    pub fn refcount(&self, handle: Handle) -> Option<Refcount> {
        self.entries.get(&handle).map(|entry| entry.refs)
    }

    /// Number of live ephemeral entries.
    pub fn count_live(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| matches!(entry.refs, Refcount::Counted(_)))
            .count()
    }

    #[cfg(test)]
    fn with_counter(counter: u32) -> Self {
        let mut table = Self::new();
        table.counter = counter | 1;
        table
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sentinels() {
        let mut table = HandleTable::new();
        assert!(matches!(table.lookup(Handle::UNDEFINED), Ok(ForeignValue::Undefined)));
        assert!(matches!(table.lookup(Handle::TRUE), Ok(ForeignValue::Bool(true))));
        assert!(matches!(table.lookup(Handle::NULL), Ok(ForeignValue::Null)));
        assert_eq!(table.allocate(ForeignValue::Bool(false)), Handle::FALSE);
        assert_eq!(table.allocate(ForeignValue::Null), Handle::NULL);
        assert_eq!(table.refcount(Handle::FALSE), Some(Refcount::Permanent));
        assert!(table.decref(Handle::TRUE).unwrap().is_none());
        assert!(table.lookup(Handle::TRUE).is_ok());
        assert_eq!(table.count_live(), 0);
    }

    #[test]
    fn test_identity_dedup() {
        let mut table = HandleTable::new();
        let obj = ForeignValue::object();
        let a = table.allocate(obj.clone());
        let b = table.allocate(obj.clone());
        assert_eq!(a, b);
        assert!(a.is_ephemeral());
        assert_eq!(table.refcount(a), Some(Refcount::Counted(2)));

        let other = table.allocate(ForeignValue::object());
        assert_ne!(a, other);
        assert_eq!(table.count_live(), 2);
    }

    #[test]
    fn test_strings_dedup_by_content() {
        let mut table = HandleTable::new();
        let a = table.allocate(ForeignValue::string("hello"));
        let b = table.allocate(ForeignValue::string("hello"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_decref_removes_entry_and_identity() {
        let mut table = HandleTable::new();
        let obj = ForeignValue::object();
        let h = table.allocate(obj.clone());
        table.incref(h).unwrap();
        assert!(table.decref(h).unwrap().is_none());
        assert!(table.decref(h).unwrap().is_some());
        assert!(matches!(table.lookup(h), Err(BridgeError::InvalidHandle(_))));
        assert!(matches!(table.decref(h), Err(BridgeError::InvalidHandle(_))));

        // Same object comes back under a new handle
        let again = table.allocate(obj);
        assert_ne!(again, h);
        assert_eq!(table.refcount(again), Some(Refcount::Counted(1)));
    }

    #[test]
    fn test_null_handle_only_fails_lookup() {
        let mut table = HandleTable::new();
        assert!(table.incref(Handle::NONE).is_ok());
        assert!(matches!(table.decref(Handle::NONE), Ok(None)));
        assert!(table.lookup(Handle::NONE).is_err());
    }

    #[test]
    fn test_pop_consumes_reference() {
        let mut table = HandleTable::new();
        let h = table.allocate(ForeignValue::string("x"));
        let value = table.pop(h).unwrap();
        assert_eq!(value.to_host_string(), "x");
        assert_eq!(table.count_live(), 0);
    }

    #[test]
    fn test_intern_is_permanent() {
        let mut table = HandleTable::new();
        let global = ForeignValue::object();
        let h = table.intern(global.clone());
        assert_eq!(h.raw(), 12);
        assert!(h.is_permanent());
        assert!(table.decref(h).unwrap().is_none());
        assert!(table.lookup(h).is_ok());
        assert_eq!(table.allocate(global), h);
        assert_eq!(table.count_live(), 0);
        assert_eq!(table.intern(ForeignValue::object()).raw(), 14);
    }

    #[test]
    fn test_counter_skips_occupied_and_wraps() {
        let mut table = HandleTable::with_counter(u32::MAX - 2);
        let a = table.allocate(ForeignValue::object());
        let b = table.allocate(ForeignValue::object());
        let c = table.allocate(ForeignValue::object());
        assert_eq!(a.raw(), u32::MAX - 2);
        assert_eq!(b.raw(), u32::MAX);
        assert_eq!(c.raw(), 1);

        // Wrap again onto occupied slots
        let mut table = HandleTable::with_counter(1);
        let first = table.allocate(ForeignValue::object());
        table.counter = 1;
        let second = table.allocate(ForeignValue::object());
        assert_eq!(first.raw(), 1);
        assert_eq!(second.raw(), 3);
    }

    #[test]
    fn test_live_handles_never_collide() {
        let mut table = HandleTable::new();
        let mut live: Vec<Handle> = Vec::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..2000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            if seed % 3 == 0 && !live.is_empty() {
                let idx = (seed as usize / 3) % live.len();
                let h = live.swap_remove(idx);
                let _ = table.decref(h).unwrap();
            } else {
                let h = table.allocate(ForeignValue::object());
                assert!(!h.is_none());
                assert!(h.is_ephemeral());
                live.push(h);
            }
            let unique: HashSet<_> = live.iter().collect();
            assert_eq!(unique.len(), live.len());
        }
        assert_eq!(table.count_live(), live.len());
    }
}
