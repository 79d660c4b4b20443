//! Identities and keys for the dependency store.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a tracked state container.
///
/// Reactive objects and computed nodes each allocate one when created. The
/// dependency store is keyed by this ID and never holds the container itself,
/// so an entry in the store does not keep its target alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// A dependency key within one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// An ordinary named field.
    Field(Rc<str>),

    /// The target's own-key enumeration. Only structural changes
    /// (adding or deleting a field) invalidate it.
    Iterate,

    /// The value of a computed node.
    Value,
}

impl Key {
    pub fn field(name: &str) -> Self {
        Key::Field(Rc::from(name))
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::field(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Iterate => f.write_str("<iterate>"),
            Key::Value => f.write_str("<value>"),
        }
    }
}

/// The kind of mutation passed to `trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing field was overwritten.
    Set,
    /// A new field was added.
    Add,
    /// A field was removed.
    Delete,
}

impl TriggerOp {
    /// Whether the operation changes the set of own keys.
    pub fn is_structural(self) -> bool {
        matches!(self, TriggerOp::Add | TriggerOp::Delete)
    }
}
