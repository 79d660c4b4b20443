//! Reactive Objects
//!
//! A [`ReactiveObject`] is a keyed state container whose reads and writes
//! are visible to the runtime. It is the explicit counterpart of property
//! interception: each operation performs its access and calls
//! [`Runtime::track`] or [`Runtime::trigger`] itself.
//!
//! | Operation | Effect on the store |
//! |---|---|
//! | `get`, `has` | track `Field(key)` |
//! | `keys`, `len`, `entries` | track `Iterate` |
//! | `set` on a new key | trigger `Add` (notifies `Iterate` too) |
//! | `set` on an existing key | trigger `Set` if the value changed |
//! | `delete` of an existing key | trigger `Delete` (notifies `Iterate` too) |
//!
//! Every write mutates the object before triggering, so effects re-run
//! synchronously observe the new state.
//!
//! # Memory
//!
//! The store is keyed by the object's [`TargetId`] and holds no reference to
//! the object. When the last handle is dropped, the object releases its
//! store entry.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{ReactiveError, Result};

use super::context::ReactiveContext;
use super::key::{Key, TargetId, TriggerOp};
use super::runtime::Runtime;

/// A value stored in a [`ReactiveObject`].
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// Nested objects are shared, not copied.
    Object(ReactiveObject),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Equality used to decide whether a write changed anything.
    ///
    /// Like `==`, except that NaN is the same value as NaN.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) if a.is_nan() && b.is_nan() => true,
            _ => self == other,
        }
    }

    /// Untracked JSON snapshot.
    ///
    /// Non-finite floats become `null`. Objects must not contain themselves.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Object(object) => object.to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<ReactiveObject> for Value {
    fn from(object: ReactiveObject) -> Self {
        Value::Object(object)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// JSON objects and arrays become fresh reactive objects; arrays are keyed
/// by index (`"0"`, `"1"`, ...).
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                let object = ReactiveObject::new();
                object.extend_untracked(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(index, item)| (index.to_string(), Value::from(item))),
                );
                Value::Object(object)
            }
            serde_json::Value::Object(fields) => {
                let object = ReactiveObject::new();
                object.extend_untracked(
                    fields
                        .into_iter()
                        .map(|(key, item)| (key, Value::from(item))),
                );
                Value::Object(object)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(object) => object.serialize(serializer),
        }
    }
}

struct ObjectInner {
    id: TargetId,
    fields: RefCell<IndexMap<Rc<str>, Value>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        Runtime::release_target(self.id);
    }
}

/// A keyed state container that reports reads and writes to the runtime.
///
/// Cloning produces another handle to the same object.
///
/// # Example
///
/// ```rust
/// use tangle_core::reactive::ReactiveObject;
///
/// let data = ReactiveObject::new();
/// data.set("foo", 1);
///
/// assert!(data.has("foo"));
/// assert_eq!(data.get("foo").and_then(|v| v.as_int()), Some(1));
/// assert_eq!(data.keys(), vec!["foo".to_string()]);
///
/// assert!(data.delete("foo"));
/// assert!(data.is_empty());
/// ```
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Rc<ObjectInner>,
}

impl ReactiveObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: TargetId::new(),
                fields: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Build an object from a JSON object or array.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        let kind = match &json {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "a boolean",
            serde_json::Value::Number(_) => "a number",
            serde_json::Value::String(_) => "a string",
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => "",
        };

        match Value::from(json) {
            Value::Object(object) => Ok(object),
            _ => Err(ReactiveError::NotAnObject(kind)),
        }
    }

    /// The identity this object is tracked under.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a field, tracking it.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.track(|| Key::field(key));
        self.get_untracked(key)
    }

    /// Read a field without establishing a dependency.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.inner.fields.borrow().get(key).cloned()
    }

    /// Check for a field, tracking it.
    pub fn has(&self, key: &str) -> bool {
        self.track(|| Key::field(key));
        self.inner.fields.borrow().contains_key(key)
    }

    /// Own keys in insertion order, tracking the enumeration.
    pub fn keys(&self) -> Vec<String> {
        self.track(|| Key::Iterate);
        self.inner
            .fields
            .borrow()
            .keys()
            .map(|key| key.to_string())
            .collect()
    }

    /// Number of fields, tracking the enumeration.
    pub fn len(&self) -> usize {
        self.track(|| Key::Iterate);
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All fields, tracking the enumeration and every field read.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    /// Write a field and notify subscribers.
    ///
    /// Returns `false` if the field already held the same value, in which
    /// case nothing is triggered.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();

        // The replaced value may own the last handle to another object;
        // keep it alive until the fields borrow ends.
        let mut replaced = None;
        let op = {
            let mut fields = self.inner.fields.borrow_mut();
            match fields.get_mut(key) {
                Some(slot) if slot.same_value(&value) => return false,
                Some(slot) => {
                    replaced = Some(std::mem::replace(slot, value));
                    TriggerOp::Set
                }
                None => {
                    fields.insert(Rc::from(key), value);
                    TriggerOp::Add
                }
            }
        };
        drop(replaced);

        Runtime::trigger(self.inner.id, &Key::field(key), op);
        true
    }

    /// Read-modify-write a field, like `obj.foo += 1`.
    ///
    /// The read is tracked, so calling this inside an effect subscribes the
    /// effect to `key`; the self-trigger guard keeps the write from
    /// re-entering it.
    pub fn update<F>(&self, key: &str, f: F) -> bool
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let current = self.get(key);
        self.set(key, f(current))
    }

    /// Remove a field, notifying field and enumeration subscribers.
    ///
    /// Returns `false` if the field did not exist.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.fields.borrow_mut().shift_remove(key);
        match removed {
            Some(value) => {
                drop(value);
                Runtime::trigger(self.inner.id, &Key::field(key), TriggerOp::Delete);
                true
            }
            None => false,
        }
    }

    /// Untracked JSON snapshot of the object and everything under it.
    pub fn to_json(&self) -> serde_json::Value {
        let fields = self.inner.fields.borrow();
        serde_json::Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_json()))
                .collect(),
        )
    }

    fn track(&self, key: impl FnOnce() -> Key) {
        if ReactiveContext::is_active() {
            Runtime::track(self.inner.id, &key());
        }
    }

    /// Insert fields without triggering. Only used while building.
    fn extend_untracked(&self, fields: impl IntoIterator<Item = (String, Value)>) {
        self.inner.fields.borrow_mut().extend(
            fields
                .into_iter()
                .map(|(key, value)| (Rc::from(key), value)),
        );
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys only: values may reference this object again.
        let fields = self.inner.fields.borrow();
        f.debug_struct("ReactiveObject")
            .field("id", &self.inner.id)
            .field("keys", &fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Serialize for ReactiveObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.inner.fields.borrow();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in fields.iter() {
            map.serialize_entry(&**key, value)?;
        }
        map.end()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
