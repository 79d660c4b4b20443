//! Computed Values
//!
//! A [`Computed`] is a cached derived value that re-evaluates only when its
//! dependencies change, and only when someone reads it.
//!
//! # How Computed Values Work
//!
//! 1. The getter is wrapped in a lazy effect. Nothing runs on creation.
//!
//! 2. On [`Computed::get`], if the node is dirty, the effect runs, the result
//!    is cached and the node becomes clean.
//!
//! 3. When a dependency changes, the effect's scheduler does not recompute.
//!    It marks the node dirty and triggers the node's own [`Key::Value`], so
//!    effects that read the computed value re-run and pull the new value.
//!
//! 4. Reading the value inside an effect tracks `(node, Value)`, which makes
//!    the node a reactive source like any object field.
//!
//! The getter therefore runs at most once between invalidations, no matter
//! how often the value is read.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::effect::{Effect, EffectOptions};
use super::key::{Key, TargetId, TriggerOp};
use super::runtime::Runtime;

struct ComputedInner<T: 'static> {
    target: TargetId,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    effect: Effect<T>,
}

impl<T: 'static> ComputedInner<T> {
    /// Scheduler body: a dependency changed.
    ///
    /// Triggers even when already dirty: a reader that invalidated the node
    /// itself was skipped by that trigger and still holds a stale value.
    fn invalidate(&self) {
        self.dirty.set(true);
        Runtime::trigger(self.target, &Key::Value, TriggerOp::Set);
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.dispose();
        Runtime::release_target(self.target);
    }
}

/// A lazily evaluated, memoized value derived from reactive state.
///
/// # Example
///
/// ```rust
/// use tangle_core::reactive::{Computed, ReactiveObject};
///
/// let data = ReactiveObject::new();
/// data.set("foo", 1);
/// data.set("bar", 2);
///
/// let reader = data.clone();
/// let sum = Computed::new(move || {
///     let foo = reader.get("foo").and_then(|v| v.as_int()).unwrap_or(0);
///     let bar = reader.get("bar").and_then(|v| v.as_int()).unwrap_or(0);
///     foo + bar
/// });
///
/// assert_eq!(sum.get(), 3);
/// data.set("foo", 10);
/// assert_eq!(sum.get(), 12);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. The getter does not run until first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let this = this.clone();
            let options = EffectOptions::new()
                .lazy()
                .named("computed")
                .with_scheduler(move |_| {
                    if let Some(inner) = this.upgrade() {
                        inner.invalidate();
                    }
                });

            ComputedInner {
                target: TargetId::new(),
                value: RefCell::new(None),
                dirty: Cell::new(true),
                effect: Effect::with_options(getter, options),
            }
        });

        Self { inner }
    }

    /// Get the current value, recomputing if a dependency changed.
    ///
    /// Inside an effect, this also subscribes that effect to the value.
    pub fn get(&self) -> T {
        let value = self.current();
        if ReactiveContext::is_active() {
            Runtime::track(self.inner.target, &Key::Value);
        }
        value
    }

    fn current(&self) -> T {
        if !self.inner.dirty.get() {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                return value.clone();
            }
        }

        let value = self.inner.effect.run();
        let previous = self.inner.value.replace(Some(value.clone()));
        drop(previous);
        self.inner.dirty.set(false);
        value
    }
}

impl<T: 'static> Computed<T> {
    /// The identity readers track this value under.
    pub fn id(&self) -> TargetId {
        self.inner.target
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Check if the value has been computed at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.target)
            .field("dirty", &self.is_dirty())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

/// Create a [`Computed`] from `getter`.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
