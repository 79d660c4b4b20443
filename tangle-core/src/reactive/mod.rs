//! Reactive Primitives
//!
//! This module implements the core reactive system: reactive objects,
//! effects, computed values and watchers.
//!
//! # Concepts
//!
//! ## Reactive Objects
//!
//! A [`ReactiveObject`] is a keyed container for mutable state. Reading a
//! field inside an effect subscribes the effect to that field; writing the
//! field re-runs every subscribed effect.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that records, on every run, exactly the
//! state it read. When any of that state changes the effect runs again, or
//! is handed to its scheduler if it has one.
//!
//! ## Computed Values
//!
//! A [`Computed`] caches the result of a getter and recomputes lazily, on the
//! first read after a dependency changed.
//!
//! ## Watchers
//!
//! [`watch`] calls back with old and new values when a getter's result or a
//! whole object tree changes, synchronously or batched on the job queue.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: a thread-local stack
//! ([`ReactiveContext`]) records which effect is running, and every read
//! subscribes that effect through [`Runtime::track`]. Writes call
//! [`Runtime::trigger`].
//!
//! This approach (sometimes called "transparent reactivity") is used by
//! Vue 3, SolidJS and Leptos.

mod computed;
mod context;
mod effect;
mod key;
mod object;
mod runtime;
mod store;
mod watch;

pub use computed::{computed, Computed};
pub use context::ReactiveContext;
pub use effect::{effect, Effect, EffectId, EffectOptions, EffectRef, Scheduler, WeakEffect};
pub use key::{Key, TargetId, TriggerOp};
pub use object::{ReactiveObject, Value};
pub use runtime::Runtime;
pub use watch::{traverse, watch, FlushMode, OnInvalidate, WatchHandle, WatchOptions, WatchSource};
