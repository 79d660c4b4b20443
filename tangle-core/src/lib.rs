//! Tangle Core
//!
//! This crate provides a fine-grained reactive runtime. It discovers which
//! computations read which state and re-runs exactly those computations
//! when that state changes. It implements:
//!
//! - Dependency tracking over keyed reactive objects
//! - Effects with lazy and scheduled execution
//! - Memoized computed values
//! - Watchers with flush timing and stale-callback invalidation
//! - A de-duplicating, batched job queue
//!
//! # Architecture
//!
//! - `reactive`: dependency store, effect runtime, objects, computed, watch
//! - `scheduler`: the job queue used for batched, deferred delivery
//! - `config`: per-thread runtime configuration
//! - `error`: error types
//!
//! All runtime state is thread-local. Handles are `Rc`-based and stay on the
//! thread that created them.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tangle_core::{computed, effect, EffectOptions, ReactiveObject};
//!
//! let count = ReactiveObject::new();
//! count.set("value", 1);
//!
//! // A derived value
//! let reader = count.clone();
//! let doubled = computed(move || reader.get("value").and_then(|v| v.as_int()).unwrap_or(0) * 2);
//!
//! // An effect reading it
//! let seen = Rc::new(Cell::new(0));
//! let sink = seen.clone();
//! let doubled_reader = doubled.clone();
//! let _effect = effect(move || sink.set(doubled_reader.get()), EffectOptions::new());
//! assert_eq!(seen.get(), 2);
//!
//! // Update the state: the effect re-runs synchronously
//! count.set("value", 5);
//! assert_eq!(seen.get(), 10);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::{config, configure, RuntimeConfig};
pub use error::{ReactiveError, Result};
pub use reactive::{
    computed, effect, watch, Computed, Effect, EffectOptions, EffectRef, FlushMode, OnInvalidate,
    ReactiveObject, Value, WatchHandle, WatchOptions,
};
pub use scheduler::{flush_jobs, next_tick, queue_scheduler};
