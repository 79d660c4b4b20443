//! Reactive Runtime
//!
//! The runtime connects reads and writes to effects. It owns the per-thread
//! [`DepStore`] and exposes the two primitives everything else is built on:
//!
//! - [`Runtime::track`]: called on every read. Subscribes the active effect
//!   to `(target, key)` and records the dep in the effect's own list.
//!
//! - [`Runtime::trigger`]: called after every write. Snapshots the effects
//!   subscribed to `(target, key)` (plus the iteration subscribers for
//!   structural writes), drops the running effect from the snapshot, and
//!   re-runs or schedules the rest.
//!
//! # Thread Model
//!
//! The store lives in thread-local storage. Effects, objects and computed
//! values are `Rc`-based and never leave the thread that created them, so
//! no locking is needed.

use std::cell::RefCell;

use super::context::ReactiveContext;
use super::key::{Key, TargetId, TriggerOp};
use super::store::DepStore;

thread_local! {
    static STORE: RefCell<DepStore> = RefCell::new(DepStore::default());
}

/// Entry points into the current thread's dependency store.
pub struct Runtime;

impl Runtime {
    /// Subscribe the active effect to `(target, key)`.
    ///
    /// Reads outside any effect are not tracked, and neither are reads by
    /// an effect that disposed itself earlier in the same run.
    pub fn track(target: TargetId, key: &Key) {
        let Some(effect) = ReactiveContext::current_effect() else {
            return;
        };
        if effect.is_disposed() {
            return;
        }

        let dep = STORE.with(|store| store.borrow_mut().dep_for(target, key));
        if dep.insert(&effect) {
            effect.core().add_dep(&dep);
            tracing::trace!(
                target_id = target.raw(),
                %key,
                effect = effect.id().raw(),
                "tracked dependency"
            );
        }
    }

    /// Re-run or schedule every effect affected by a write to `(target, key)`.
    ///
    /// The effect currently running is never re-entered by its own write.
    pub fn trigger(target: TargetId, key: &Key, op: TriggerOp) {
        let active = ReactiveContext::current_effect_id();
        let effects = STORE.with(|store| store.borrow().collect(target, key, op, active));

        if effects.is_empty() {
            return;
        }

        tracing::trace!(
            target_id = target.raw(),
            %key,
            ?op,
            effects = effects.len(),
            "triggering effects"
        );

        // Re-runs rewrite the live deps, so iterate the snapshot.
        for effect in effects {
            effect.schedule();
        }
    }

    /// Forget everything tracked against `target`.
    ///
    /// Called when a target is dropped.
    pub fn release_target(target: TargetId) {
        let entry = STORE
            .try_with(|store| store.borrow_mut().remove_target(target))
            .ok()
            .flatten();

        // Dropping deps can drop effects and whatever they captured;
        // that must happen outside the store borrow.
        drop(entry);
    }

    /// Number of effects subscribed to `(target, key)`.
    pub fn subscriber_count(target: TargetId, key: &Key) -> usize {
        STORE.with(|store| store.borrow().subscriber_count(target, key))
    }

    /// Number of targets with at least one tracked key on this thread.
    pub fn tracked_target_count() -> usize {
        STORE.with(|store| store.borrow().target_count())
    }

    /// Whether the store has an entry for `target`.
    pub fn is_tracked(target: TargetId) -> bool {
        STORE.with(|store| store.borrow().contains_target(target))
    }

    /// Check if we're inside a running effect.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
