//! Dependency Store
//!
//! Maps each tracked target to its keys and each key to the set of effects
//! subscribed to it:
//!
//! ```text
//! TargetId -> (Key -> Dep)
//! ```
//!
//! A [`Dep`] is shared: the store owns it, and every effect subscribed to it
//! keeps a weak handle in its own dependency list. That back-link is what
//! lets an effect remove itself from every dep before it re-runs.
//!
//! The store never references a target itself, only its [`TargetId`]. Targets
//! release their entry when they are dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::effect::{EffectId, EffectRef};
use super::key::{Key, TargetId, TriggerOp};

/// The set of effects subscribed to one `(target, key)`.
///
/// Insertion-ordered so that re-runs happen in subscription order.
#[derive(Default)]
pub(crate) struct Dep {
    effects: RefCell<IndexMap<EffectId, EffectRef>>,
}

impl Dep {
    /// Subscribe an effect. Returns `false` if it was already subscribed.
    pub(crate) fn insert(&self, effect: &EffectRef) -> bool {
        let mut effects = self.effects.borrow_mut();
        if effects.contains_key(&effect.id()) {
            return false;
        }
        effects.insert(effect.id(), effect.clone());
        true
    }

    /// Unsubscribe an effect.
    pub(crate) fn remove(&self, id: EffectId) {
        // The removed handle may be the last one; drop it after the borrow ends.
        let removed = self.effects.borrow_mut().shift_remove(&id);
        drop(removed);
    }

    pub(crate) fn contains(&self, id: EffectId) -> bool {
        self.effects.borrow().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.effects.borrow().len()
    }

    /// Copy every subscriber except `skip` into `out`.
    fn collect_into(&self, out: &mut IndexMap<EffectId, EffectRef>, skip: Option<EffectId>) {
        for (id, effect) in self.effects.borrow().iter() {
            if Some(*id) != skip {
                out.entry(*id).or_insert_with(|| effect.clone());
            }
        }
    }
}

/// Per-thread map from targets to their keyed deps.
#[derive(Default)]
pub(crate) struct DepStore {
    targets: HashMap<TargetId, IndexMap<Key, Rc<Dep>>>,
}

impl DepStore {
    /// Get the dep for `(target, key)`, creating both levels lazily.
    pub(crate) fn dep_for(&mut self, target: TargetId, key: &Key) -> Rc<Dep> {
        let keys = self.targets.entry(target).or_default();
        match keys.get(key) {
            Some(dep) => Rc::clone(dep),
            None => {
                let dep = Rc::new(Dep::default());
                keys.insert(key.clone(), Rc::clone(&dep));
                dep
            }
        }
    }

    /// Snapshot the effects a mutation must notify.
    ///
    /// Structural operations also collect the subscribers of
    /// [`Key::Iterate`]. `skip` is the currently running effect, which must
    /// never be re-entered by its own writes.
    pub(crate) fn collect(
        &self,
        target: TargetId,
        key: &Key,
        op: TriggerOp,
        skip: Option<EffectId>,
    ) -> Vec<EffectRef> {
        let Some(keys) = self.targets.get(&target) else {
            return Vec::new();
        };

        let mut to_run = IndexMap::new();
        if let Some(dep) = keys.get(key) {
            dep.collect_into(&mut to_run, skip);
        }
        if op.is_structural() {
            if let Some(dep) = keys.get(&Key::Iterate) {
                dep.collect_into(&mut to_run, skip);
            }
        }

        to_run.into_values().collect()
    }

    /// Detach a target's whole entry so the caller can drop it.
    pub(crate) fn remove_target(&mut self, target: TargetId) -> Option<IndexMap<Key, Rc<Dep>>> {
        self.targets.remove(&target)
    }

    pub(crate) fn subscriber_count(&self, target: TargetId, key: &Key) -> usize {
        self.targets
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map_or(0, |dep| dep.len())
    }

    pub(crate) fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn contains_target(&self, target: TargetId) -> bool {
        self.targets.contains_key(&target)
    }
}
