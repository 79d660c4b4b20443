//! Reactive Context
//!
//! The reactive context tracks which effect is currently running.
//! This enables automatic dependency tracking: when a reactive object is
//! read, the runtime attributes the read to the effect on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack of running effects. Running an effect pushes
//! it onto the stack; the returned guard pops it again when dropped, which
//! restores the enclosing effect as the active one.
//!
//! A stack rather than a single slot is what makes nested effects work: when
//! an inner effect finishes, reads in the rest of the outer body must be
//! attributed to the outer effect again.

use std::cell::RefCell;

use super::effect::{EffectId, EffectRef};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<EffectRef>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the effect body panics.
pub struct ReactiveContext {
    effect_id: EffectId,
}

impl ReactiveContext {
    /// Make `effect` the active effect until the returned guard is dropped.
    pub fn enter(effect: EffectRef) -> Self {
        let effect_id = effect.id();
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(effect));
        Self { effect_id }
    }

    /// Check if there is an active effect.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The effect on top of the stack, if any.
    pub fn current_effect() -> Option<EffectRef> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// ID of the effect on top of the stack, if any.
    pub fn current_effect_id() -> Option<EffectId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(EffectRef::id))
    }

    /// Number of effects currently running on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();

        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect_id,
                effect.id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;

    #[test]
    fn context_tracks_effect() {
        let effect = Effect::new_lazy(|| {});

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_effect_id().is_none());

        {
            let _ctx = ReactiveContext::enter(effect.erased());

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_effect_id(), Some(effect.id()));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_effect().is_none());
    }

    #[test]
    fn nested_contexts() {
        let outer = Effect::new_lazy(|| {});
        let inner = Effect::new_lazy(|| {});

        {
            let _ctx1 = ReactiveContext::enter(outer.erased());
            assert_eq!(ReactiveContext::current_effect_id(), Some(outer.id()));

            {
                let _ctx2 = ReactiveContext::enter(inner.erased());
                assert_eq!(ReactiveContext::current_effect_id(), Some(inner.id()));
                assert_eq!(ReactiveContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_effect_id(), Some(outer.id()));
        }

        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn stack_unwinds_on_panic() {
        let effect = Effect::new_lazy(|| {});
        let erased = effect.erased();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(erased);
            panic!("effect body failed");
        }));

        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }
}
