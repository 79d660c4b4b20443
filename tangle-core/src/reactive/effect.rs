//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever the reactive state it
//! read during its last run changes.
//!
//! # How Effects Work
//!
//! Every run of an effect:
//!
//! 1. Removes the effect from every dep it subscribed to last time
//!    ("cleanup"). Reads can be conditional, so the set of dependencies may
//!    differ from run to run; without cleanup an effect would keep re-running
//!    for branches it no longer takes.
//!
//! 2. Pushes the effect onto the [`ReactiveContext`] stack, making it the
//!    active effect.
//!
//! 3. Runs the body. Every tracked read subscribes the active effect.
//!
//! 4. Pops the stack, restoring the enclosing effect, and returns the body's
//!    result.
//!
//! # Options
//!
//! - `lazy`: do not run on creation. [`Computed`](super::Computed) and
//!   [`watch`](super::watch()) use this to control the first run.
//! - `scheduler`: runs caused by a trigger are handed to the scheduler
//!   instead of running inline. Direct calls to [`Effect::run`] always run
//!   inline.
//!
//! # Disposal
//!
//! [`Effect::dispose`] unsubscribes the effect from every dep and stops all
//! future trigger-driven runs. It is idempotent.
//!
//! Dropping every handle does not stop an effect: the deps it subscribed to
//! keep it alive. An effect whose body captures an object it reads also
//! keeps that object alive, until the effect is disposed.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::store::Dep;

/// Unique identifier for an effect.
///
/// Used for the self-trigger guard and to de-duplicate queued jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook that receives trigger-driven re-runs of an effect.
pub type Scheduler = Rc<dyn Fn(EffectRef)>;

/// Configuration for [`effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,

    /// Receives re-runs caused by a trigger.
    pub scheduler: Option<Scheduler>,

    /// Name shown in logs and debug output.
    pub name: Option<Cow<'static, str>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_scheduler<S>(mut self, scheduler: S) -> Self
    where
        S: Fn(EffectRef) + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("name", &self.name)
            .finish()
    }
}

/// State shared by every effect regardless of its result type.
pub(crate) struct EffectCore {
    id: EffectId,
    name: Option<Cow<'static, str>>,
    scheduler: Option<Scheduler>,

    /// Deps this effect is subscribed to. Weak: the store owns deps.
    deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,

    /// Cleared by `dispose`.
    active: Cell<bool>,

    runs: Cell<usize>,
}

impl EffectCore {
    fn new(options: EffectOptions) -> Self {
        Self {
            id: EffectId::new(),
            name: options.name,
            scheduler: options.scheduler,
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            runs: Cell::new(0),
        }
    }

    /// Record that this effect subscribed to `dep`.
    pub(crate) fn add_dep(&self, dep: &Rc<Dep>) {
        self.deps.borrow_mut().push(Rc::downgrade(dep));
    }

    /// Unsubscribe from every dep and forget them.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps.iter().filter_map(Weak::upgrade) {
            dep.remove(self.id);
        }
    }

    fn dependency_count(&self) -> usize {
        self.deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    fn dispose(&self) {
        if self.active.replace(false) {
            tracing::debug!(effect = self.id.raw(), effect_name = ?self.name, "effect disposed");
            self.cleanup();
        }
    }
}

/// Type-erased view of an effect, stored in deps and on the context stack.
pub(crate) trait AnyEffect {
    fn core(&self) -> &EffectCore;

    fn run_erased(self: Rc<Self>);
}

struct EffectInner<T> {
    core: EffectCore,
    func: Box<dyn Fn() -> T>,
}

impl<T: 'static> AnyEffect for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn run_erased(self: Rc<Self>) {
        Effect { inner: self }.run();
    }
}

/// A reactive computation producing `T` on every run.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tangle_core::reactive::{Effect, ReactiveObject};
///
/// let data = ReactiveObject::new();
/// data.set("foo", 1);
///
/// let seen = Rc::new(Cell::new(0));
/// let sink = seen.clone();
/// let reader = data.clone();
/// let _effect = Effect::new(move || {
///     sink.set(reader.get("foo").and_then(|v| v.as_int()).unwrap_or(0));
/// });
/// assert_eq!(seen.get(), 1);
///
/// data.set("foo", 2);
/// assert_eq!(seen.get(), 2);
/// ```
pub struct Effect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it once to establish its dependencies.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(func, EffectOptions::new())
    }

    /// Create an effect without running it.
    pub fn new_lazy<F>(func: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(func, EffectOptions::new().lazy())
    }

    /// Create an effect with explicit options.
    pub fn with_options<F>(func: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let lazy = options.lazy;
        let effect = Self {
            inner: Rc::new(EffectInner {
                core: EffectCore::new(options),
                func: Box::new(func),
            }),
        };

        if !lazy {
            effect.run();
        }

        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.core.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.core.name.as_deref()
    }

    /// Run the body inline, re-collecting dependencies.
    ///
    /// A disposed effect still evaluates its body but tracks nothing.
    pub fn run(&self) -> T {
        let core = &self.inner.core;
        if !core.active.get() {
            return (self.inner.func)();
        }

        core.cleanup();

        tracing::trace!(effect = core.id.raw(), effect_name = ?core.name, "running effect");
        let _ctx = ReactiveContext::enter(self.erased());
        let value = (self.inner.func)();

        core.runs.set(core.runs.get() + 1);
        value
    }

    /// Stop the effect and unsubscribe it from every dep.
    pub fn dispose(&self) {
        self.inner.core.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        !self.inner.core.active.get()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.core.runs.get()
    }

    /// Number of deps the effect is currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dependency_count()
    }

    /// A type-erased handle to this effect.
    pub fn erased(&self) -> EffectRef {
        EffectRef(self.inner.clone())
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Non-owning handle to an [`Effect`].
pub struct WeakEffect<T: 'static> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T: 'static> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// Type-erased handle to an effect of any result type.
///
/// This is what schedulers receive.
#[derive(Clone)]
pub struct EffectRef(Rc<dyn AnyEffect>);

impl EffectRef {
    pub fn id(&self) -> EffectId {
        self.0.core().id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.core().name.as_deref()
    }

    /// Run the effect inline, discarding its result.
    pub fn run(&self) {
        Rc::clone(&self.0).run_erased();
    }

    pub fn dispose(&self) {
        self.0.core().dispose();
    }

    pub fn is_disposed(&self) -> bool {
        !self.0.core().active.get()
    }

    pub fn run_count(&self) -> usize {
        self.0.core().runs.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.0.core().dependency_count()
    }

    pub(crate) fn core(&self) -> &EffectCore {
        self.0.core()
    }

    /// Re-run in response to a trigger: through the scheduler if the
    /// effect has one, inline otherwise.
    pub(crate) fn schedule(&self) {
        if self.is_disposed() {
            return;
        }
        match self.0.core().scheduler.clone() {
            Some(scheduler) => scheduler(self.clone()),
            None => self.run(),
        }
    }
}

impl PartialEq for EffectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EffectRef {}

impl fmt::Debug for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRef")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect with `options`, running it immediately unless lazy.
pub fn effect<T, F>(func: F, options: EffectOptions) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Effect::with_options(func, options)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
