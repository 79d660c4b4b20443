//! Watchers
//!
//! [`watch`] observes a source and calls back with the old and new value
//! whenever the source changes.
//!
//! A source is either a getter closure, whose result is watched, or a
//! [`ReactiveObject`], which is watched deeply: every key of the object and
//! of every object reachable from it is read, so any write anywhere in the
//! tree (including adding or deleting keys) fires the callback.
//!
//! # Flush Timing
//!
//! - [`FlushMode::Sync`] (default) and [`FlushMode::Pre`]: the callback runs
//!   inside the write that changed the source.
//! - [`FlushMode::Post`]: the callback is queued on the shared job queue and
//!   runs once per flush, with the value from before the first write of the
//!   batch as `old` and the value after the last write as `new`.
//!
//! # Invalidation
//!
//! The callback receives an [`OnInvalidate`] registrar. A function
//! registered there runs right before the next callback, which lets a
//! callback mark its in-flight asynchronous work as stale.

use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;
use crate::scheduler::{queue_job, JobId};

use super::effect::{Effect, EffectOptions, EffectRef, WeakEffect};
use super::key::TargetId;
use super::object::{ReactiveObject, Value};

/// When a watch callback runs relative to the write that triggered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Inside the triggering write.
    #[default]
    Sync,
    /// Treated like `Sync`; there is no render phase to run before.
    Pre,
    /// On the next job queue flush, de-duplicated.
    Post,
}

impl FromStr for FlushMode {
    type Err = ReactiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(FlushMode::Sync),
            "pre" => Ok(FlushMode::Pre),
            "post" => Ok(FlushMode::Post),
            other => Err(ReactiveError::InvalidFlushMode(other.to_string())),
        }
    }
}

impl fmt::Display for FlushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlushMode::Sync => "sync",
            FlushMode::Pre => "pre",
            FlushMode::Post => "post",
        })
    }
}

/// Configuration for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Run the callback once at registration, with no old value.
    pub immediate: bool,

    pub flush: FlushMode,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }
}

/// Something [`watch`] can observe.
pub trait WatchSource {
    type Output: Clone + 'static;

    /// The getter the watch effect runs.
    fn into_getter(self) -> Box<dyn Fn() -> Self::Output>;
}

impl<F, T> WatchSource for F
where
    F: Fn() -> T + 'static,
    T: Clone + 'static,
{
    type Output = T;

    fn into_getter(self) -> Box<dyn Fn() -> T> {
        Box::new(self)
    }
}

/// Deep watch: the object itself is the value, so `old` and `new` are the
/// same handle.
impl WatchSource for ReactiveObject {
    type Output = ReactiveObject;

    fn into_getter(self) -> Box<dyn Fn() -> ReactiveObject> {
        Box::new(move || {
            traverse(&Value::Object(self.clone()));
            self.clone()
        })
    }
}

/// Read every key of `value` and of every object reachable from it.
///
/// Inside an effect this subscribes the effect to the whole tree. Cycles
/// are visited once.
pub fn traverse(value: &Value) {
    traverse_into(value, &mut HashSet::new());
}

fn traverse_into(value: &Value, seen: &mut HashSet<TargetId>) {
    let Value::Object(object) = value else {
        return;
    };
    if !seen.insert(object.id()) {
        return;
    }
    for key in object.keys() {
        if let Some(child) = object.get(&key) {
            traverse_into(&child, seen);
        }
    }
}

type InvalidateFn = Box<dyn FnOnce()>;

/// Registrar passed to watch callbacks.
#[derive(Clone, Default)]
pub struct OnInvalidate {
    slot: Rc<RefCell<Option<InvalidateFn>>>,
}

impl OnInvalidate {
    /// Run `f` before the next callback of this watch.
    ///
    /// Registering again replaces the previous function.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        let previous = self.slot.borrow_mut().replace(Box::new(f));
        drop(previous);
    }

    fn fire(&self) {
        let registered = self.slot.borrow_mut().take();
        if let Some(f) = registered {
            f();
        }
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("registered", &self.slot.borrow().is_some())
            .finish()
    }
}

type Callback<T> = Box<dyn Fn(Option<T>, T, &OnInvalidate)>;

struct WatchState<T: 'static> {
    effect: OnceCell<WeakEffect<T>>,
    old_value: RefCell<Option<T>>,
    on_invalidate: OnInvalidate,
    callback: Callback<T>,
}

impl<T: Clone + 'static> WatchState<T> {
    fn job(&self) {
        let Some(effect) = self.effect.get().and_then(WeakEffect::upgrade) else {
            return;
        };
        if effect.is_disposed() {
            return;
        }

        let new_value = effect.run();
        self.on_invalidate.fire();

        let old_value = self.old_value.borrow().clone();
        (self.callback)(old_value, new_value.clone(), &self.on_invalidate);
        *self.old_value.borrow_mut() = Some(new_value);
    }
}

/// Handle to a registered watch.
///
/// Dropping the handle does not stop the watch; call [`WatchHandle::stop`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    effect: EffectRef,
}

impl WatchHandle {
    /// Stop watching. Queued callbacks for this watch are skipped.
    pub fn stop(&self) {
        self.effect.dispose();
    }

    pub fn is_stopped(&self) -> bool {
        self.effect.is_disposed()
    }

    /// The effect driving this watch.
    pub fn effect(&self) -> &EffectRef {
        &self.effect
    }
}

/// Call `callback(old, new, on_invalidate)` whenever `source` changes.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use tangle_core::reactive::{watch, ReactiveObject, WatchOptions};
///
/// let data = ReactiveObject::new();
/// data.set("foo", 1);
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let sink = log.clone();
/// let reader = data.clone();
/// watch(
///     move || reader.get("foo").and_then(|v| v.as_int()),
///     move |old, new, _| sink.borrow_mut().push((old.flatten(), new)),
///     WatchOptions::new(),
/// );
///
/// data.set("foo", 2);
/// assert_eq!(*log.borrow(), vec![(Some(1), Some(2))]);
/// ```
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    C: Fn(Option<S::Output>, S::Output, &OnInvalidate) + 'static,
{
    let state = Rc::new(WatchState {
        effect: OnceCell::new(),
        old_value: RefCell::new(None),
        on_invalidate: OnInvalidate::default(),
        callback: Box::new(callback),
    });

    let flush = options.flush;
    let scheduled = Rc::clone(&state);
    let effect_options = EffectOptions::new()
        .lazy()
        .named("watch")
        .with_scheduler(move |effect: EffectRef| match flush {
            FlushMode::Post => {
                let state = Rc::clone(&scheduled);
                queue_job(JobId::from(effect.id()), Rc::new(move || state.job()));
            }
            FlushMode::Sync | FlushMode::Pre => scheduled.job(),
        });

    let getter = source.into_getter();
    let effect = Effect::with_options(move || getter(), effect_options);
    // The cell was created empty above and is only set here.
    state.effect.set(effect.downgrade()).ok();

    tracing::debug!(effect = effect.id().raw(), %flush, immediate = options.immediate, "watch registered");

    if options.immediate {
        state.job();
    } else {
        let initial = effect.run();
        *state.old_value.borrow_mut() = Some(initial);
    }

    WatchHandle {
        effect: effect.erased(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::flush_jobs;
    use std::cell::Cell;

    fn int_getter(object: &ReactiveObject, key: &'static str) -> impl Fn() -> i64 + 'static {
        let object = object.clone();
        move || object.get(key).and_then(|v| v.as_int()).unwrap_or(0)
    }

    type Log = Rc<RefCell<Vec<(Option<i64>, i64)>>>;

    fn recorder() -> (Log, impl Fn(Option<i64>, i64, &OnInvalidate) + 'static) {
        let log: Log = Rc::default();
        let sink = log.clone();
        (log, move |old: Option<i64>, new: i64, _: &OnInvalidate| sink.borrow_mut().push((old, new)))
    }

    #[test]
    fn watch_fires_with_old_and_new() {
        let data = ReactiveObject::new();
        data.set("foo", 1);

        let (log, callback) = recorder();
        let _handle = watch(int_getter(&data, "foo"), callback, WatchOptions::new());

        // Registration only primes the old value
        assert!(log.borrow().is_empty());

        data.set("foo", 2);
        data.set("foo", 3);
        assert_eq!(*log.borrow(), vec![(Some(1), 2), (Some(2), 3)]);
    }

    #[test]
    fn immediate_runs_once_without_old_value() {
        let data = ReactiveObject::new();
        data.set("foo", 1);

        let (log, callback) = recorder();
        watch(int_getter(&data, "foo"), callback, WatchOptions::new().immediate());
        assert_eq!(*log.borrow(), vec![(None, 1)]);

        data.set("foo", 2);
        assert_eq!(*log.borrow(), vec![(None, 1), (Some(1), 2)]);
    }

    #[test]
    fn post_flush_coalesces_writes() {
        let data = ReactiveObject::new();
        data.set("foo", 1);

        let (log, callback) = recorder();
        watch(
            int_getter(&data, "foo"),
            callback,
            WatchOptions::new().flush(FlushMode::Post),
        );

        for _ in 0..5 {
            data.update("foo", |v| Value::from(v.and_then(|v| v.as_int()).unwrap_or(0) + 1));
        }
        assert!(log.borrow().is_empty());

        assert_eq!(flush_jobs(), Ok(1));
        assert_eq!(*log.borrow(), vec![(Some(1), 6)]);
    }

    #[test]
    fn invalidation_runs_before_next_callback() {
        let data = ReactiveObject::new();
        data.set("foo", 1);

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        watch(
            int_getter(&data, "foo"),
            move |_, new, on_invalidate| {
                sink.borrow_mut().push(format!("callback {new}"));
                let sink = sink.clone();
                on_invalidate.register(move || sink.borrow_mut().push(format!("expired {new}")));
            },
            WatchOptions::new(),
        );

        data.set("foo", 2);
        data.set("foo", 3);
        assert_eq!(
            *events.borrow(),
            vec!["callback 2", "expired 2", "callback 3"]
        );
    }

    #[test]
    fn deep_watch_sees_nested_and_structural_writes() {
        let data = ReactiveObject::from_json(serde_json::json!({
            "user": { "name": "ada" },
            "count": 1
        }))
        .unwrap();

        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        watch(
            data.clone(),
            move |old, new, _| {
                assert!(old.is_some_and(|old| old.ptr_eq(&new)));
                fired_clone.set(fired_clone.get() + 1);
            },
            WatchOptions::new(),
        );

        let user = data.get("user").unwrap();
        user.as_object().unwrap().set("name", "grace");
        assert_eq!(fired.get(), 1);

        data.set("extra", true);
        assert_eq!(fired.get(), 2);

        data.delete("count");
        assert_eq!(fired.get(), 3);
    }

    #[test]
    fn traverse_handles_cycles() {
        let a = ReactiveObject::new();
        let b = ReactiveObject::new();
        a.set("b", b.clone());
        b.set("a", a.clone());

        traverse(&Value::Object(a.clone()));

        // Break the cycle so both objects can drop
        b.delete("a");
    }

    #[test]
    fn stopped_watch_stays_silent() {
        let data = ReactiveObject::new();
        data.set("foo", 1);

        let (log, callback) = recorder();
        let handle = watch(
            int_getter(&data, "foo"),
            callback,
            WatchOptions::new().flush(FlushMode::Post),
        );

        data.set("foo", 2);
        handle.stop();
        assert!(handle.is_stopped());

        // The queued job runs but sees the watch stopped
        assert_eq!(flush_jobs(), Ok(1));
        data.set("foo", 3);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn flush_mode_parses() {
        assert_eq!("post".parse::<FlushMode>(), Ok(FlushMode::Post));
        assert_eq!(FlushMode::Pre.to_string(), "pre");
        assert!(matches!(
            "later".parse::<FlushMode>(),
            Err(ReactiveError::InvalidFlushMode(_))
        ));

        let options: WatchOptions = serde_json::from_str(r#"{ "flush": "post" }"#).unwrap();
        assert_eq!(options, WatchOptions { immediate: false, flush: FlushMode::Post });
    }
}
