//! The per-thread job queue.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::config;
use crate::error::{ReactiveError, Result};
use crate::reactive::{EffectId, EffectRef, Scheduler};

/// Key under which a job is de-duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    /// A job re-running, or acting on behalf of, one effect.
    Effect(EffectId),
    /// Any other job.
    Custom(u64),
}

impl JobId {
    /// A fresh ID that collides with no other job.
    pub fn unique() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        JobId::Custom(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<EffectId> for JobId {
    fn from(id: EffectId) -> Self {
        JobId::Effect(id)
    }
}

/// A unit of deferred work.
pub type Job = Rc<dyn Fn()>;

#[derive(Default)]
struct JobQueue {
    /// Pending jobs in the order they were first queued.
    pending: IndexMap<JobId, Job>,

    /// Set by the first job of a batch, cleared when the batch is flushed.
    flush_requested: bool,

    flushing: bool,
}

thread_local! {
    static QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::default());
}

/// Queue `job` under `id` for the next flush.
///
/// Queuing only marks the batch as requested. Nothing runs until the host
/// calls [`flush_jobs`] or awaits [`next_tick`].
///
/// Returns `false` if a job with the same ID is already pending; the
/// pending job is kept.
pub fn queue_job(id: JobId, job: Job) -> bool {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.pending.contains_key(&id) {
            return false;
        }
        queue.pending.insert(id, job);

        if !queue.flush_requested {
            queue.flush_requested = true;
            tracing::debug!(?id, "flush requested");
        }
        true
    })
}

/// Run every pending job.
///
/// Jobs queued while flushing run in the same flush. If jobs keep queuing
/// more jobs for longer than `RuntimeConfig::max_flush_rounds` drain
/// rounds, the flush stops, leaves the rest pending and returns
/// [`ReactiveError::FlushLimitExceeded`].
///
/// Jobs are taken off the queue one at a time, so if a job panics, the
/// jobs behind it stay pending for the next flush.
///
/// Calling this from inside a running job does nothing. Returns the number
/// of jobs run.
pub fn flush_jobs() -> Result<usize> {
    let already_flushing = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        std::mem::replace(&mut queue.flushing, true)
    });
    if already_flushing {
        return Ok(0);
    }
    let _guard = FlushGuard;

    let max_rounds = config::config().max_flush_rounds;
    let mut rounds = 0;
    let mut ran = 0;

    loop {
        if pending_jobs() == 0 {
            return Ok(ran);
        }
        if rounds >= max_rounds {
            tracing::warn!(rounds, pending = pending_jobs(), "flush limit exceeded");
            return Err(ReactiveError::FlushLimitExceeded { rounds });
        }

        // Jobs queued during this round land behind the current batch.
        let batch = pending_jobs();
        rounds += 1;
        tracing::debug!(round = rounds, jobs = batch, "flushing jobs");

        for _ in 0..batch {
            let next = QUEUE.with(|queue| queue.borrow_mut().pending.shift_remove_index(0));
            let Some((_, job)) = next else {
                break;
            };
            job();
            ran += 1;
        }
    }
}

/// Resets the flush state even if a job panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = QUEUE.try_with(|queue| {
            let mut queue = queue.borrow_mut();
            queue.flushing = false;
            queue.flush_requested = !queue.pending.is_empty();
        });
    }
}

/// Yield to the async scheduler, then flush.
///
/// This is the batch window: all synchronous work before the `await`
/// completes before any queued job runs.
pub async fn next_tick() -> Result<usize> {
    tokio::task::yield_now().await;
    flush_jobs()
}

/// Number of jobs waiting for the next flush.
pub fn pending_jobs() -> usize {
    QUEUE.with(|queue| queue.borrow().pending.len())
}

/// Whether a flush has been requested and not yet run.
pub fn is_flush_requested() -> bool {
    QUEUE.with(|queue| queue.borrow().flush_requested)
}

/// A [`Scheduler`] that defers effect re-runs to the job queue.
///
/// Each effect runs at most once per flush, and not at all if it was
/// disposed in the meantime.
pub fn queue_scheduler() -> Scheduler {
    Rc::new(|effect: EffectRef| {
        let id = JobId::from(effect.id());
        queue_job(
            id,
            Rc::new(move || {
                if !effect.is_disposed() {
                    effect.run();
                }
            }),
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{configure, RuntimeConfig};
    use crate::reactive::{Effect, EffectOptions, ReactiveObject};
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, Job) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, Rc::new(move || count_clone.set(count_clone.get() + 1)))
    }

    #[test]
    fn duplicate_ids_run_once() {
        let (count, job) = counter();
        let id = JobId::unique();

        assert!(queue_job(id, job.clone()));
        assert!(!queue_job(id, job.clone()));
        assert!(!queue_job(id, job));
        assert!(is_flush_requested());
        assert_eq!(pending_jobs(), 1);

        assert_eq!(flush_jobs(), Ok(1));
        assert_eq!(count.get(), 1);
        assert_eq!(pending_jobs(), 0);
        assert!(!is_flush_requested());
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_flush() {
        let (count, inner) = counter();
        let outer: Job = Rc::new(move || {
            queue_job(JobId::unique(), inner.clone());
        });

        queue_job(JobId::unique(), outer);
        assert_eq!(flush_jobs(), Ok(2));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn flush_limit_stops_runaway_jobs() {
        configure(RuntimeConfig { max_flush_rounds: 4 });

        fn requeue() {
            queue_job(JobId::unique(), Rc::new(requeue));
        }
        requeue();

        assert_eq!(
            flush_jobs(),
            Err(ReactiveError::FlushLimitExceeded { rounds: 4 })
        );
        assert_eq!(pending_jobs(), 1);
        assert!(is_flush_requested());

        configure(RuntimeConfig::default());
        QUEUE.with(|queue| queue.borrow_mut().pending.clear());
    }

    #[test]
    fn panicking_job_leaves_later_jobs_pending() {
        let (count, job) = counter();
        queue_job(JobId::unique(), Rc::new(|| panic!("job failed")));
        queue_job(JobId::unique(), job);

        let result = std::panic::catch_unwind(flush_jobs);
        assert!(result.is_err());
        assert_eq!(count.get(), 0);
        assert_eq!(pending_jobs(), 1);
        assert!(is_flush_requested());

        assert_eq!(flush_jobs(), Ok(1));
        assert_eq!(count.get(), 1);
        assert!(!is_flush_requested());
    }

    #[test]
    fn queue_scheduler_batches_effect_runs() {
        let data = ReactiveObject::new();
        data.set("foo", 0);

        let reader = data.clone();
        let effect = Effect::with_options(
            move || {
                reader.get("foo");
            },
            EffectOptions {
                scheduler: Some(queue_scheduler()),
                ..EffectOptions::default()
            },
        );
        assert_eq!(effect.run_count(), 1);

        for i in 1..=5 {
            data.set("foo", i);
        }
        assert_eq!(effect.run_count(), 1);
        assert_eq!(pending_jobs(), 1);

        assert_eq!(flush_jobs(), Ok(1));
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn queued_runs_skip_disposed_effects() {
        let data = ReactiveObject::new();
        data.set("foo", 0);

        let reader = data.clone();
        let effect = Effect::with_options(
            move || {
                reader.get("foo");
            },
            EffectOptions::new().named("inline"),
        );
        let deferred = Effect::with_options(
            {
                let reader = data.clone();
                move || {
                    reader.get("foo");
                }
            },
            EffectOptions {
                scheduler: Some(queue_scheduler()),
                ..EffectOptions::default()
            },
        );

        data.set("foo", 1);
        assert_eq!(effect.run_count(), 2);
        deferred.dispose();

        assert_eq!(flush_jobs(), Ok(1));
        assert_eq!(deferred.run_count(), 1);
    }

    #[tokio::test]
    async fn next_tick_flushes_after_sync_work() {
        let (count, job) = counter();
        queue_job(JobId::unique(), job);

        // Nothing runs until the tick
        assert_eq!(count.get(), 0);

        assert_eq!(next_tick().await, Ok(1));
        assert_eq!(count.get(), 1);
    }
}
