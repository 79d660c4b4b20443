//! Job Scheduling
//!
//! Effects re-run synchronously by default: the write that triggers them
//! returns only after they finish. This module provides the second tier,
//! a per-thread job queue that collects work and runs it later in one batch.
//!
//! # Batching
//!
//! Jobs are keyed by [`JobId`]. Queuing an ID that is already pending is a
//! no-op, so any number of triggers within one batch window collapse into a
//! single run per job. The first queued job requests a flush; the host then
//! runs the batch with [`flush_jobs`], or awaits [`next_tick`] which yields
//! to the tokio scheduler before flushing.
//!
//! Every synchronous write made before the flush is visible to the jobs it
//! runs.

mod queue;

pub use queue::{
    flush_jobs, is_flush_requested, next_tick, pending_jobs, queue_job, queue_scheduler, Job,
    JobId,
};
