//! The Job Registry: every job's runtime record behind one exclusive lock.
//!
//! Lock scope is limited to in-memory field updates. Nothing here awaits or
//! calls out while the lock is held.

use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vaultkeep_core::Schedule;

use crate::{schedule::Trigger, types::Job};

/// Handle into a job's timer loop, used to request an immediate run.
#[derive(Debug, Clone)]
pub(crate) struct TaskHandle {
    run_now: mpsc::Sender<()>,
}

impl TaskHandle {
    pub(crate) fn new(run_now: mpsc::Sender<()>) -> Self {
        Self { run_now }
    }

    /// Ask the timer loop to run as soon as it is idle. Returns false when a
    /// request is already queued or the loop has exited.
    pub(crate) fn run_now(&self) -> bool {
        self.run_now.try_send(()).is_ok()
    }
}

/// Mutable runtime record for one schedule.
pub(crate) struct JobEntry {
    pub(crate) schedule: Schedule,
    pub(crate) trigger: Trigger,
    pub(crate) running: bool,
    pub(crate) forced: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) cancel: CancellationToken,
    /// A manual request arrived while a run was in flight and has not yet
    /// been handed back to the timer loop.
    pub(crate) follow_up: bool,
    pub(crate) task: TaskHandle,
}

impl JobEntry {
    pub(crate) fn new(schedule: Schedule, trigger: Trigger, task: TaskHandle) -> Self {
        Self {
            schedule,
            trigger,
            running: false,
            forced: false,
            last_error: None,
            cancel: CancellationToken::new(),
            follow_up: false,
            task,
        }
    }

    fn id(&self) -> &str {
        &self.schedule.id
    }

    fn snapshot(&self) -> Job {
        Job {
            id: self.schedule.id.clone(),
            schedule: self.schedule.clone(),
            running: self.running,
            forced: self.forced,
            last_error: self.last_error.clone(),
            next_run: self.trigger.next_after(Utc::now()),
        }
    }
}

/// Ordered, lock-protected collection of job records, at most one per id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<Vec<JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot copy of the job with `id`.
    pub fn find_by_id(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.iter().find(|j| j.id() == id).map(JobEntry::snapshot)
    }

    /// Flag `id` as running. Returns false if the id is unknown.
    pub fn mark_running(&self, id: &str) -> bool {
        self.update(id, |job| job.running = true)
    }

    /// Flag `id` as idle and clear its forced flag. Returns false if the id is unknown.
    pub fn clear_running(&self, id: &str) -> bool {
        self.update(id, |job| {
            job.running = false;
            job.forced = false;
        })
    }

    /// Give `id` a fresh, un-fired cancellation token.
    pub fn recreate_cancellation(&self, id: &str) -> bool {
        self.update(id, |job| {
            debug!(job_id = %id, "recreating cancellation token");
            job.cancel = CancellationToken::new();
        })
    }

    /// All jobs currently running, in schedule order.
    pub fn running_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.iter()
            .filter(|j| j.running)
            .map(JobEntry::snapshot)
            .collect()
    }

    /// All jobs, in schedule order.
    pub fn jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.iter().map(JobEntry::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- engine-side helpers ------------------------------------------------

    /// Swap in a new generation of records.
    ///
    /// Records whose id survives keep their last error; if they were running,
    /// the new record inherits the running/forced flags and the live
    /// cancellation token so the in-flight run stays reachable. Tokens of
    /// running records whose id disappeared are returned for the caller to
    /// cancel.
    pub(crate) fn replace(&self, mut fresh: Vec<JobEntry>) -> Vec<(String, CancellationToken)> {
        let mut jobs = self.jobs.lock().expect("job registry poisoned");
        let previous = std::mem::take(&mut *jobs);
        let mut orphaned = Vec::new();

        for old in previous {
            match fresh.iter_mut().find(|e| e.id() == old.id()) {
                Some(entry) => {
                    entry.last_error = old.last_error;
                    if old.running {
                        debug!(job_id = %entry.schedule.id, "migrating in-flight run");
                        entry.running = true;
                        entry.forced = old.forced;
                        entry.follow_up = old.follow_up;
                        entry.cancel = old.cancel;
                    }
                }
                None if old.running => orphaned.push((old.schedule.id, old.cancel)),
                None => {}
            }
        }

        *jobs = fresh;
        orphaned
    }

    /// Task handle of `id`, used to request a manual run.
    pub(crate) fn task(&self, id: &str) -> Option<TaskHandle> {
        let jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.iter().find(|j| j.id() == id).map(|j| j.task.clone())
    }

    /// Atomically check-and-set running, recording whether this run was
    /// requested manually. Yields what the run needs, or `None` if the id is
    /// unknown or already running. A manual request refused because a run is
    /// in flight is remembered and handed back by [`finish_run`](Self::finish_run).
    pub(crate) fn begin_run(
        &self,
        id: &str,
        forced: bool,
    ) -> Option<(Schedule, CancellationToken)> {
        let mut jobs = self.jobs.lock().expect("job registry poisoned");
        let job = jobs.iter_mut().find(|j| j.id() == id)?;
        if job.running {
            if forced {
                debug!(job_id = %id, "run in flight, keeping manual request as follow-up");
                job.follow_up = true;
            }
            return None;
        }
        job.running = true;
        job.forced = forced;
        Some((job.schedule.clone(), job.cancel.clone()))
    }

    /// Close out a run in one step: idle, unforced, fresh token and the
    /// outcome recorded. Returns the task handle when a follow-up run is owed.
    pub(crate) fn finish_run(&self, id: &str, error: Option<String>) -> Option<TaskHandle> {
        let mut jobs = self.jobs.lock().expect("job registry poisoned");
        let job = jobs.iter_mut().find(|j| j.id() == id)?;
        job.running = false;
        job.forced = false;
        job.cancel = CancellationToken::new();
        job.last_error = error;
        std::mem::take(&mut job.follow_up).then(|| job.task.clone())
    }

    /// Cancellation token of `id`, only while it is running.
    pub(crate) fn running_cancellation(&self, id: &str) -> Option<CancellationToken> {
        let jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.iter()
            .find(|j| j.id() == id && j.running)
            .map(|j| j.cancel.clone())
    }

    /// Tokens of every running job.
    pub(crate) fn running_cancellations(&self) -> Vec<CancellationToken> {
        let jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.iter()
            .filter(|j| j.running)
            .map(|j| j.cancel.clone())
            .collect()
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut JobEntry)) -> bool {
        let mut jobs = self.jobs.lock().expect("job registry poisoned");
        match jobs.iter_mut().find(|j| j.id() == id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }
}
