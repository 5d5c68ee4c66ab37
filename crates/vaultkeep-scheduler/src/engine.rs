use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vaultkeep_core::Schedule;
use vaultkeep_protocol::status::StatusEvent;

use crate::{
    emitter::StatusEmitter,
    error::SchedulerError,
    executor::{Executor, LastRunSink},
    registry::{JobEntry, JobRegistry, TaskHandle},
    schedule::Trigger,
    types::Job,
};

/// Everything a timer loop needs to carry out a run.
struct RunContext {
    registry: Arc<JobRegistry>,
    executor: Arc<dyn Executor>,
    emitter: StatusEmitter,
    last_runs: Option<Arc<dyn LastRunSink>>,
    /// Fixed-size runner: one permit per concurrent run.
    permits: Semaphore,
}

/// Core scheduler: owns the job registry and one timer loop per schedule.
///
/// Cheap to clone; clones share the same registry and runner.
#[derive(Clone)]
pub struct SchedulerEngine {
    ctx: Arc<RunContext>,
    /// Current scheduling generation. Held for the whole of a rebuild so two
    /// rebuilds never interleave.
    generation: Arc<Mutex<CancellationToken>>,
}

impl SchedulerEngine {
    /// Create an engine with no jobs.
    ///
    /// `max_concurrent_runs` bounds how many runs execute at once; further due
    /// jobs wait for a free slot before they count as running.
    pub fn new(
        executor: Arc<dyn Executor>,
        emitter: StatusEmitter,
        last_runs: Option<Arc<dyn LastRunSink>>,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(RunContext {
                registry: Arc::new(JobRegistry::new()),
                executor,
                emitter,
                last_runs,
                permits: Semaphore::new(max_concurrent_runs.max(1)),
            }),
            generation: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.ctx.registry
    }

    pub fn find_by_id(&self, id: &str) -> Option<Job> {
        self.ctx.registry.find_by_id(id)
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.ctx.registry.jobs()
    }

    pub fn running_jobs(&self) -> Vec<Job> {
        self.ctx.registry.running_jobs()
    }

    /// Discard every job and timer and rebuild them from `schedules`.
    ///
    /// A schedule that fails to build is logged and skipped. In-flight runs
    /// whose id survives are carried over; in-flight runs whose id is gone are
    /// cancelled. Returns the number of jobs installed.
    pub fn rebuild_schedule(&self, schedules: &[Schedule]) -> usize {
        let mut current = self.generation.lock().expect("generation poisoned");
        info!(count = schedules.len(), "rescheduling backups");

        // Old timer loops stop at their next wake-up; their in-flight runs finish.
        current.cancel();
        let generation = CancellationToken::new();
        *current = generation.clone();

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(schedules.len());
        let mut timers = Vec::with_capacity(schedules.len());

        for schedule in schedules {
            if !seen.insert(schedule.id.as_str()) {
                let e = SchedulerError::DuplicateSchedule {
                    id: schedule.id.clone(),
                };
                warn!(job_id = %schedule.id, "skipping schedule: {e}");
                continue;
            }

            let trigger = match Trigger::parse(schedule) {
                Ok(t) => t,
                Err(e) => {
                    error!(job_id = %schedule.id, "error creating job: {e}");
                    continue;
                }
            };

            let (run_now_tx, run_now_rx) = mpsc::channel(1);
            entries.push(JobEntry::new(
                schedule.clone(),
                trigger.clone(),
                TaskHandle::new(run_now_tx),
            ));
            timers.push(TimerLoop {
                id: schedule.id.clone(),
                trigger,
                run_now: run_now_rx,
            });
        }

        for (id, cancel) in self.ctx.registry.replace(entries) {
            warn!(job_id = %id, "schedule removed while running, cancelling run");
            cancel.cancel();
        }

        let installed = timers.len();
        for timer in timers {
            tokio::spawn(timer.run(Arc::clone(&self.ctx), generation.child_token()));
        }
        info!(installed, "schedule rebuilt");
        installed
    }

    /// Run the job now instead of waiting for its timer. Unknown ids are a no-op.
    ///
    /// A request made while the job is already running is queued as a single
    /// follow-up run.
    pub fn run_job_by_id(&self, id: &str) {
        let Some(task) = self.ctx.registry.task(id) else {
            debug!(job_id = %id, "run requested for unknown job");
            return;
        };
        info!(job_id = %id, "running job manually");
        if !task.run_now() {
            debug!(job_id = %id, "run already queued");
        }
    }

    /// Ask a running job to stop and report it as not running.
    ///
    /// Advisory: the executor may or may not honour the signal, but the engine
    /// stops waiting on it. No-op for idle or unknown jobs.
    pub fn stop_job_by_id(&self, id: &str) {
        let Some(cancel) = self.ctx.registry.running_cancellation(id) else {
            debug!(job_id = %id, "stop requested for idle or unknown job");
            return;
        };
        info!(job_id = %id, "stopping job");
        self.ctx.emitter.emit(StatusEvent::stop_requested(id));
        cancel.cancel();
    }

    /// Stop every timer loop, refuse new runs and cancel in-flight ones.
    pub fn shutdown(&self) {
        let current = self.generation.lock().expect("generation poisoned");
        current.cancel();
        self.ctx.permits.close();
        for cancel in self.ctx.registry.running_cancellations() {
            cancel.cancel();
        }
        info!("scheduler engine shut down");
    }
}

/// One schedule's timer: sleeps until the next cron match or a manual request,
/// then runs the job inline so a job never overlaps itself.
struct TimerLoop {
    id: String,
    trigger: Trigger,
    run_now: mpsc::Receiver<()>,
}

impl TimerLoop {
    async fn run(mut self, ctx: Arc<RunContext>, generation: CancellationToken) {
        debug!(job_id = %self.id, manual = self.trigger.is_manual(), "timer loop started");
        loop {
            let next = self.trigger.next_after(Utc::now());
            let due = async {
                match next {
                    Some(at) => {
                        let wait = (at - Utc::now()).to_std().unwrap_or_default();
                        tokio::time::sleep(wait).await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            let forced = tokio::select! {
                biased;
                _ = generation.cancelled() => break,
                request = self.run_now.recv() => match request {
                    Some(()) => true,
                    None => break,
                },
                _ = due => {
                    debug!(job_id = %self.id, "timer fired");
                    false
                }
            };

            ctx.run_job(&self.id, forced).await;
        }
        debug!(job_id = %self.id, "timer loop stopped");
    }
}

impl RunContext {
    async fn run_job(&self, id: &str, forced: bool) {
        let Ok(_permit) = self.permits.acquire().await else {
            debug!(job_id = %id, "runner closed, skipping run");
            return;
        };

        // before-run
        let Some((schedule, cancel)) = self.registry.begin_run(id, forced) else {
            debug!(job_id = %id, "job unknown or already running, skipping run");
            return;
        };
        self.emitter.emit(StatusEvent::started(id));
        info!(job_id = %id, forced, "job started");

        let outcome = tokio::select! {
            res = self.executor.execute(&schedule, cancel.clone()) => res,
            _ = cancel.cancelled() => Err(SchedulerError::Cancelled),
        };

        // after-run
        let error = match outcome {
            Ok(_) => {
                self.emitter.emit(StatusEvent::finished_ok(id));
                info!(job_id = %id, res = "success", "job finished");
                None
            }
            Err(e) => {
                let text = e.to_string();
                self.emitter.emit(StatusEvent::finished_error(id, text.clone()));
                warn!(job_id = %id, res = "error", "job finished: {text}");
                Some(text)
            }
        };

        let follow_up = self.registry.finish_run(id, error.clone());
        if let Some(sink) = &self.last_runs {
            let sink = Arc::clone(sink);
            let job_id = id.to_string();
            let recorded = tokio::task::spawn_blocking(move || {
                sink.record(&job_id, error.as_deref().unwrap_or_default());
            })
            .await;
            if let Err(e) = recorded {
                error!(job_id = %id, "recording last run failed: {e}");
            }
        }
        if let Some(task) = follow_up {
            debug!(job_id = %id, "handing follow-up run to the timer loop");
            task.run_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{status_channel, StatusReceivers};
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vaultkeep_protocol::status::ChanMsg;

    /// Executor whose per-id outcome is scripted; optionally held at a gate.
    #[derive(Default)]
    struct Scripted {
        failures: std::sync::Mutex<HashMap<String, String>>,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for Scripted {
        async fn execute(&self, schedule: &Schedule, _cancel: CancellationToken) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            let failure = self.failures.lock().unwrap().get(&schedule.id).cloned();
            match failure {
                Some(msg) => Err(SchedulerError::Execution(msg)),
                None => Ok("done".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink(std::sync::Mutex<Vec<(String, String)>>);

    impl LastRunSink for RecordingSink {
        fn record(&self, schedule_id: &str, error: &str) {
            self.0
                .lock()
                .unwrap()
                .push((schedule_id.to_string(), error.to_string()));
        }
    }

    fn schedule(id: &str, cron: &str) -> Schedule {
        Schedule {
            id: id.to_string(),
            cron: cron.to_string(),
            backup_id: "b1".to_string(),
            to_repository_id: "r1".to_string(),
            from_repository_id: String::new(),
        }
    }

    fn engine_with(executor: Scripted, max: usize) -> (SchedulerEngine, StatusReceivers) {
        let (emitter, receivers) = status_channel();
        (
            SchedulerEngine::new(Arc::new(executor), emitter, None, max),
            receivers,
        )
    }

    fn gated() -> (Scripted, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Scripted {
                gate: Some(Arc::clone(&gate)),
                ..Default::default()
            },
            gate,
        )
    }

    async fn next(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ChanMsg>) -> ChanMsg {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for status message")
            .expect("status queue closed")
    }

    async fn wait_idle(engine: &SchedulerEngine, id: &str) {
        for _ in 0..200 {
            if !engine.find_by_id(id).unwrap().running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never returned to idle");
    }

    #[tokio::test]
    async fn rebuild_creates_one_job_per_schedule() {
        let (engine, _rx) = engine_with(Scripted::default(), 4);

        let installed = engine.rebuild_schedule(&[
            schedule("s1", "*/5 * * * *"),
            schedule("s2", ""),
            schedule("s1", "0 * * * *"),
            schedule("bad", "not a cron"),
        ]);

        assert_eq!(installed, 2);
        assert_eq!(engine.jobs().len(), 2);
        let s1 = engine.find_by_id("s1").unwrap();
        assert!(!s1.running);
        assert_eq!(s1.schedule.cron, "*/5 * * * *");
        assert!(s1.next_run.is_some());
        assert!(engine.find_by_id("s2").unwrap().next_run.is_none());
        assert!(engine.find_by_id("bad").is_none());
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_generation() {
        let (engine, _rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("old", "")]);
        engine.rebuild_schedule(&[schedule("new", "")]);

        assert!(engine.find_by_id("old").is_none());
        assert!(engine.find_by_id("new").is_some());
        assert_eq!(engine.registry().len(), 1);
    }

    #[tokio::test]
    async fn manual_run_reports_start_and_finish() {
        let (engine, mut rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("s1", "*/5 * * * *")]);
        assert!(!engine.find_by_id("s1").unwrap().running);

        engine.run_job_by_id("s1");

        let started = next(&mut rx.output).await;
        assert_eq!(started.id, "s1");
        assert_eq!(started.msg, r#"{"running":true}"#);
        let finished = next(&mut rx.output).await;
        assert_eq!(finished.msg, r#"{"running":false}"#);

        wait_idle(&engine, "s1").await;
        let job = engine.find_by_id("s1").unwrap();
        assert!(!job.forced);
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_run_reports_on_error_queue() {
        let executor = Scripted {
            failures: std::sync::Mutex::new(HashMap::from([(
                "s2".to_string(),
                "disk full".to_string(),
            )])),
            ..Default::default()
        };
        let (emitter, mut rx) = status_channel();
        let sink = Arc::new(RecordingSink::default());
        let engine = SchedulerEngine::new(
            Arc::new(executor),
            emitter,
            Some(sink.clone() as Arc<dyn LastRunSink>),
            4,
        );
        engine.rebuild_schedule(&[schedule("s2", "")]);

        engine.run_job_by_id("s2");

        let err = next(&mut rx.error).await;
        assert_eq!(err.id, "s2");
        assert_eq!(err.msg, "disk full");
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);

        wait_idle(&engine, "s2").await;
        let job = engine.find_by_id("s2").unwrap();
        assert_eq!(job.last_error.as_deref(), Some("disk full"));
        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            &[("s2".to_string(), "disk full".to_string())]
        );
    }

    /// Sink that blocks until the test answers, or gives up after two seconds.
    struct Handshake {
        answer: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        answered: std::sync::Mutex<Option<bool>>,
    }

    impl LastRunSink for Handshake {
        fn record(&self, _schedule_id: &str, _error: &str) {
            let ok = self
                .answer
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(2))
                .is_ok();
            *self.answered.lock().unwrap() = Some(ok);
        }
    }

    #[tokio::test]
    async fn last_run_sink_runs_off_the_runtime_thread() {
        let (answer_tx, answer_rx) = std::sync::mpsc::channel();
        let sink = Arc::new(Handshake {
            answer: std::sync::Mutex::new(answer_rx),
            answered: std::sync::Mutex::new(None),
        });
        let (emitter, mut rx) = status_channel();
        let engine = SchedulerEngine::new(
            Arc::new(Scripted::default()),
            emitter,
            Some(sink.clone() as Arc<dyn LastRunSink>),
            4,
        );
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.run_job_by_id("s1");
        next(&mut rx.output).await;
        next(&mut rx.output).await;
        // Only reachable while the sink is blocked if it is not on this thread.
        answer_tx.send(()).unwrap();

        for _ in 0..300 {
            if let Some(ok) = *sink.answered.lock().unwrap() {
                assert!(ok, "sink blocked the scheduler's runtime thread");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sink never recorded the run");
    }

    #[tokio::test]
    async fn success_clears_previous_error() {
        let executor = Arc::new(Scripted {
            failures: std::sync::Mutex::new(HashMap::from([(
                "s1".to_string(),
                "boom".to_string(),
            )])),
            ..Default::default()
        });
        let (emitter, mut rx) = status_channel();
        let engine = SchedulerEngine::new(executor.clone(), emitter, None, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.run_job_by_id("s1");
        assert_eq!(next(&mut rx.error).await.msg, "boom");
        wait_idle(&engine, "s1").await;
        assert_eq!(engine.find_by_id("s1").unwrap().last_error.as_deref(), Some("boom"));

        executor.failures.lock().unwrap().clear();
        engine.run_job_by_id("s1");
        for _ in 0..4 {
            next(&mut rx.output).await;
        }
        wait_idle(&engine, "s1").await;
        assert!(engine.find_by_id("s1").unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn unknown_ids_are_noops() {
        let (engine, mut rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.run_job_by_id("nope");
        engine.stop_job_by_id("nope");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.output.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_on_idle_job_is_noop() {
        let (engine, mut rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.stop_job_by_id("s1");
        engine.stop_job_by_id("s1");

        assert!(rx.output.try_recv().is_err());
        assert!(!engine.find_by_id("s1").unwrap().running);
    }

    #[tokio::test]
    async fn stop_cancels_running_job() {
        let (executor, _gate) = gated();
        let (engine, mut rx) = engine_with(executor, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.run_job_by_id("s1");
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        assert!(engine.find_by_id("s1").unwrap().running);

        engine.stop_job_by_id("s1");

        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        assert_eq!(next(&mut rx.error).await.msg, "cancelled");
        wait_idle(&engine, "s1").await;
        let job = engine.find_by_id("s1").unwrap();
        assert_eq!(job.last_error.as_deref(), Some("cancelled"));

        // Next run gets a fresh token and completes normally.
        engine.run_job_by_id("s1");
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
    }

    #[tokio::test]
    async fn runner_bounds_concurrency() {
        let (executor, gate) = gated();
        let (engine, mut rx) = engine_with(executor, 1);
        engine.rebuild_schedule(&[schedule("a", ""), schedule("b", "")]);

        engine.run_job_by_id("a");
        engine.run_job_by_id("b");

        let first = next(&mut rx.output).await;
        assert_eq!(first.msg, r#"{"running":true}"#);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.output.try_recv().is_err());
        assert_eq!(engine.running_jobs().len(), 1);

        gate.add_permits(1);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        let second = next(&mut rx.output).await;
        assert_eq!(second.msg, r#"{"running":true}"#);
        assert_ne!(second.id, first.id);
        gate.add_permits(1);
    }

    #[tokio::test]
    async fn requests_during_a_run_coalesce() {
        let (executor, gate) = gated();
        let executor = Arc::new(executor);
        let (emitter, mut rx) = status_channel();
        let engine = SchedulerEngine::new(executor.clone(), emitter, None, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.run_job_by_id("s1");
        next(&mut rx.output).await;
        engine.run_job_by_id("s1");
        engine.run_job_by_id("s1");
        engine.run_job_by_id("s1");

        gate.add_permits(10);
        // first run finishes, exactly one follow-up runs
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.output.try_recv().is_err());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn follow_up_run_is_marked_forced() {
        let (executor, gate) = gated();
        let (engine, mut rx) = engine_with(executor, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        engine.run_job_by_id("s1");
        next(&mut rx.output).await;
        engine.run_job_by_id("s1");

        gate.add_permits(1);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        let job = engine.find_by_id("s1").unwrap();
        assert!(job.running);
        assert!(job.forced);

        gate.add_permits(1);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        wait_idle(&engine, "s1").await;
        assert!(!engine.find_by_id("s1").unwrap().forced);
    }

    #[tokio::test]
    async fn manual_request_does_not_relabel_timer_run() {
        let (executor, gate) = gated();
        let (engine, mut rx) = engine_with(executor, 4);
        engine.rebuild_schedule(&[schedule("tick", "* * * * * *")]);

        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        assert!(!engine.find_by_id("tick").unwrap().forced);

        engine.run_job_by_id("tick");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = engine.find_by_id("tick").unwrap();
        assert!(job.running);
        assert!(!job.forced);

        gate.add_permits(1);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        assert!(engine.find_by_id("tick").unwrap().forced);
        engine.shutdown();
    }

    #[tokio::test]
    async fn cron_timer_fires() {
        let (engine, mut rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("tick", "* * * * * *")]);

        let started = next(&mut rx.output).await;
        assert_eq!(started.id, "tick");
        assert_eq!(started.msg, r#"{"running":true}"#);
        assert!(!engine.find_by_id("tick").unwrap().forced);
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_only_timer_stays_inert() {
        let (engine, mut rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;

        assert!(rx.output.try_recv().is_err());
        assert!(!engine.find_by_id("s1").unwrap().running);
    }

    #[tokio::test]
    async fn rebuild_migrates_in_flight_run() {
        let (executor, gate) = gated();
        let (engine, mut rx) = engine_with(executor, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        next(&mut rx.output).await;

        engine.rebuild_schedule(&[schedule("s1", ""), schedule("s2", "")]);

        assert!(engine.find_by_id("s1").unwrap().running);
        assert!(!engine.find_by_id("s2").unwrap().running);

        gate.add_permits(1);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        wait_idle(&engine, "s1").await;
    }

    #[tokio::test]
    async fn migrated_run_is_still_stoppable() {
        let (executor, _gate) = gated();
        let (engine, mut rx) = engine_with(executor, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        next(&mut rx.output).await;

        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.stop_job_by_id("s1");

        assert_eq!(next(&mut rx.error).await.msg, "cancelled");
        wait_idle(&engine, "s1").await;
    }

    #[tokio::test]
    async fn manual_request_after_rebuild_runs_once_migrated_run_ends() {
        let (executor, gate) = gated();
        let executor = Arc::new(executor);
        let (emitter, mut rx) = status_channel();
        let engine = SchedulerEngine::new(executor.clone(), emitter, None, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        next(&mut rx.output).await;

        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        // let the new timer loop see the carried-over run
        tokio::time::sleep(Duration::from_millis(50)).await;

        gate.add_permits(2);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":true}"#);
        assert_eq!(next(&mut rx.output).await.msg, r#"{"running":false}"#);
        wait_idle(&engine, "s1").await;
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_after_stopped_migrated_run_gets_live_token() {
        let (executor, _gate) = gated();
        let executor = Arc::new(executor);
        let (emitter, mut rx) = status_channel();
        let engine = SchedulerEngine::new(executor.clone(), emitter, None, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        next(&mut rx.output).await;

        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop_job_by_id("s1");
        assert_eq!(next(&mut rx.error).await.msg, "cancelled");

        // The owed follow-up starts on a fresh token and can itself be stopped.
        for _ in 0..200 {
            if executor.calls.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let job = engine.find_by_id("s1").unwrap();
        assert!(job.running);
        assert!(job.forced);
        engine.stop_job_by_id("s1");
        assert_eq!(next(&mut rx.error).await.msg, "cancelled");
        wait_idle(&engine, "s1").await;
    }

    #[tokio::test]
    async fn rebuild_cancels_removed_running_job() {
        let (executor, _gate) = gated();
        let (engine, mut rx) = engine_with(executor, 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.run_job_by_id("s1");
        next(&mut rx.output).await;

        engine.rebuild_schedule(&[]);

        let err = next(&mut rx.error).await;
        assert_eq!(err.id, "s1");
        assert_eq!(err.msg, "cancelled");
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn shutdown_refuses_new_runs() {
        let (engine, mut rx) = engine_with(Scripted::default(), 4);
        engine.rebuild_schedule(&[schedule("s1", "")]);
        engine.shutdown();

        engine.run_job_by_id("s1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.output.try_recv().is_err());
    }
}
