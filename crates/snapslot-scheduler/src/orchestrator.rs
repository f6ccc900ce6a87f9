use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use snapslot_core::config::SchedulerConfig;
use snapslot_core::types::{RunId, Timezone};

use crate::{
    clock::Clock,
    collaborator::{
        Commit, ExecutionCollaborator, NotReadyKind, PreparationCollaborator, Preparation,
        PreparedHandle, Verification,
    },
    error::{Result, SchedulerError},
    registry::InFlightRegistry,
    timing::{compute_plan, immediate_plan, validate_request},
    types::{
        Acknowledgement, FailureKind, Outcome, RunReport, RunState, ScheduleRequest, ScheduleRun,
        SubmitRequest, TimingPlan,
    },
    waiter::{drift_ms, Waiter},
};

const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Runtime knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Applied when a submission carries no timezone.
    pub default_timezone: Timezone,
    /// Bound on the commit call alone; a timeout here is `EXECUTION_FAILED`.
    pub commit_timeout: Duration,
    /// Finished runs kept queryable; the oldest are evicted first.
    pub max_retained_runs: usize,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &SchedulerConfig) -> snapslot_core::Result<Self> {
        Ok(Self {
            default_timezone: cfg.timezone.parse()?,
            commit_timeout: Duration::from_millis(cfg.commit_timeout_ms),
            max_retained_runs: cfg.max_retained_runs,
        })
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_timezone: Timezone::utc(),
            commit_timeout: Duration::from_millis(snapslot_core::config::DEFAULT_COMMIT_TIMEOUT_MS),
            max_retained_runs: snapslot_core::config::DEFAULT_MAX_RETAINED_RUNS,
        }
    }
}

/// A run's record plus the handles used to stop it and to observe its end.
struct RunSlot {
    run: ScheduleRun,
    cancel: CancellationToken,
    done: watch::Sender<Option<Outcome>>,
}

/// Immutable per-run data shared by the worker and its supervisor.
struct RunContext {
    run_id: RunId,
    request: ScheduleRequest,
    plan: TimingPlan,
    /// Skip both suspensions.
    immediate: bool,
    cancel: CancellationToken,
    cleaned: AtomicBool,
}

struct Inner {
    settings: OrchestratorSettings,
    registry: InFlightRegistry,
    runs: DashMap<RunId, RunSlot>,
    preparer: Arc<dyn PreparationCollaborator>,
    executor: Arc<dyn ExecutionCollaborator>,
    waiter: Waiter,
    reports: broadcast::Sender<RunReport>,
}

/// Accepts schedule submissions and drives each admitted run to a terminal outcome.
///
/// Cheap to clone; all clones share the same registry and run table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        preparer: Arc<dyn PreparationCollaborator>,
        executor: Arc<dyn ExecutionCollaborator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                settings,
                registry: InFlightRegistry::new(),
                runs: DashMap::new(),
                preparer,
                executor,
                waiter: Waiter::new(clock),
                reports,
            }),
        }
    }

    /// Build from a single adapter that implements both collaborator roles.
    pub fn with_adapter<A>(settings: OrchestratorSettings, adapter: Arc<A>, clock: Arc<dyn Clock>) -> Self
    where
        A: PreparationCollaborator + ExecutionCollaborator + 'static,
    {
        let preparer: Arc<dyn PreparationCollaborator> = adapter.clone();
        let executor: Arc<dyn ExecutionCollaborator> = adapter;
        Self::new(settings, preparer, executor, clock)
    }

    /// Validate, plan and admit a run, then return without waiting for it.
    ///
    /// Errors are limited to `INVALID_REQUEST`, `TOO_LATE` and `DUPLICATE`;
    /// everything after admission is reported through the run's outcome.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, raw: SubmitRequest) -> Result<Acknowledgement> {
        let now = self.inner.waiter.now();
        let request = validate_request(&raw, self.inner.settings.default_timezone, now)?;
        let plan = compute_plan(request.target_instant(), now);

        if !plan.feasible {
            warn!(
                resource_id = %request.resource_id,
                reason = %plan.reason,
                "submission rejected: plan infeasible"
            );
            return Err(SchedulerError::TooLate {
                reason: plan.reason,
            });
        }

        self.admit(request, plan, now, false)
    }

    /// Prepare, commit and verify right away, skipping both waits.
    ///
    /// The run is keyed on the current local date and time, recorded like a
    /// scheduled one, and shares its failure mapping and cleanup. Resolves
    /// with the terminal report.
    pub async fn book_now(&self, resource_id: &str) -> Result<RunReport> {
        let resource_id = resource_id.trim();
        if resource_id.is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "resource_id must not be empty".to_string(),
            ));
        }

        let now = self.inner.waiter.now();
        let timezone = self.inner.settings.default_timezone;
        let local = timezone.local_datetime(now);
        let request = ScheduleRequest {
            resource_id: resource_id.to_string(),
            target_date: local.date(),
            target_time: local.time().with_nanosecond(0).unwrap_or(local.time()),
            timezone,
        };

        let ack = self.admit(request, immediate_plan(now), now, true)?;
        let outcome = self
            .wait_for_outcome(&ack.run_id)
            .await
            .ok_or_else(|| SchedulerError::RunNotFound {
                id: ack.run_id.to_string(),
            })?;
        let drift_ms = self.get(&ack.run_id).and_then(|run| run.drift_ms);

        Ok(RunReport {
            run_id: ack.run_id,
            resource_id: resource_id.to_string(),
            outcome,
            drift_ms,
        })
    }

    fn admit(
        &self,
        request: ScheduleRequest,
        plan: TimingPlan,
        now: DateTime<Utc>,
        immediate: bool,
    ) -> Result<Acknowledgement> {
        let run_id = RunId::new();
        let key = request.key();

        if !self.inner.registry.try_acquire(key.clone(), run_id.clone()) {
            warn!(
                key = %key,
                holder = ?self.inner.registry.holder(&key),
                "submission rejected: target already in flight"
            );
            return Err(SchedulerError::Duplicate {
                key: key.to_string(),
            });
        }

        let cancel = CancellationToken::new();
        let (done, _) = watch::channel(None);
        let ack = Acknowledgement {
            run_id: run_id.clone(),
            acknowledged_at: now,
            planned_execution_instant: plan.execution_instant,
            estimated_wait_seconds: plan.wait_to_execution_secs,
        };

        self.inner.runs.insert(
            run_id.clone(),
            RunSlot {
                run: ScheduleRun {
                    id: run_id.clone(),
                    request: request.clone(),
                    plan: plan.clone(),
                    state: RunState::Scheduled,
                    created_at: now,
                    started_preparation_at: None,
                    completed_preparation_at: None,
                    executed_at: None,
                    drift_ms: None,
                    finished_at: None,
                    outcome: None,
                    retained_session: None,
                },
                cancel: cancel.clone(),
                done,
            },
        );

        if immediate {
            info!(run_id = %run_id, resource_id = %request.resource_id, "immediate run started");
        } else {
            info!(
                run_id = %run_id,
                resource_id = %request.resource_id,
                preparation = %plan.preparation_instant.to_rfc3339(),
                execution = %plan.execution_instant.to_rfc3339(),
                wait_secs = plan.wait_to_execution_secs,
                "run scheduled"
            );
        }

        self.spawn(Arc::new(RunContext {
            run_id,
            request,
            plan,
            immediate,
            cancel,
            cleaned: AtomicBool::new(false),
        }));

        Ok(ack)
    }

    /// Start the worker task plus a supervisor that turns a panic into
    /// `UNEXPECTED_ERROR` and always finalizes the run.
    fn spawn(&self, ctx: Arc<RunContext>) {
        let worker = tokio::spawn(drive(Arc::clone(&self.inner), Arc::clone(&ctx)));
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = join_error_message(e);
                    error!(run_id = %ctx.run_id, error = %message, "run task died");
                    inner.cleanup(&ctx, None).await;
                    Outcome::failed(
                        FailureKind::UnexpectedError,
                        format!("unexpected error: {message}"),
                    )
                }
            };
            inner.finish(&ctx, outcome);
        });
    }

    pub fn get(&self, run_id: &RunId) -> Option<ScheduleRun> {
        self.inner.runs.get(run_id).map(|slot| slot.run.clone())
    }

    pub fn outcome(&self, run_id: &RunId) -> Option<Outcome> {
        self.inner
            .runs
            .get(run_id)
            .and_then(|slot| slot.run.outcome.clone())
    }

    /// All known runs ordered by creation time.
    pub fn list(&self) -> Vec<ScheduleRun> {
        let mut runs: Vec<ScheduleRun> = self
            .inner
            .runs
            .iter()
            .map(|slot| slot.run.clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        runs
    }

    /// Number of targets currently held by in-flight runs.
    pub fn in_flight(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.inner.registry
    }

    /// Receive a [`RunReport`] for every run that reaches a terminal state.
    pub fn subscribe(&self) -> broadcast::Receiver<RunReport> {
        self.inner.reports.subscribe()
    }

    /// Resolve once the run is terminal. `None` if the run is unknown.
    pub async fn wait_for_outcome(&self, run_id: &RunId) -> Option<Outcome> {
        let mut rx = {
            let slot = self.inner.runs.get(run_id)?;
            slot.done.subscribe()
        };
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone())
    }

    /// Request cancellation of one run. It ends as `CANCELLED` at its next check.
    pub fn cancel(&self, run_id: &RunId) -> Result<()> {
        let slot = self
            .inner
            .runs
            .get(run_id)
            .ok_or_else(|| SchedulerError::RunNotFound {
                id: run_id.to_string(),
            })?;
        if slot.run.state.is_terminal() {
            return Err(SchedulerError::AlreadyFinished {
                id: run_id.to_string(),
            });
        }
        slot.cancel.cancel();
        info!(run_id = %run_id, state = %slot.run.state, "run cancellation requested");
        Ok(())
    }

    /// Cancel every run that has not reached a terminal state.
    ///
    /// Keys stay held until each run finishes and releases its own, so a
    /// resubmission cannot overlap a run that is still winding down.
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self
            .inner
            .runs
            .iter()
            .filter(|slot| !slot.run.state.is_terminal() && !slot.cancel.is_cancelled())
            .map(|slot| slot.cancel.clone())
            .collect();
        for token in &tokens {
            token.cancel();
        }
        let count = tokens.len();
        if count > 0 {
            info!(count, "all in-flight runs cancelled");
        }
        count
    }
}

/// The run state machine. Every return path has already performed (or
/// deliberately skipped) collaborator cleanup.
async fn drive(inner: Arc<Inner>, ctx: Arc<RunContext>) -> Outcome {
    let run_id = &ctx.run_id;
    let resource_id = ctx.request.resource_id.as_str();

    // Suspension 1: preparation instant.
    if !ctx.immediate {
        match inner
            .waiter
            .suspend_until(ctx.plan.preparation_instant, &ctx.cancel)
            .await
        {
            Ok(report) => debug!(run_id = %run_id, drift_ms = report.drift_ms, "preparation instant reached"),
            Err(_) => return inner.cancelled(&ctx, None, "cancelled before preparation").await,
        }
    }

    if !inner.registry.is_held_by(&ctx.request.key(), run_id) {
        warn!(run_id = %run_id, "registry entry cleared while waiting; abandoning run");
        return inner
            .cancelled(&ctx, None, "in-flight registration was cleared before preparation")
            .await;
    }

    inner.transition(run_id, RunState::Preparing);
    if ctx.cancel.is_cancelled() {
        return inner.cancelled(&ctx, None, "cancelled before preparation").await;
    }

    info!(run_id = %run_id, resource_id, collaborator = inner.preparer.name(), "preparing session");
    let handle = match inner.preparer.prepare(resource_id).await {
        Ok(Preparation::Ready(handle)) => handle,
        Ok(Preparation::NotReady { kind, message }) => {
            let kind = match kind {
                NotReadyKind::PreparationFailed => FailureKind::PreparationFailed,
                NotReadyKind::NoCapacity => FailureKind::NoCapacity,
                NotReadyKind::AlreadyDone => FailureKind::AlreadyDone,
            };
            return inner.fail(&ctx, None, kind, message).await;
        }
        Err(e) => {
            return inner
                .fail(
                    &ctx,
                    None,
                    FailureKind::PreparationFailed,
                    format!("preparation error: {e}"),
                )
                .await;
        }
    };

    inner.transition(run_id, RunState::Prepared);
    info!(run_id = %run_id, session_id = %handle.session_id, "session prepared");

    // Suspension 2: execution instant.
    let waited = ctx.immediate
        || inner
            .waiter
            .suspend_until(ctx.plan.execution_instant, &ctx.cancel)
            .await
            .is_ok();
    if !waited || ctx.cancel.is_cancelled() {
        return inner
            .cancelled(&ctx, Some(handle), "cancelled before commit")
            .await;
    }

    let started = inner.waiter.now();
    let drift = drift_ms(ctx.plan.execution_instant, started);
    inner.record_execution(run_id, started, drift);
    info!(run_id = %run_id, drift_ms = drift, "commit firing");

    let timeout = inner.settings.commit_timeout;
    let commit = tokio::time::timeout(timeout, inner.executor.commit(&handle)).await;
    let failure = match commit {
        Ok(Ok(Commit::Committed)) => None,
        Ok(Ok(Commit::Failed(message))) => Some(message),
        Ok(Err(e)) => Some(format!("commit error: {e}")),
        Err(_) => Some(format!("commit timed out after {} ms", timeout.as_millis())),
    };
    if let Some(message) = failure {
        return inner
            .fail(&ctx, Some(handle), FailureKind::ExecutionFailed, message)
            .await;
    }

    if ctx.cancel.is_cancelled() {
        return inner
            .cancelled(&ctx, Some(handle), "cancelled after commit; booking left unverified")
            .await;
    }

    match inner.executor.verify(&handle).await {
        Ok(Verification::Confirmed(message)) => {
            inner.cleanup(&ctx, Some(handle)).await;
            Outcome::succeeded(message)
        }
        Ok(Verification::Unconfirmed(message)) => {
            inner
                .fail(&ctx, Some(handle), FailureKind::VerificationFailed, message)
                .await
        }
        Err(e) => {
            inner
                .fail(
                    &ctx,
                    Some(handle),
                    FailureKind::VerificationFailed,
                    format!("verification error: {e}"),
                )
                .await
        }
    }
}

impl Inner {
    fn transition(&self, run_id: &RunId, state: RunState) {
        let now = self.waiter.now();
        if let Some(mut slot) = self.runs.get_mut(run_id) {
            let from = slot.run.state;
            slot.run.state = state;
            match state {
                RunState::Preparing => slot.run.started_preparation_at = Some(now),
                RunState::Prepared => slot.run.completed_preparation_at = Some(now),
                _ => {}
            }
            debug!(run_id = %run_id, %from, to = %state, "run state changed");
        }
    }

    fn record_execution(&self, run_id: &RunId, started: DateTime<Utc>, drift: f64) {
        if let Some(mut slot) = self.runs.get_mut(run_id) {
            slot.run.state = RunState::Executing;
            slot.run.executed_at = Some(started);
            slot.run.drift_ms = Some(drift);
        }
    }

    async fn cancelled(
        &self,
        ctx: &RunContext,
        handle: Option<PreparedHandle>,
        message: &str,
    ) -> Outcome {
        self.fail(ctx, handle, FailureKind::Cancelled, message.to_string())
            .await
    }

    /// Terminal failure: clean up unless the kind retains the session.
    async fn fail(
        &self,
        ctx: &RunContext,
        handle: Option<PreparedHandle>,
        kind: FailureKind,
        message: String,
    ) -> Outcome {
        if kind.releases_session() {
            self.cleanup(ctx, handle).await;
        } else if let Some(handle) = handle {
            warn!(
                run_id = %ctx.run_id,
                session_id = %handle.session_id,
                "session retained for inspection"
            );
            if let Some(mut slot) = self.runs.get_mut(&ctx.run_id) {
                slot.run.retained_session = Some(handle.session_id);
            }
        }
        Outcome::failed(kind, message)
    }

    /// Best-effort teardown, at most once per run. Failures are logged, never raised.
    async fn cleanup(&self, ctx: &RunContext, handle: Option<PreparedHandle>) {
        if ctx.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        match self
            .preparer
            .cleanup(&ctx.request.resource_id, handle)
            .await
        {
            Ok(()) => debug!(run_id = %ctx.run_id, "session cleaned up"),
            Err(e) => warn!(run_id = %ctx.run_id, error = %e, "session cleanup failed; ignoring"),
        }
    }

    fn finish(&self, ctx: &RunContext, outcome: Outcome) {
        self.registry.release(&ctx.request.key(), &ctx.run_id);

        let now = self.waiter.now();
        let drift = {
            let Some(mut slot) = self.runs.get_mut(&ctx.run_id) else {
                return;
            };
            slot.run.state = if outcome.is_success() {
                RunState::Succeeded
            } else {
                RunState::Failed
            };
            slot.run.finished_at = Some(now);
            slot.run.outcome = Some(outcome.clone());
            slot.done.send_replace(Some(outcome.clone()));
            slot.run.drift_ms
        };

        match &outcome {
            Outcome::Succeeded { message } => {
                info!(run_id = %ctx.run_id, drift_ms = ?drift, %message, "run succeeded")
            }
            Outcome::Failed { kind, message } => {
                warn!(run_id = %ctx.run_id, error_type = %kind, %message, "run failed")
            }
        }

        // No subscribers is fine.
        let _ = self.reports.send(RunReport {
            run_id: ctx.run_id.clone(),
            resource_id: ctx.request.resource_id.clone(),
            outcome,
            drift_ms: drift,
        });

        self.evict_finished();
    }

    /// Drop the oldest finished runs beyond `max_retained_runs`.
    fn evict_finished(&self) {
        let mut finished: Vec<(DateTime<Utc>, RunId)> = self
            .runs
            .iter()
            .filter_map(|slot| slot.run.finished_at.map(|at| (at, slot.run.id.clone())))
            .collect();
        let excess = finished
            .len()
            .saturating_sub(self.settings.max_retained_runs);
        if excess == 0 {
            return;
        }
        finished.sort();
        for (_, run_id) in finished.into_iter().take(excess) {
            self.runs.remove(&run_id);
            debug!(run_id = %run_id, "finished run evicted");
        }
    }
}

fn join_error_message(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "run task was aborted".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "run task panicked".to_string()),
        Err(_) => "run task failed".to_string(),
    }
}
