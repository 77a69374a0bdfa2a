//! Job lifecycle tracking.
//!
//! [`JobTracker`] owns one job from submission to a terminal outcome:
//!
//! ```text
//! Idle -> Submitting -> Polling -> {Completed, Failed}
//!   ^                                    |
//!   +------------- reset() --------------+
//! ```
//!
//! Entering `Polling` spawns a poll task that queries the status endpoint
//! immediately and then on a fixed interval.  A tick that fires while the
//! previous request is still outstanding is skipped, so at most one
//! request per job is ever in flight.  Every response is checked against
//! the tracker's current job id before it may touch state; responses for a
//! superseded job, or arriving after `stop()`/`reset()`, are dropped.
//!
//! Transient poll failures are logged and counted but never end the loop.
//! Polling has no attempt ceiling and no backoff; a slow job is polled at
//! the base cadence until it reaches a terminal status or the tracker is
//! stopped.
//!
//! State changes are broadcast as [`TrackerEvent`]s; subscribe with
//! [`JobTracker::subscribe`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use greetcard_core::job::{JobHandle, JobResult, JobSnapshot, JobStatus};
use greetcard_core::progress::{translate, DisplayStage};
use greetcard_core::types::JobId;

use crate::api::CardApiError;
use crate::config::MIN_POLL_INTERVAL;
use crate::error::JobError;
use crate::events::TrackerEvent;
use crate::messages::StatusResponse;

/// Broadcast channel capacity for tracker events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Failure reason used when the backend reports `failed` without one.
pub const DEFAULT_FAILURE_REASON: &str = "generation failed";

// ---------------------------------------------------------------------------
// Status source seam
// ---------------------------------------------------------------------------

/// Anything that can report a job's status.
///
/// Implemented by [`CardApi`](crate::api::CardApi); tests substitute a
/// scripted source.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse, CardApiError>;
}

// ---------------------------------------------------------------------------
// Phase / errors
// ---------------------------------------------------------------------------

/// Where the tracker is in the job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl TrackerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Illegal tracker transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Tracker is busy ({phase:?}); reset it before starting another job")]
    Busy { phase: TrackerPhase },

    #[error("No completed card is being tracked ({phase:?})")]
    NotCompleted { phase: TrackerPhase },
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TrackerState {
    phase: TrackerPhase,
    /// Handle of the tracked job, owned until reset.
    handle: Option<JobHandle>,
    snapshot: Option<JobSnapshot>,
    /// Display translation of the stored progress snapshot.
    stages: Vec<DisplayStage>,
    failure_reason: Option<String>,
    consecutive_poll_failures: u32,
}

impl TrackerState {
    fn job_id(&self) -> Option<&str> {
        self.handle.as_ref().map(JobHandle::id)
    }
}

/// State reachable from both the tracker and its poll task.
struct Shared {
    state: Mutex<TrackerState>,
    event_tx: broadcast::Sender<TrackerEvent>,
}

/// What the poll loop should do after a response has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollDisposition {
    /// Keep polling at the base cadence.
    Continue,
    /// The job reached a terminal status.
    Finished,
    /// The response no longer belongs to the tracker's current job.
    Discarded,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Apply one poll outcome issued for `issued_for`.
    ///
    /// The current-job comparison happens here, under the lock, at the
    /// moment the response is consumed.
    fn apply_poll(
        &self,
        issued_for: &str,
        cancel: &CancellationToken,
        result: Result<StatusResponse, CardApiError>,
    ) -> PollDisposition {
        let mut guard = self.lock();
        let state = &mut *guard;

        if cancel.is_cancelled()
            || state.phase != TrackerPhase::Polling
            || state.job_id() != Some(issued_for)
        {
            tracing::debug!(
                job_id = issued_for,
                current_job_id = state.job_id().unwrap_or("-"),
                "Discarding stale poll response",
            );
            return PollDisposition::Discarded;
        }

        let response = match result {
            Ok(response) => {
                state.consecutive_poll_failures = 0;
                response
            }
            Err(e) => {
                state.consecutive_poll_failures += 1;
                let transient = e.is_transient();
                let http_status = e.status();
                let err = JobError::PollTransient(e);
                if transient {
                    tracing::warn!(
                        job_id = issued_for,
                        consecutive_failures = state.consecutive_poll_failures,
                        http_status,
                        transient,
                        error = %err,
                        "Transient poll error, retrying on next tick",
                    );
                } else {
                    tracing::warn!(
                        job_id = issued_for,
                        consecutive_failures = state.consecutive_poll_failures,
                        http_status,
                        transient,
                        error = %err,
                        "Status endpoint rejected the poll, retrying on next tick",
                    );
                }
                return PollDisposition::Continue;
            }
        };

        tracing::debug!(
            job_id = issued_for,
            status = %response.status,
            has_progress = response.progress.is_some(),
            "Poll response",
        );

        match response.status {
            JobStatus::Queued | JobStatus::Generating => {
                let snapshot = state
                    .snapshot
                    .get_or_insert_with(|| JobSnapshot::pending(response.status));

                let previous = snapshot.status();
                if response.status != previous {
                    if previous.can_transition_to(response.status) {
                        snapshot.set_status(response.status);
                        self.emit(TrackerEvent::StatusChanged {
                            job_id: issued_for.to_string(),
                            status: response.status,
                        });
                    } else {
                        tracing::debug!(
                            job_id = issued_for,
                            from = %previous,
                            to = %response.status,
                            "Ignoring status regression",
                        );
                    }
                }

                if let Some(progress) = response.progress {
                    let stages = translate(&progress);
                    snapshot.update_progress(Some(progress));
                    state.stages = stages.clone();
                    self.emit(TrackerEvent::Progress {
                        job_id: issued_for.to_string(),
                        stages,
                    });
                }

                PollDisposition::Continue
            }
            JobStatus::Completed => {
                let result = JobResult {
                    preview_text: response.preview,
                    word_count: response.word_count,
                    banner_url: None,
                };
                state.snapshot = Some(JobSnapshot::completed(result.clone()));
                state.stages.clear();
                state.phase = TrackerPhase::Completed;
                cancel.cancel();

                tracing::info!(
                    job_id = issued_for,
                    word_count = result.word_count,
                    "Job completed",
                );
                self.emit(TrackerEvent::Completed {
                    job_id: issued_for.to_string(),
                    result,
                });
                PollDisposition::Finished
            }
            JobStatus::Failed => {
                let reason = response
                    .error
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string());
                match state.snapshot.as_mut() {
                    Some(snapshot) => snapshot.set_status(JobStatus::Failed),
                    None => state.snapshot = Some(JobSnapshot::pending(JobStatus::Failed)),
                }
                state.stages.clear();
                state.phase = TrackerPhase::Failed;
                state.failure_reason = Some(reason.clone());
                cancel.cancel();

                tracing::error!(job_id = issued_for, reason = %reason, "Job failed");
                self.emit(TrackerEvent::Failed {
                    job_id: issued_for.to_string(),
                    reason,
                });
                PollDisposition::Finished
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JobTracker
// ---------------------------------------------------------------------------

/// Tracks a single job at a time.
///
/// The poll task handle and its cancellation token are plain fields of
/// the tracker: every (re)start cancels the previous pair before assigning
/// a new one, and dropping the tracker stops polling.
pub struct JobTracker {
    shared: Arc<Shared>,
    source: Arc<dyn StatusSource>,
    poll_interval: Duration,
    poll_task: Option<JoinHandle<()>>,
    poll_cancel: Option<CancellationToken>,
}

impl JobTracker {
    /// Intervals shorter than [`MIN_POLL_INTERVAL`] (including zero) are
    /// raised to it.
    pub fn new(source: Arc<dyn StatusSource>, poll_interval: Duration) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                requested_ms = poll_interval.as_millis() as u64,
                min_ms = MIN_POLL_INTERVAL.as_millis() as u64,
                "Poll interval too short, using minimum",
            );
        }
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState::default()),
                event_tx,
            }),
            source,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            poll_task: None,
            poll_cancel: None,
        }
    }

    /// Subscribe to tracker events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn phase(&self) -> TrackerPhase {
        self.shared.lock().phase
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.shared.lock().job_id().map(str::to_string)
    }

    /// Handle of the tracked job, as it was handed to [`track`](Self::track).
    pub fn handle(&self) -> Option<JobHandle> {
        self.shared.lock().handle.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn snapshot(&self) -> Option<JobSnapshot> {
        self.shared.lock().snapshot.clone()
    }

    /// Display stages for the latest progress snapshot.
    pub fn stages(&self) -> Vec<DisplayStage> {
        self.shared.lock().stages.clone()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.shared.lock().failure_reason.clone()
    }

    /// Transient poll failures since the last successful poll.
    pub fn consecutive_poll_failures(&self) -> u32 {
        self.shared.lock().consecutive_poll_failures
    }

    /// Whether a poll timer is currently armed.
    pub fn is_polling(&self) -> bool {
        self.poll_cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }

    /// `Idle -> Submitting`.
    pub fn begin_submission(&mut self) -> Result<(), TrackerError> {
        let mut state = self.shared.lock();
        if state.phase != TrackerPhase::Idle {
            return Err(TrackerError::Busy { phase: state.phase });
        }
        state.phase = TrackerPhase::Submitting;
        tracing::debug!("Tracker entering submission");
        Ok(())
    }

    /// `Submitting -> Idle` after a failed authorization or submission.
    /// Does nothing in any other phase.
    pub fn abort_submission(&mut self) {
        let mut state = self.shared.lock();
        if state.phase == TrackerPhase::Submitting {
            state.phase = TrackerPhase::Idle;
            tracing::debug!("Submission aborted, tracker idle");
        }
    }

    /// Take ownership of a freshly submitted job.
    ///
    /// A snapshot that is already terminal (the synchronous fast path)
    /// resolves immediately without polling.  Otherwise polling starts
    /// with an immediate first query.  Must be called inside a Tokio
    /// runtime.
    pub fn track(&mut self, handle: JobHandle, snapshot: JobSnapshot) -> Result<(), TrackerError> {
        {
            let phase = self.shared.lock().phase;
            if !matches!(phase, TrackerPhase::Idle | TrackerPhase::Submitting) {
                return Err(TrackerError::Busy { phase });
            }
        }
        self.stop();

        let job_id = handle.id().to_string();
        let status = snapshot.status();
        let needs_polling = {
            let mut state = self.shared.lock();
            state.handle = Some(handle);
            state.failure_reason = None;
            state.consecutive_poll_failures = 0;
            state.stages = snapshot.progress().map(translate).unwrap_or_default();

            match status {
                JobStatus::Completed => {
                    let result = snapshot.result().cloned().unwrap_or_default();
                    state.snapshot = Some(snapshot);
                    state.stages.clear();
                    state.phase = TrackerPhase::Completed;
                    tracing::info!(job_id = %job_id, "Job completed on submission");
                    self.shared.emit(TrackerEvent::Completed {
                        job_id: job_id.clone(),
                        result,
                    });
                    false
                }
                JobStatus::Failed => {
                    state.snapshot = Some(snapshot);
                    state.stages.clear();
                    state.phase = TrackerPhase::Failed;
                    state.failure_reason = Some(DEFAULT_FAILURE_REASON.to_string());
                    tracing::error!(job_id = %job_id, "Job failed on submission");
                    self.shared.emit(TrackerEvent::Failed {
                        job_id: job_id.clone(),
                        reason: DEFAULT_FAILURE_REASON.to_string(),
                    });
                    false
                }
                JobStatus::Queued | JobStatus::Generating => {
                    state.snapshot = Some(snapshot);
                    state.phase = TrackerPhase::Polling;
                    self.shared.emit(TrackerEvent::StatusChanged {
                        job_id: job_id.clone(),
                        status,
                    });
                    true
                }
            }
        };

        if needs_polling {
            let cancel = CancellationToken::new();
            let task = tokio::spawn(run_poll_loop(
                Arc::clone(&self.shared),
                Arc::clone(&self.source),
                job_id.clone(),
                self.poll_interval,
                cancel.clone(),
            ));
            self.poll_cancel = Some(cancel);
            self.poll_task = Some(task);
            tracing::info!(
                job_id = %job_id,
                status = %status,
                interval_ms = self.poll_interval.as_millis() as u64,
                "Polling started",
            );
        }
        Ok(())
    }

    /// Start tracking a job that was submitted elsewhere, assuming it is
    /// still generating.
    pub fn track_existing(&mut self, job_id: impl Into<JobId>) -> Result<(), TrackerError> {
        self.track(
            JobHandle::new(job_id, JobStatus::Generating),
            JobSnapshot::pending(JobStatus::Generating),
        )
    }

    /// Record a banner URL on the stored result.
    ///
    /// Only applies while the tracker still holds `job_id` in the
    /// `Completed` phase; returns whether the URL was stored.
    pub fn attach_banner(&self, job_id: &str, banner_url: String) -> bool {
        let mut state = self.shared.lock();
        if state.phase != TrackerPhase::Completed || state.job_id() != Some(job_id) {
            tracing::debug!(job_id, "Ignoring banner for a job no longer tracked");
            return false;
        }
        match state.snapshot.as_mut().and_then(JobSnapshot::result_mut) {
            Some(result) => {
                result.banner_url = Some(banner_url);
                true
            }
            None => false,
        }
    }

    /// Cancel the poll timer and any in-flight request.
    ///
    /// Idempotent.  The phase is left untouched; responses that arrive
    /// afterwards are discarded.
    pub fn stop(&mut self) {
        let had_timer = self.poll_cancel.is_some() || self.poll_task.is_some();
        if let Some(cancel) = self.poll_cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if had_timer {
            tracing::debug!("Polling stopped");
        }
    }

    /// Stop polling, forget the job, and return to `Idle`. Safe from any
    /// phase.
    pub fn reset(&mut self) {
        self.stop();
        let previous = {
            let mut state = self.shared.lock();
            std::mem::take(&mut *state).handle
        };
        tracing::info!(
            job_id = previous.as_ref().map(JobHandle::id).unwrap_or("-"),
            "Tracker reset",
        );
        self.shared.emit(TrackerEvent::Reset);
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

type StatusFuture = BoxFuture<'static, Result<StatusResponse, CardApiError>>;

/// Poll `job_id` until a terminal status, a stale response, or
/// cancellation.
///
/// The first tick of a Tokio interval completes immediately, which gives
/// the no-delay first query.  Dropping `in_flight` on cancellation aborts
/// the underlying HTTP request.
async fn run_poll_loop(
    shared: Arc<Shared>,
    source: Arc<dyn StatusSource>,
    job_id: JobId,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<StatusFuture> = None;
    let mut attempt: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Poll loop cancelled");
                break;
            }
            result = await_in_flight(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                match shared.apply_poll(&job_id, &cancel, result) {
                    PollDisposition::Continue => {}
                    PollDisposition::Finished | PollDisposition::Discarded => break,
                }
            }
            _ = ticker.tick() => {
                if in_flight.is_some() {
                    tracing::debug!(job_id = %job_id, "Previous poll still in flight, skipping tick");
                    continue;
                }
                attempt += 1;
                tracing::debug!(job_id = %job_id, attempt, "Polling job status");
                let source = Arc::clone(&source);
                let id = job_id.clone();
                in_flight = Some(Box::pin(async move { source.fetch_status(&id).await }));
            }
        }
    }
}

async fn await_in_flight(
    in_flight: &mut Option<StatusFuture>,
) -> Result<StatusResponse, CardApiError> {
    match in_flight {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
