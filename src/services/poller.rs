//! Fixed-cadence status polling for one submitted job.
//!
//! A session issues its first query immediately, then one query per cadence
//! until the job completes or fails, the attempt or wall-clock budget runs
//! out, or the session is cancelled. Queries never overlap: the next one is
//! scheduled only after the previous one resolved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use garde::Validate;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{to_message, PollError, TimeoutKind};
use crate::models::job::{JobHandle, JobState, JobStatus};
use crate::services::colorization::StatusError;

/// Anything that can answer "what is the state of job X right now".
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, request_id: &str) -> Result<JobStatus, StatusError>;
}

/// Receives the progress of a polling session.
///
/// `on_update` may fire any number of times; after that exactly one of
/// `on_complete` or `on_error` fires, unless the session is cancelled first,
/// in which case neither does.
pub trait PollObserver: Send {
    fn on_update(&mut self, status: &JobStatus);

    fn on_complete(&mut self, result_ref: &str, status: &JobStatus);

    fn on_error(&mut self, error: &PollError);
}

/// Adapts three closures into a [`PollObserver`].
pub struct PollCallbacks<U, C, E> {
    on_update: U,
    on_complete: C,
    on_error: E,
}

impl<U, C, E> PollCallbacks<U, C, E>
where
    U: FnMut(&JobStatus) + Send,
    C: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
{
    pub fn new(on_update: U, on_complete: C, on_error: E) -> Self {
        Self {
            on_update,
            on_complete,
            on_error,
        }
    }
}

impl<U, C, E> PollObserver for PollCallbacks<U, C, E>
where
    U: FnMut(&JobStatus) + Send,
    C: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
{
    fn on_update(&mut self, status: &JobStatus) {
        (self.on_update)(status)
    }

    fn on_complete(&mut self, result_ref: &str, _status: &JobStatus) {
        (self.on_complete)(result_ref)
    }

    fn on_error(&mut self, error: &PollError) {
        (self.on_error)(&to_message(error))
    }
}

/// Polling policy. Both budgets are enforced before every query.
#[derive(Debug, Clone, Validate)]
pub struct PollConfig {
    #[garde(custom(non_zero_duration))]
    pub cadence: Duration,

    #[garde(range(min = 1))]
    pub max_attempts: u32,

    #[garde(custom(non_zero_duration))]
    pub timeout: Duration,

    /// Consecutive failed queries tolerated; one more ends the session.
    /// Zero means the first failed query is terminal.
    #[garde(skip)]
    pub max_transient_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(1),
            max_attempts: 60,
            timeout: Duration::from_secs(60),
            max_transient_errors: 2,
        }
    }
}

impl PollConfig {
    pub fn validated(self) -> Result<Self, garde::Report> {
        self.validate()?;
        Ok(self)
    }
}

pub(crate) fn non_zero_duration(value: &Duration, _ctx: &()) -> garde::Result {
    if value.is_zero() {
        return Err(garde::Error::new("must be greater than zero"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// How a polling session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { result_ref: String },
    Failed(PollError),
    TimedOut(TimeoutKind),
    Cancelled,
}

/// Run-time bookkeeping for one polling session.
#[derive(Debug)]
pub struct PollSession {
    state: PollState,
    attempt_count: u32,
    consecutive_errors: u32,
    started_at: Option<Instant>,
    terminal_fired: bool,
}

impl Default for PollSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSession {
    pub fn new() -> Self {
        Self {
            state: PollState::Idle,
            attempt_count: 0,
            consecutive_errors: 0,
            started_at: None,
            terminal_fired: false,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn is_closed(&self) -> bool {
        self.terminal_fired
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn begin(&mut self) {
        self.started_at = Some(Instant::now());
        self.state = PollState::Polling;
    }

    /// Which budget, if any, forbids issuing another query.
    fn exhausted_budget(&self, config: &PollConfig) -> Option<TimeoutKind> {
        if self.elapsed() > config.timeout {
            Some(TimeoutKind::WallClock)
        } else if self.attempt_count >= config.max_attempts {
            Some(TimeoutKind::Attempts)
        } else {
            None
        }
    }

    /// Move into a terminal state. Returns `false` if the session was
    /// already closed, in which case nothing changes.
    pub fn close(&mut self, state: PollState) -> bool {
        if self.terminal_fired {
            return false;
        }
        self.terminal_fired = true;
        self.state = state;
        true
    }
}

/// Drive one session to its end, reporting to `observer`.
///
/// A response that lands after `cancel` fired is dropped without a callback.
pub async fn run_session<S, O>(
    source: &S,
    handle: &JobHandle,
    config: &PollConfig,
    observer: &mut O,
    cancel: &CancellationToken,
) -> PollOutcome
where
    S: StatusSource + ?Sized,
    O: PollObserver + ?Sized,
{
    let mut session = PollSession::new();
    session.begin();

    tracing::info!(
        request_id = %handle.request_id,
        cadence_ms = config.cadence.as_millis() as u64,
        max_attempts = config.max_attempts,
        timeout_ms = config.timeout.as_millis() as u64,
        "Polling job status"
    );

    loop {
        if cancel.is_cancelled() {
            return cancelled(&mut session, handle);
        }

        if let Some(kind) = session.exhausted_budget(config) {
            return conclude(&mut session, handle, observer, Terminal::TimedOut(kind));
        }

        session.attempt_count += 1;
        metrics::counter!("colorize_status_queries_total").increment(1);
        tracing::debug!(request_id = %handle.request_id, attempt = session.attempt_count, "Querying job status");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&mut session, handle),
            response = source.fetch_status(&handle.request_id) => response,
        };

        if cancel.is_cancelled() {
            return cancelled(&mut session, handle);
        }

        match response {
            Ok(status) => {
                session.consecutive_errors = 0;
                match &status.state {
                    JobState::Processing => observer.on_update(&status),
                    JobState::Complete { result_ref } => {
                        let terminal = Terminal::Completed(result_ref.clone(), &status);
                        return conclude(&mut session, handle, observer, terminal);
                    }
                    JobState::Failed { detail } => {
                        let terminal = Terminal::Failed(PollError::JobFailed(detail.clone()));
                        return conclude(&mut session, handle, observer, terminal);
                    }
                }
            }
            Err(e) => {
                session.consecutive_errors += 1;
                let message = to_message(&e);
                if session.consecutive_errors > config.max_transient_errors {
                    let terminal = Terminal::Failed(PollError::Transient(message));
                    return conclude(&mut session, handle, observer, terminal);
                }
                tracing::warn!(
                    request_id = %handle.request_id,
                    attempt = session.attempt_count,
                    consecutive_errors = session.consecutive_errors,
                    error = %message,
                    "Status query failed, will retry"
                );
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&mut session, handle),
            _ = tokio::time::sleep(config.cadence) => {}
        }
    }
}

enum Terminal<'a> {
    Completed(String, &'a JobStatus),
    Failed(PollError),
    TimedOut(TimeoutKind),
}

fn conclude<O: PollObserver + ?Sized>(
    session: &mut PollSession,
    handle: &JobHandle,
    observer: &mut O,
    terminal: Terminal<'_>,
) -> PollOutcome {
    let state = match terminal {
        Terminal::Completed(..) => PollState::Completed,
        Terminal::Failed(_) => PollState::Failed,
        Terminal::TimedOut(_) => PollState::TimedOut,
    };
    if !session.close(state) {
        return PollOutcome::Cancelled;
    }

    let elapsed = session.elapsed();
    metrics::histogram!("colorize_job_seconds").record(elapsed.as_secs_f64());

    match terminal {
        Terminal::Completed(result_ref, status) => {
            metrics::counter!("colorize_jobs_completed").increment(1);
            tracing::info!(
                request_id = %handle.request_id,
                attempts = session.attempt_count,
                elapsed_ms = elapsed.as_millis() as u64,
                result_ref = %result_ref,
                "Colorization complete"
            );
            observer.on_complete(&result_ref, status);
            PollOutcome::Completed { result_ref }
        }
        Terminal::Failed(error) => {
            metrics::counter!("colorize_jobs_failed").increment(1);
            tracing::warn!(
                request_id = %handle.request_id,
                attempts = session.attempt_count,
                error = %error,
                "Colorization failed"
            );
            observer.on_error(&error);
            PollOutcome::Failed(error)
        }
        Terminal::TimedOut(kind) => {
            metrics::counter!("colorize_jobs_timed_out").increment(1);
            let error = PollError::Timeout(kind);
            tracing::warn!(
                request_id = %handle.request_id,
                attempts = session.attempt_count,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %error,
                "Colorization timed out"
            );
            observer.on_error(&error);
            PollOutcome::TimedOut(kind)
        }
    }
}

fn cancelled(session: &mut PollSession, handle: &JobHandle) -> PollOutcome {
    if session.close(PollState::Cancelled) {
        tracing::info!(
            request_id = %handle.request_id,
            attempts = session.attempt_count,
            "Polling cancelled"
        );
    }
    PollOutcome::Cancelled
}

/// A polling session running on its own task.
pub struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Stop polling. Idempotent, and a no-op once the session has ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn outcome(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => PollOutcome::Cancelled,
        }
    }
}

/// Spawn a polling session. The first query goes out immediately.
pub fn start_polling<S, O>(
    source: Arc<S>,
    handle: JobHandle,
    config: PollConfig,
    mut observer: O,
) -> PollHandle
where
    S: StatusSource + ?Sized + 'static,
    O: PollObserver + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let span = tracing::info_span!("poll_session", request_id = %handle.request_id);

    let task = tokio::spawn(
        async move { run_session(source.as_ref(), &handle, &config, &mut observer, &token).await }
            .instrument(span),
    );

    PollHandle { cancel, task }
}
