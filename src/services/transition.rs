//! Turns the poller's terminal callback into the one downstream state change.

use crate::error::{to_message, PollError};
use crate::models::job::{JobHandle, JobStatus};
use crate::services::poller::PollObserver;
use crate::services::progress::ProgressTicker;

/// The single state change that ends a job's processing view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Show the before/after comparison.
    ShowResult { original_ref: String, result_ref: String },
    /// Show the error view. The job is abandoned; `can_resubmit` offers the
    /// path back to a fresh submission.
    ShowError { message: String, can_resubmit: bool },
}

/// Where transitions are delivered (navigator, UI state store, CLI output).
pub trait TransitionSink: Send {
    fn navigate(&mut self, transition: Transition);
}

impl<F> TransitionSink for F
where
    F: FnMut(Transition) + Send,
{
    fn navigate(&mut self, transition: Transition) {
        self(transition)
    }
}

/// Observes a polling session and performs at most one [`Transition`].
///
/// Driven only by the poller's terminal callbacks; progress ticks never reach
/// it. On either terminal callback it also settles the progress ticker.
pub struct TransitionController<K> {
    handle: JobHandle,
    progress: Option<ProgressTicker>,
    sink: K,
    fired: Option<Transition>,
}

impl<K: TransitionSink> TransitionController<K> {
    pub fn new(handle: JobHandle, sink: K) -> Self {
        Self {
            handle,
            progress: None,
            sink,
            fired: None,
        }
    }

    pub fn with_progress(mut self, ticker: ProgressTicker) -> Self {
        self.progress = Some(ticker);
        self
    }

    pub fn transition(&self) -> Option<&Transition> {
        self.fired.as_ref()
    }

    pub fn into_transition(self) -> Option<Transition> {
        self.fired
    }

    /// The view went away before the job ended: stop the progress timer
    /// without transitioning.
    pub fn abandon(&mut self) {
        if let Some(ticker) = self.progress.take() {
            ticker.freeze();
        }
    }

    fn fire(&mut self, transition: Transition) {
        if self.fired.is_some() {
            tracing::warn!(request_id = %self.handle.request_id, "Ignoring second terminal signal");
            return;
        }

        tracing::info!(request_id = %self.handle.request_id, transition = ?transition, "Transitioning");
        self.sink.navigate(transition.clone());
        self.fired = Some(transition);
    }
}

impl<K: TransitionSink> PollObserver for TransitionController<K> {
    fn on_update(&mut self, status: &JobStatus) {
        tracing::trace!(request_id = %self.handle.request_id, updated_at = ?status.updated_at, "Job still processing");
    }

    fn on_complete(&mut self, result_ref: &str, _status: &JobStatus) {
        if self.fired.is_some() {
            return;
        }
        if let Some(ticker) = self.progress.take() {
            ticker.complete();
        }
        self.fire(Transition::ShowResult {
            original_ref: self.handle.original_ref.clone(),
            result_ref: result_ref.to_string(),
        });
    }

    fn on_error(&mut self, error: &PollError) {
        if self.fired.is_some() {
            return;
        }
        if let Some(ticker) = self.progress.take() {
            ticker.freeze();
        }
        self.fire(Transition::ShowError {
            message: to_message(error),
            can_resubmit: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::error::TimeoutKind;
    use crate::models::job::JobState;
    use crate::services::progress::ProgressConfig;

    fn handle() -> JobHandle {
        JobHandle {
            request_id: "req-7".to_string(),
            original_ref: "file:///photos/bw.jpg".to_string(),
        }
    }

    fn status(state: JobState) -> JobStatus {
        JobStatus {
            state,
            created_at: None,
            updated_at: None,
        }
    }

    fn recording_sink() -> (Arc<Mutex<Vec<Transition>>>, impl TransitionSink) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        (seen, move |t: Transition| sink_seen.lock().unwrap().push(t))
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_transitions_once_with_both_locators() {
        let (seen, sink) = recording_sink();
        let ticker = ProgressTicker::spawn(&ProgressConfig::default(), &CancellationToken::new());
        let progress = ticker.subscribe();
        let mut controller = TransitionController::new(handle(), sink).with_progress(ticker);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(*progress.borrow(), 13);

        let done = status(JobState::Complete { result_ref: "X".to_string() });
        controller.on_complete("X", &done);
        controller.on_complete("Y", &done);
        controller.on_error(&PollError::Timeout(TimeoutKind::WallClock));

        assert_eq!(*progress.borrow(), 100);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Transition::ShowResult {
                original_ref: "file:///photos/bw.jpg".to_string(),
                result_ref: "X".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_freezes_progress_and_offers_resubmit() {
        let (seen, sink) = recording_sink();
        let ticker = ProgressTicker::spawn(&ProgressConfig::default(), &CancellationToken::new());
        let progress = ticker.subscribe();
        let mut controller = TransitionController::new(handle(), sink).with_progress(ticker);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        controller.on_error(&PollError::JobFailed("Image too small".to_string()));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*progress.borrow(), 7);
        assert_eq!(
            controller.transition(),
            Some(&Transition::ShowError {
                message: "Image too small".to_string(),
                can_resubmit: true,
            })
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_updates_never_transition() {
        let (seen, sink) = recording_sink();
        let mut controller = TransitionController::new(handle(), sink);

        for _ in 0..5 {
            controller.on_update(&status(JobState::Processing));
        }

        assert!(controller.transition().is_none());
        assert!(seen.lock().unwrap().is_empty());
        assert!(controller.into_transition().is_none());
    }
}
