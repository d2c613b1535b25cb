//! Submission, polling, progress and transition wired together for one image.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::image::ImageUpload;
use crate::models::job::JobHandle;
use crate::services::colorization::{ColorizationApi, SubmissionError};
use crate::services::poller::{run_session, PollConfig, PollOutcome, StatusSource};
use crate::services::progress::{ProgressConfig, ProgressTicker};
use crate::services::transition::{Transition, TransitionController, TransitionSink};

pub struct ColorizationFlow {
    api: Arc<ColorizationApi>,
    poll: PollConfig,
    progress: ProgressConfig,
}

impl ColorizationFlow {
    pub fn new(api: Arc<ColorizationApi>, poll: PollConfig, progress: ProgressConfig) -> Self {
        Self { api, poll, progress }
    }

    /// Submit the image and start the progress timer. Nothing is polled and
    /// no timer runs if the submission fails.
    pub async fn submit(&self, image: &ImageUpload) -> Result<ActiveJob, SubmissionError> {
        self.submit_with(image, CancellationToken::new()).await
    }

    /// Submit, then wait for the job to end and deliver its transition.
    /// Returns `Ok(None)` only if `cancel` fired first.
    pub async fn run<K: TransitionSink>(
        &self,
        image: &ImageUpload,
        sink: K,
        cancel: &CancellationToken,
    ) -> Result<Option<Transition>, SubmissionError> {
        let job = self.submit_with(image, cancel.child_token()).await?;
        Ok(job.wait(sink).await)
    }

    async fn submit_with(&self, image: &ImageUpload, cancel: CancellationToken) -> Result<ActiveJob, SubmissionError> {
        let handle = self.api.submit(image).await?;
        let source: Arc<dyn StatusSource> = self.api.clone();
        Ok(ActiveJob::start(source, handle, self.poll.clone(), &self.progress, cancel))
    }
}

/// A submitted job whose progress timer is running.
///
/// Polling starts with [`ActiveJob::wait`]. Cancelling the job's token stops
/// both the poller and the progress timer; dropping the job stops the timer.
pub struct ActiveJob {
    source: Arc<dyn StatusSource>,
    handle: JobHandle,
    poll: PollConfig,
    ticker: ProgressTicker,
    cancel: CancellationToken,
}

impl ActiveJob {
    pub fn start(
        source: Arc<dyn StatusSource>,
        handle: JobHandle,
        poll: PollConfig,
        progress: &ProgressConfig,
        cancel: CancellationToken,
    ) -> Self {
        let ticker = ProgressTicker::spawn(progress, &cancel);
        Self {
            source,
            handle,
            poll,
            ticker,
            cancel,
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Displayed percentage, updated on every progress tick and on completion.
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.ticker.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Poll until the job ends and hand its transition to `sink`.
    /// Returns `None` if the job was cancelled before reaching a terminal state.
    pub async fn wait<K: TransitionSink>(self, sink: K) -> Option<Transition> {
        let ActiveJob {
            source,
            handle,
            poll,
            ticker,
            cancel,
        } = self;

        let mut controller = TransitionController::new(handle.clone(), sink).with_progress(ticker);
        let outcome = run_session(source.as_ref(), &handle, &poll, &mut controller, &cancel).await;

        if outcome == PollOutcome::Cancelled {
            controller.abandon();
        }
        cancel.cancel();

        controller.into_transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::models::job::{JobState, JobStatus};
    use crate::services::colorization::StatusError;

    struct ProcessingThenDone {
        queries: Mutex<u32>,
        done_after: u32,
    }

    #[async_trait]
    impl StatusSource for ProcessingThenDone {
        async fn fetch_status(&self, _request_id: &str) -> Result<JobStatus, StatusError> {
            let mut queries = self.queries.lock().unwrap();
            *queries += 1;
            let state = if *queries > self.done_after {
                JobState::Complete { result_ref: "https://cdn.example.com/color.jpg".to_string() }
            } else {
                JobState::Processing
            };
            Ok(JobStatus {
                state,
                created_at: None,
                updated_at: None,
            })
        }
    }

    fn job(done_after: u32) -> ActiveJob {
        let source = Arc::new(ProcessingThenDone {
            queries: Mutex::new(0),
            done_after,
        });
        ActiveJob::start(
            source,
            JobHandle {
                request_id: "req-9".to_string(),
                original_ref: "https://cdn.example.com/bw.jpg".to_string(),
            },
            PollConfig {
                cadence: Duration::from_millis(1_500),
                ..Default::default()
            },
            &ProgressConfig::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_monotonic_until_complete() {
        let job = job(4);
        let mut progress = job.progress();

        let observed = tokio::spawn(async move {
            let mut values = vec![*progress.borrow_and_update()];
            while progress.changed().await.is_ok() {
                values.push(*progress.borrow_and_update());
            }
            values
        });

        let transition = job.wait(|_: Transition| {}).await;
        let values = observed.await.unwrap();

        assert!(matches!(transition, Some(Transition::ShowResult { .. })));
        assert_eq!(values.last(), Some(&100));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values[..values.len() - 1].iter().all(|v| *v <= 95));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_terminal_yields_nothing() {
        let job = job(u32::MAX);
        let token = job.cancellation_token();
        let sink_hits = Arc::new(Mutex::new(0));
        let hits = sink_hits.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            token.cancel();
        });

        let transition = job.wait(move |_: Transition| *hits.lock().unwrap() += 1).await;

        assert!(transition.is_none());
        assert_eq!(*sink_hits.lock().unwrap(), 0);
    }
}
