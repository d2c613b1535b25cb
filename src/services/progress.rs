//! Synthetic progress for jobs whose server reports no fractional progress.
//!
//! The displayed percentage eases toward a ceiling below 100 and only jumps
//! to 100 on confirmed completion. It is cosmetic and never decides anything.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use garde::Validate;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::services::poller::non_zero_duration;

#[derive(Debug, Clone, Validate)]
pub struct ProgressConfig {
    #[garde(custom(non_zero_duration))]
    pub tick: Duration,

    /// Soft cap held while the job is outstanding.
    #[garde(range(min = 1, max = 99))]
    pub ceiling: u8,

    /// Share of the remaining gap covered per tick.
    #[garde(custom(easing_factor))]
    pub factor: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            ceiling: 95,
            factor: 0.07,
        }
    }
}

impl ProgressConfig {
    pub fn validated(self) -> Result<Self, garde::Report> {
        self.validate()?;
        Ok(self)
    }
}

fn easing_factor(value: &f64, _ctx: &()) -> garde::Result {
    if !(*value > 0.0 && *value <= 1.0) {
        return Err(garde::Error::new("must be in (0, 1]"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Running,
    Completed,
    Frozen,
}

/// The displayed percentage and the easing rule that advances it.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    displayed: u8,
    ceiling: u8,
    factor: f64,
    phase: ProgressPhase,
}

impl ProgressEstimator {
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            displayed: 0,
            ceiling: config.ceiling.min(99),
            factor: config.factor,
            phase: ProgressPhase::Running,
        }
    }

    pub fn displayed(&self) -> u8 {
        self.displayed
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    /// Advance by a proportional share of the remaining gap, at least one
    /// point, never past the ceiling. No effect once completed or frozen.
    pub fn tick(&mut self) -> u8 {
        if self.phase != ProgressPhase::Running || self.displayed >= self.ceiling {
            return self.displayed;
        }

        let gap = f64::from(self.ceiling - self.displayed);
        let step = ((gap * self.factor).round() as u8).max(1);
        self.displayed = self.displayed.saturating_add(step).min(self.ceiling);
        self.displayed
    }

    pub fn complete(&mut self) -> u8 {
        if self.phase == ProgressPhase::Running {
            self.displayed = 100;
            self.phase = ProgressPhase::Completed;
        }
        self.displayed
    }

    pub fn freeze(&mut self) {
        if self.phase == ProgressPhase::Running {
            self.phase = ProgressPhase::Frozen;
        }
    }
}

struct ProgressShared {
    estimator: Mutex<ProgressEstimator>,
    tx: watch::Sender<u8>,
}

impl ProgressShared {
    fn lock(&self) -> MutexGuard<'_, ProgressEstimator> {
        self.estimator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs a [`ProgressEstimator`] on its own tick timer and publishes each
/// value on a watch channel.
///
/// Dropping the ticker stops the timer.
pub struct ProgressTicker {
    shared: Arc<ProgressShared>,
    stop: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl ProgressTicker {
    /// Start ticking. The first advance happens one tick after spawning.
    /// Cancelling `parent` stops the timer too.
    pub fn spawn(config: &ProgressConfig, parent: &CancellationToken) -> Self {
        let (tx, _) = watch::channel(0u8);
        let shared = Arc::new(ProgressShared {
            estimator: Mutex::new(ProgressEstimator::new(config)),
            tx,
        });
        let stop = parent.child_token();

        let task = tokio::spawn(tick_loop(shared.clone(), stop.clone(), config.tick));

        Self {
            shared,
            _guard: stop.clone().drop_guard(),
            stop,
            task,
        }
    }

    /// Observe the displayed percentage.
    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.shared.tx.subscribe()
    }

    pub fn displayed(&self) -> u8 {
        self.shared.lock().displayed()
    }

    /// Snap to 100 and stop ticking. Subscribers see 100 before this returns.
    pub fn complete(&self) {
        let mut estimator = self.shared.lock();
        let value = estimator.complete();
        self.shared.tx.send_replace(value);
        drop(estimator);
        self.stop.cancel();
    }

    /// Stop ticking and leave the displayed value where it is.
    pub fn freeze(&self) {
        self.shared.lock().freeze();
        self.stop.cancel();
    }

    /// Wait for the tick task to exit after `complete`, `freeze` or cancellation.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn tick_loop(shared: Arc<ProgressShared>, stop: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let mut estimator = shared.lock();
                if estimator.phase() != ProgressPhase::Running {
                    break;
                }
                let before = estimator.displayed();
                let value = estimator.tick();
                if value != before {
                    shared.tx.send_replace(value);
                }
            }
        }
    }

    tracing::trace!("Progress ticker stopped");
}
