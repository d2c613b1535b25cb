use serde::Deserialize;
use std::time::Duration;

use crate::services::poller::PollConfig;
use crate::services::progress::ProgressConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the colorization service (e.g., "https://api.example.com")
    pub api_base_url: String,

    /// Bearer token attached to every request when present
    #[serde(default)]
    pub api_token: Option<String>,

    /// User identity forwarded as multipart metadata on job creation
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub user_email: Option<String>,

    /// Delay between status queries
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Hard ceiling on status queries per job
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Wall-clock ceiling for one polling session
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Consecutive failed status queries tolerated before the job is abandoned
    #[serde(default = "default_max_transient_errors")]
    pub max_transient_errors: u32,

    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,

    /// Percentage the synthetic progress bar approaches while the job runs
    #[serde(default = "default_progress_ceiling")]
    pub progress_ceiling: u8,

    /// Easing factor applied to the remaining gap on each progress tick
    #[serde(default = "default_progress_factor")]
    pub progress_factor: f64,

    /// Timeout for a single HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Prometheus scrape listener address (e.g., "127.0.0.1:9000"). Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_poll_timeout_ms() -> u64 {
    60_000
}

fn default_max_transient_errors() -> u32 {
    2
}

fn default_progress_tick_ms() -> u64 {
    1000
}

fn default_progress_ceiling() -> u8 {
    95
}

fn default_progress_factor() -> f64 {
    0.07
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build a validated polling policy from the configured values.
    pub fn poll_config(&self) -> Result<PollConfig, garde::Report> {
        PollConfig {
            cadence: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            timeout: Duration::from_millis(self.poll_timeout_ms),
            max_transient_errors: self.max_transient_errors,
        }
        .validated()
    }

    /// Build a validated progress easing policy from the configured values.
    pub fn progress_config(&self) -> Result<ProgressConfig, garde::Report> {
        ProgressConfig {
            tick: Duration::from_millis(self.progress_tick_ms),
            ceiling: self.progress_ceiling,
            factor: self.progress_factor,
        }
        .validated()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
