//! Terminal error taxonomy for a polling session, plus the normalization
//! applied to every error crossing an external boundary.

use std::fmt::Display;

const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Why a polling session gave up while the job was still processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    WallClock,
    Attempts,
}

/// Every way a polling session can end without a colorized result.
///
/// Downstream consumers only see the rendered message; the variants exist so
/// logs and metrics can tell a slow job from a broken one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// Status queries kept failing at the transport or protocol level.
    #[error("{0}")]
    Transient(String),

    /// The service reported `status: failed`.
    #[error("{0}")]
    JobFailed(String),

    #[error("{}", timeout_message(*.0))]
    Timeout(TimeoutKind),
}

impl PollError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout(_))
    }
}

fn timeout_message(kind: TimeoutKind) -> &'static str {
    match kind {
        TimeoutKind::WallClock => "Colorization timeout: Process took too long",
        TimeoutKind::Attempts => "Colorization timeout: Maximum retries reached",
    }
}

/// Render any error into a single non-empty, human-readable line.
pub fn to_message<E: Display + ?Sized>(err: &E) -> String {
    let rendered = err.to_string();
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        trimmed.to_string()
    }
}
