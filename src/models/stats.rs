use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public usage counters shown on the landing screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_users: u64,
    pub total_memories: u64,
    /// Raw timestamp as sent by the service; see [`format_date`].
    pub last_updated: String,
}

impl StatsResponse {
    /// Placeholder counters used when the service cannot be reached.
    pub fn fallback() -> Self {
        Self {
            total_users: 20,
            total_memories: 108,
            last_updated: Utc::now().to_rfc3339(),
        }
    }
}

/// Compact display form: `1.2K+`, `3.4M+`, or the plain number below 1000.
pub fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M+", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K+", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// `Jan 5, 2025` style date, or `Recently` when the timestamp does not parse.
pub fn format_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).format("%b %-d, %Y").to_string())
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.format("%b %-d, %Y").to_string())
        })
        .unwrap_or_else(|_| "Recently".to_string())
}
