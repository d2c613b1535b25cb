use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::Display;

/// One submitted colorization request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub request_id: String,
    /// Locator of the pre-colorization image, carried through to the result view.
    pub original_ref: String,
}

/// Job state as reported by a single status query.
///
/// The result locator exists only on `Complete` and the failure detail only
/// on `Failed`, so a status can never carry both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Processing,
    Complete { result_ref: String },
    Failed { detail: String },
}

/// Snapshot returned by one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Advisory only.
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, JobState::Processing)
    }
}

/// Status values on the wire. `done` and `error` are spellings used by older
/// service deployments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WireStatus {
    Processing,
    #[serde(alias = "done")]
    Complete,
    #[serde(alias = "error")]
    Failed,
}

/// Body of `GET /api/v1/colorize/status/{request_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: WireStatus,
    #[serde(default)]
    pub colorized_url: Option<String>,
    #[serde(default, alias = "message")]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a successful `POST /api/v1/colorize/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Error body returned alongside a non-success status. FastAPI-style services
/// send either a string or a list of validation issues as `detail`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::String(_) | serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MalformedStatus {
    #[error("Status reported complete without a colorized_url")]
    MissingResult,
}

impl TryFrom<StatusResponse> for JobStatus {
    type Error = MalformedStatus;

    fn try_from(resp: StatusResponse) -> Result<Self, Self::Error> {
        let state = match resp.status {
            WireStatus::Processing => JobState::Processing,
            WireStatus::Complete => {
                let result_ref = resp
                    .colorized_url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(MalformedStatus::MissingResult)?;
                JobState::Complete { result_ref }
            }
            WireStatus::Failed => JobState::Failed {
                detail: resp
                    .error_message
                    .filter(|msg| !msg.trim().is_empty())
                    .unwrap_or_else(|| "Colorization failed".to_string()),
            },
        };

        Ok(JobStatus {
            state,
            created_at: resp.created_at,
            updated_at: resp.updated_at,
        })
    }
}

/// Accept RFC 3339 timestamps as well as naive ones (treated as UTC).
/// Anything unparseable or not a string becomes `None`; timestamps never drive control flow.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    let Some(serde_json::Value::String(s)) = raw else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        });
    Ok(parsed)
}
