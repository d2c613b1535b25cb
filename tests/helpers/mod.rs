//! In-process stand-in for the colorization service

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use colorize_client::app_state::AppState;
use colorize_client::config::AppConfig;

/// What the fake service answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(StatusCode, Value),
    Text(StatusCode, &'static str),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(status, body) => (status, Json(body)).into_response(),
            Reply::Text(status, body) => (status, body).into_response(),
        }
    }
}

/// One multipart request as the service saw it.
#[derive(Debug, Default, Clone)]
pub struct RecordedUpload {
    pub authorization: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_len: usize,
    pub fields: HashMap<String, String>,
}

pub struct FakeService {
    pub upload_reply: Mutex<Reply>,
    pub ephemeral_reply: Mutex<Reply>,
    pub stats_reply: Mutex<Reply>,
    /// Replayed in order; `processing` once exhausted.
    pub statuses: Mutex<VecDeque<Reply>>,
    pub status_queries: AtomicUsize,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub result_bytes: Vec<u8>,
}

impl FakeService {
    pub fn new(upload_reply: Reply) -> Self {
        Self {
            upload_reply: Mutex::new(upload_reply),
            ephemeral_reply: Mutex::new(Reply::Text(StatusCode::NOT_FOUND, "not configured")),
            stats_reply: Mutex::new(Reply::Text(StatusCode::NOT_FOUND, "not configured")),
            statuses: Mutex::new(VecDeque::new()),
            status_queries: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            result_bytes: crate::fixtures::JPEG_BYTES.to_vec(),
        }
    }

    pub fn with_statuses(self, statuses: Vec<Reply>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_ephemeral(self, reply: Reply) -> Self {
        *self.ephemeral_reply.lock().unwrap() = reply;
        self
    }

    pub fn with_stats(self, reply: Reply) -> Self {
        *self.stats_reply.lock().unwrap() = reply;
        self
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub fn last_upload(&self) -> RecordedUpload {
        self.uploads
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no upload recorded")
    }
}

/// Serve `service` on an ephemeral local port and return its base URL.
pub async fn spawn(service: Arc<FakeService>) -> String {
    let app = Router::new()
        .route("/api/v1/colorize/upload", post(upload))
        .route("/api/v1/colorize/ephemeral", post(ephemeral))
        .route("/api/v1/colorize/status/{request_id}", get(status))
        .route("/api/v1/stats/", get(stats))
        .route("/results/{name}", get(result))
        .with_state(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake service");
    let addr = listener.local_addr().expect("listener address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake service crashed");
    });

    format!("http://{addr}")
}

/// Client configuration pointed at the fake service with fast timers.
pub fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        api_base_url: base_url.to_string(),
        api_token: Some("test-token".to_string()),
        user_id: Some("user-1".to_string()),
        user_email: Some("ada@example.com".to_string()),
        poll_interval_ms: 10,
        max_poll_attempts: 60,
        poll_timeout_ms: 5_000,
        max_transient_errors: 0,
        progress_tick_ms: 5,
        progress_ceiling: 95,
        progress_factor: 0.07,
        request_timeout_secs: 5,
        metrics_addr: None,
    }
}

pub fn test_state(config: AppConfig) -> AppState {
    AppState::new(config).expect("Failed to build client state")
}

async fn record(headers: &HeaderMap, mut multipart: Multipart) -> RecordedUpload {
    let mut recorded = RecordedUpload {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ..Default::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            recorded.file_name = field.file_name().map(String::from);
            recorded.content_type = field.content_type().map(String::from);
            recorded.file_len = field.bytes().await.map(|b| b.len()).unwrap_or_default();
        } else {
            let value = field.text().await.unwrap_or_default();
            recorded.fields.insert(name, value);
        }
    }

    recorded
}

async fn upload(State(service): State<Arc<FakeService>>, headers: HeaderMap, multipart: Multipart) -> Reply {
    let recorded = record(&headers, multipart).await;
    service.uploads.lock().unwrap().push(recorded);
    service.upload_reply.lock().unwrap().clone()
}

async fn ephemeral(State(service): State<Arc<FakeService>>, headers: HeaderMap, multipart: Multipart) -> Reply {
    let recorded = record(&headers, multipart).await;
    service.uploads.lock().unwrap().push(recorded);
    service.ephemeral_reply.lock().unwrap().clone()
}

async fn status(State(service): State<Arc<FakeService>>, Path(_request_id): Path<String>) -> Reply {
    service.status_queries.fetch_add(1, Ordering::SeqCst);
    service
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::Json(StatusCode::OK, crate::fixtures::processing()))
}

async fn result(State(service): State<Arc<FakeService>>, Path(_name): Path<String>) -> Vec<u8> {
    service.result_bytes.clone()
}

async fn stats(State(service): State<Arc<FakeService>>) -> Reply {
    service.stats_reply.lock().unwrap().clone()
}
