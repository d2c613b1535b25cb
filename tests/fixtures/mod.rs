//! Canned payloads for the fake colorization service

use serde_json::{json, Value};

/// Smallest byte sequence `image::guess_format` recognizes as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

pub const ORIGINAL_URL: &str = "https://cdn.example.com/originals/abc.png";

pub fn upload_accepted(request_id: &str) -> Value {
    json!({
        "request_id": request_id,
        "status": "processing",
        "original_url": ORIGINAL_URL,
        "created_at": "2024-05-01T10:00:00.000000"
    })
}

pub fn processing() -> Value {
    json!({
        "status": "processing",
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:01Z"
    })
}

pub fn complete(colorized_url: &str) -> Value {
    json!({
        "status": "complete",
        "colorized_url": colorized_url,
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:09Z"
    })
}

pub fn failed(message: &str) -> Value {
    json!({
        "status": "failed",
        "error_message": message,
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:03Z"
    })
}

pub fn stats(total_users: u64, total_memories: u64) -> Value {
    json!({
        "total_users": total_users,
        "total_memories": total_memories,
        "last_updated": "2025-01-05T10:00:00Z"
    })
}
