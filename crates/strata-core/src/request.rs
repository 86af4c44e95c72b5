use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming unit of work submitted to the engine.
///
/// Requests are immutable once created: every downstream component reads
/// the same payload the classifier saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier for this request.
    pub id: Uuid,
    /// The raw input text or payload.
    pub payload: String,
    /// The session this request belongs to.
    pub session_id: Uuid,
    /// UTC timestamp of arrival.
    pub received_at: DateTime<Utc>,
}

impl Request {
    /// Creates a new request with a fresh ID and the current timestamp.
    pub fn new(payload: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            session_id,
            received_at: Utc::now(),
        }
    }
}
