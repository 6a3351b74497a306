//! The pipeline ledger row.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single request/reply ledger entry.
///
/// Invariants: `(event, request_id)` is unique; `processed ⇒ processed_at ≠
/// None`; `replied ⇒ processed`; once `replied` is true the row never
/// changes again.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub event: String,
    pub request_id: String,
    pub request_payload: String,
    pub response_payload: String,
    pub error_message: String,
    pub success: bool,
    pub processed: bool,
    pub replied: bool,
    pub requested_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
