//! Message ledger CRUD.

use super::StoreError;
use crate::model::Message;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Returns true if a row with this `(event, request_id)` already exists.
/// Used by the ingest worker for dedup.
pub fn message_exists(
    conn: &Connection,
    event: &str,
    request_id: &str,
) -> Result<bool, StoreError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM messages WHERE event = ?1 AND request_id = ?2",
            params![event, request_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

/// Insert a new unprocessed message row. Returns the new row id.
pub fn insert_message(
    conn: &Connection,
    event: &str,
    request_id: &str,
    request_payload: &str,
    requested_at: DateTime<Utc>,
    queued_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO messages
            (event, request_id, request_payload, response_payload, error_message,
             success, processed, replied, requested_at, queued_at, processed_at)
         VALUES (?1, ?2, ?3, '{}', '', 0, 0, 0, ?4, ?5, NULL)",
        params![
            event,
            request_id,
            request_payload,
            requested_at.to_rfc3339(),
            queued_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch up to `limit` unprocessed messages, ordered by `queued_at` ascending
/// (strict FIFO drain order).
pub fn fetch_unprocessed_batch(conn: &Connection, limit: i64) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, event, request_id, request_payload, response_payload, error_message,
                success, processed, replied, requested_at, queued_at, processed_at
         FROM messages
         WHERE processed = 0
         ORDER BY queued_at ASC, id ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], map_message)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Fetch up to `limit` processed-but-unreplied messages.
pub fn fetch_unreplied_batch(conn: &Connection, limit: i64) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, event, request_id, request_payload, response_payload, error_message,
                success, processed, replied, requested_at, queued_at, processed_at
         FROM messages
         WHERE processed = 1 AND replied = 0
         ORDER BY processed_at ASC, id ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], map_message)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Write back a message row's processed/response fields within the caller's
/// transaction (always written back in the same transaction as the
/// handler invocation).
pub fn save_processed(conn: &Connection, msg: &Message) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE messages
         SET response_payload = ?2, error_message = ?3, success = ?4,
             processed = ?5, processed_at = ?6
         WHERE id = ?1",
        params![
            msg.id,
            msg.response_payload,
            msg.error_message,
            msg.success,
            msg.processed,
            msg.processed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

/// Mark a batch of message ids as replied, in one update.
pub fn mark_replied_batch(conn: &Connection, ids: &[i64]) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    conn.execute(
        &format!("UPDATE messages SET replied = 1 WHERE id IN ({placeholders})"),
        [],
    )?;
    Ok(())
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let requested_at: String = row.get(9)?;
    let queued_at: String = row.get(10)?;
    let processed_at: Option<String> = row.get(11)?;
    Ok(Message {
        id: row.get(0)?,
        event: row.get(1)?,
        request_id: row.get(2)?,
        request_payload: row.get(3)?,
        response_payload: row.get(4)?,
        error_message: row.get(5)?,
        success: row.get(6)?,
        processed: row.get(7)?,
        replied: row.get(8)?,
        requested_at: parse_rfc3339(&requested_at),
        queued_at: parse_rfc3339(&queued_at),
        processed_at: processed_at.map(|s| parse_rfc3339(&s)),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
