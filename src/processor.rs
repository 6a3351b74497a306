//! Request Processor: drains unprocessed messages in FIFO order, dispatches
//! each to its mutation handler inside a per-message savepoint, and runs
//! orphan GC before committing the batch.
//!
//! The enclosing batch transaction is the unit of atomicity the store
//! guarantees; it is not rolled back by a handler error. Each message is
//! additionally wrapped in its own savepoint so a handler that validates,
//! writes, then errors on a later write leaves no partial entity mutation
//! behind — only the message's own processed/response fields still get
//! written back on the enclosing transaction.

use crate::broadcast::Broadcaster;
use crate::events;
use crate::handlers;
use crate::model::Message;
use crate::store::{config_store, messages, Store, StoreError};
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const BATCH_LIMIT: i64 = 100;
const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// Run the processor loop until `token` is cancelled.
pub async fn run(store: &Store, broadcaster: &Broadcaster, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            info!("processor shutting down");
            return;
        }

        match process_batch_once(store) {
            Ok(0) => {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = token.cancelled() => return,
                }
            }
            Ok(n) => {
                info!(count = n, "processor committed batch");
                broadcaster.broadcast_changes();
            }
            Err(e) => {
                error!(error = %e, "processor batch failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = token.cancelled() => return,
                }
            }
        }
    }
}

/// Fetch and process one batch. Returns the number of messages processed
/// (0 if the unprocessed queue was empty).
pub(crate) fn process_batch_once(store: &Store) -> Result<usize, StoreError> {
    let ro = store.read_only_connection()?;
    let batch = messages::fetch_unprocessed_batch(&ro, BATCH_LIMIT)?;
    drop(ro);

    if batch.is_empty() {
        return Ok(0);
    }

    let count = batch.len();
    store.with_write_transaction(|tx| {
        for msg in &batch {
            process_one(tx, msg)?;
        }
        config_store::gc_orphans(tx)?;
        Ok(())
    })?;
    Ok(count)
}

fn process_one(tx: &mut rusqlite::Transaction<'_>, msg: &Message) -> Result<(), StoreError> {
    let mut msg = msg.clone();
    msg.processed = true;
    msg.processed_at = Some(Utc::now());
    msg.response_payload = "{}".to_owned();
    msg.error_message = String::new();
    msg.success = false;

    match events::parse_request(&msg.event, msg.request_payload.as_bytes()) {
        Ok(parsed) => {
            let outcome = run_handler_in_savepoint(tx, &parsed);
            match outcome {
                Ok(data) => {
                    msg.success = true;
                    if !data.is_null() {
                        msg.response_payload = data.to_string();
                    }
                }
                Err(e) => {
                    warn!(
                        request_id = %msg.request_id,
                        event = %msg.event,
                        error = %e,
                        "handler failed"
                    );
                    msg.error_message = e.to_string();
                }
            }
        }
        Err(e) => {
            warn!(
                request_id = %msg.request_id,
                event = %msg.event,
                error = %e,
                "failed to re-parse request payload at process time"
            );
            msg.error_message = e.to_string();
        }
    }

    messages::save_processed(tx, &msg)
}

fn run_handler_in_savepoint(
    tx: &mut rusqlite::Transaction<'_>,
    parsed: &events::ParsedRequest,
) -> handlers::HandlerResult {
    let mut savepoint = tx.savepoint().map_err(StoreError::from)?;
    match handlers::dispatch(&savepoint, parsed) {
        Ok(data) => {
            savepoint.commit().map_err(StoreError::from)?;
            Ok(data)
        }
        Err(e) => {
            // Dropping the unconsumed savepoint rolls back everything the
            // handler wrote before it errored.
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast;
    use crate::store::messages::insert_message;

    fn open_store() -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();
        (store, file)
    }

    #[test]
    fn unknown_event_is_marked_processed_with_error_and_no_retry() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let now = Utc::now();
                insert_message(conn, "v1.unknown.event", "r1", "{}", now, now)?;
                Ok(())
            })
            .unwrap();

        let n = process_batch_once(&store).unwrap();
        assert_eq!(n, 1);

        store
            .with_rw(|conn| {
                let unprocessed =
                    crate::store::messages::fetch_unprocessed_batch(conn, 100)?;
                assert!(unprocessed.is_empty());
                let unreplied = crate::store::messages::fetch_unreplied_batch(conn, 100)?;
                assert_eq!(unreplied.len(), 1);
                assert!(!unreplied[0].success);
                assert!(!unreplied[0].error_message.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn successful_batch_raises_broadcast_edge() {
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let now = Utc::now();
                let payload = serde_json::json!({
                    "request_id": "r1",
                    "requested_at": now.to_rfc3339(),
                    "domain": "example.com",
                    "route_prefix": "",
                }).to_string();
                insert_message(conn, "v1.ingress_rule.delete", "r1", &payload, now, now)?;
                Ok(())
            })
            .unwrap();

        let (broadcaster, mut sub) = broadcast::channel();
        assert!(!sub.poll_and_take());

        let count = process_batch_once(&store).unwrap();
        assert_eq!(count, 1);
        broadcaster.broadcast_changes();
        assert!(sub.poll_and_take());
    }

    #[test]
    fn handler_error_after_a_partial_write_rolls_back_the_listener_insert() {
        // The listener write happens before `backend_sni_domain` is
        // validated, so an invalid SNI domain fails after a row has already
        // been written inside the handler's savepoint.
        let (store, _f) = open_store();
        store
            .with_rw(|conn| {
                let now = Utc::now();
                let payload = serde_json::json!({
                    "request_id": "r1",
                    "requested_at": now.to_rfc3339(),
                    "bind_ip": "0.0.0.0",
                    "port": 443,
                    "protocol": "http",
                    "is_tls": true,
                    "domain": "example.com",
                    "backend_resolver": "static",
                    "backend_hosts": ["a"],
                    "backend_port": 80,
                    "backend_sni_domain": "bad_domain_",
                }).to_string();
                insert_message(conn, "v1.ingress_rule.upsert", "r1", &payload, now, now)?;
                Ok(())
            })
            .unwrap();

        process_batch_once(&store).unwrap();

        store
            .with_rw(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM listeners", [], |r| r.get(0))?;
                assert_eq!(count, 0, "listener insert must be rolled back with the rest of the handler");
                let unreplied = crate::store::messages::fetch_unreplied_batch(conn, 100)?;
                assert!(!unreplied[0].success);
                Ok(())
            })
            .unwrap();
    }
}
