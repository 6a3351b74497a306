//! Ingest Worker: drains the subscriber's queue, validates and dedupes each
//! message, and persists it as an unprocessed `Message` row.

use crate::bus;
use crate::events::{self, EventError};
use crate::store::{messages, Store};
use async_nats::jetstream::{self, Message as JetstreamMessage};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const DRAIN_EMPTY_SLEEP: Duration = Duration::from_millis(25);
const DRAIN_NONEMPTY_SLEEP: Duration = Duration::from_millis(100);

/// What the caller should do with a delivered message once [`ingest_one`]
/// has run against it.
#[derive(Debug, PartialEq, Eq)]
enum IngestDecision {
    Ack,
    Nak,
}

/// Run the ingest loop until `token` is cancelled.
pub async fn run(
    store: &Store,
    agent_id: &str,
    mut rx: mpsc::Receiver<JetstreamMessage>,
    token: CancellationToken,
) {
    let prefix = bus::request_subject_prefix(agent_id);

    loop {
        if token.is_cancelled() {
            return;
        }

        let mut batch = Vec::new();
        while let Ok(message) = rx.try_recv() {
            batch.push(message);
        }

        if batch.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(DRAIN_EMPTY_SLEEP) => {}
                _ = token.cancelled() => return,
                received = rx.recv() => {
                    match received {
                        Some(message) => batch.push(message),
                        None => return, // subscriber is gone
                    }
                }
            }
            if batch.is_empty() {
                continue;
            }
        }

        for message in &batch {
            let subject = message.subject.as_str();
            let payload = message.payload.as_ref();
            let decision = ingest_one(store, &prefix, subject, payload);
            acknowledge(message, decision).await;
        }

        tokio::select! {
            _ = tokio::time::sleep(DRAIN_NONEMPTY_SLEEP) => {}
            _ = token.cancelled() => return,
        }
    }
}

fn ingest_one(store: &Store, prefix: &str, subject: &str, payload: &[u8]) -> IngestDecision {
    let event = match subject.strip_prefix(prefix) {
        Some(e) => e,
        None => {
            warn!(subject, "subject does not match the expected request prefix, dropping");
            return IngestDecision::Ack;
        }
    };

    let parsed = match events::parse_request(event, payload) {
        Ok(p) => p,
        Err(EventError::UnknownEvent(e)) => {
            warn!(event = %e, "unknown event, dropping");
            return IngestDecision::Ack;
        }
        Err(e) => {
            warn!(event, error = %e, "malformed request, dropping");
            return IngestDecision::Ack;
        }
    };

    let request_id = parsed.request_id().to_owned();
    let requested_at = parsed.requested_at();

    let canonical = match parsed.to_canonical_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(event, error = %e, "failed to canonicalize request, dropping");
            return IngestDecision::Ack;
        }
    };

    let result = store.with_rw(|conn| {
        if messages::message_exists(conn, event, &request_id)? {
            return Ok(());
        }
        messages::insert_message(conn, event, &request_id, &canonical, requested_at, Utc::now())?;
        Ok(())
    });

    match result {
        Ok(()) => IngestDecision::Ack,
        Err(e) => {
            warn!(event, request_id, error = %e, "store write failed, nak for redelivery");
            IngestDecision::Nak
        }
    }
}

async fn acknowledge(message: &JetstreamMessage, decision: IngestDecision) {
    let result = match decision {
        IngestDecision::Ack => message.ack().await,
        IngestDecision::Nak => message.ack_with(jetstream::AckKind::Nak(None)).await,
    };
    if let Err(e) = result {
        warn!(error = %e, "failed to ack/nak message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();
        (store, file)
    }

    fn valid_payload() -> Vec<u8> {
        serde_json::json!({
            "request_id": "r1",
            "requested_at": "2024-01-01T00:00:00Z",
            "bind_ip": "0.0.0.0",
            "port": 443,
            "protocol": "http",
            "domain": "example.com",
            "route_prefix": "",
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn malformed_subject_is_ack_and_drop() {
        let (store, _f) = open_store();
        let decision = ingest_one(
            &store,
            "proxy.agent-1.request.",
            "proxy.other-agent.request.v1.ingress_rule.delete",
            &valid_payload(),
        );
        assert_eq!(decision, IngestDecision::Ack);
    }

    #[test]
    fn unknown_event_is_ack_and_drop() {
        let (store, _f) = open_store();
        let decision = ingest_one(
            &store,
            "proxy.agent-1.request.",
            "proxy.agent-1.request.v1.unknown.event",
            &valid_payload(),
        );
        assert_eq!(decision, IngestDecision::Ack);

        store
            .with_rw(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn valid_message_is_persisted_and_acked() {
        let (store, _f) = open_store();
        let decision = ingest_one(
            &store,
            "proxy.agent-1.request.",
            "proxy.agent-1.request.v1.ingress_rule.delete",
            &valid_payload(),
        );
        assert_eq!(decision, IngestDecision::Ack);

        store
            .with_rw(|conn| {
                assert!(messages::message_exists(conn, "v1.ingress_rule.delete", "r1")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn duplicate_delivery_is_ack_and_drop_without_a_second_row() {
        let (store, _f) = open_store();
        ingest_one(
            &store,
            "proxy.agent-1.request.",
            "proxy.agent-1.request.v1.ingress_rule.delete",
            &valid_payload(),
        );
        let decision = ingest_one(
            &store,
            "proxy.agent-1.request.",
            "proxy.agent-1.request.v1.ingress_rule.delete",
            &valid_payload(),
        );
        assert_eq!(decision, IngestDecision::Ack);

        store
            .with_rw(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
                assert_eq!(count, 1);
                Ok(())
            })
            .unwrap();
    }
}
