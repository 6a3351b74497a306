//! Reply Publisher: publishes processed-but-unreplied messages to their
//! reply subject and marks them replied.

use crate::bus::{self, Publisher};
use crate::events::ResponsePayloadV1;
use crate::store::{messages, Store};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const BATCH_LIMIT: i64 = 200;
const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// Run the reply loop until `token` is cancelled. `publisher` is already
/// connected; connection-level reconnects are the caller's responsibility
/// (mirrors the subscriber's own retry loop).
pub async fn run(store: &Store, agent_id: &str, publisher: &dyn Publisher, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            return;
        }

        match reply_batch_once(store, agent_id, publisher).await {
            Ok(0) => {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = token.cancelled() => return,
                }
            }
            Ok(n) => info!(count = n, "reply publisher flushed batch"),
            Err(e) => {
                warn!(error = %e, "reply batch failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(bus::PUBLISHER_RETRY_INTERVAL) => {}
                    _ = token.cancelled() => return,
                }
            }
        }
    }
}

pub(crate) async fn reply_batch_once(
    store: &Store,
    agent_id: &str,
    publisher: &dyn Publisher,
) -> Result<usize, bus::BusError> {
    let batch = {
        let ro = store
            .read_only_connection()
            .map_err(|e| bus::BusError::Publish(e.to_string()))?;
        messages::fetch_unreplied_batch(&ro, BATCH_LIMIT)
            .map_err(|e| bus::BusError::Publish(e.to_string()))?
    };

    if batch.is_empty() {
        return Ok(0);
    }

    let mut published_ids = Vec::with_capacity(batch.len());
    for msg in &batch {
        let data: serde_json::Value =
            serde_json::from_str(&msg.response_payload).unwrap_or(serde_json::Value::Null);
        let envelope = ResponsePayloadV1 {
            request_id: msg.request_id.clone(),
            requested_at: msg.requested_at,
            success: msg.success,
            data,
            error_message: msg.error_message.clone(),
            processed_at: msg.processed_at.unwrap_or(msg.queued_at),
            queued_at: msg.queued_at,
        };

        let payload = match serde_json::to_vec(&envelope) {
            Ok(p) => p,
            Err(e) => {
                warn!(request_id = %msg.request_id, error = %e, "failed to serialize reply envelope, retrying next iteration");
                continue;
            }
        };

        let subject = bus::reply_subject(agent_id, &msg.event);
        match publisher.publish(subject, payload).await {
            Ok(()) => published_ids.push(msg.id),
            Err(e) => {
                warn!(request_id = %msg.request_id, error = %e, "publish failed, retrying next iteration");
            }
        }
    }

    if !published_ids.is_empty() {
        store
            .with_rw(|conn| messages::mark_replied_batch(conn, &published_ids))
            .map_err(|e| bus::BusError::Publish(e.to_string()))?;
    }

    Ok(published_ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::fake::FakePublisher;
    use crate::store::messages::insert_message;
    use chrono::Utc;

    fn open_store() -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();
        (store, file)
    }

    #[tokio::test]
    async fn publishes_unreplied_message_and_marks_it_replied() {
        let (store, _f) = open_store();
        let now = Utc::now();
        let id = store
            .with_rw(|conn| {
                let id = insert_message(conn, "v1.ingress_rule.delete", "r1", "{}", now, now)?;
                let mut msgs = messages::fetch_unprocessed_batch(conn, 100)?;
                let mut msg = msgs.remove(0);
                msg.processed = true;
                msg.processed_at = Some(now);
                msg.success = true;
                msg.response_payload = "{\"ok\":true}".to_owned();
                messages::save_processed(conn, &msg)?;
                Ok(id)
            })
            .unwrap();

        let publisher = FakePublisher::default();
        let count = reply_batch_once(&store, "agent-1", &publisher).await.unwrap();
        assert_eq!(count, 1);

        let published = publisher.published.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "proxy.agent-1.reply.v1.ingress_rule.delete");

        store
            .with_rw(|conn| {
                assert!(messages::fetch_unreplied_batch(conn, 100)?.is_empty());
                Ok(())
            })
            .unwrap();

        let _ = id;
    }
}
