//! Stream Subscriber: maintains the durable JetStream pull consumer and
//! feeds delivered messages into a bounded channel for the Ingest Worker.

use crate::bus::{self, NatsBus};
use async_nats::jetstream::Message;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the subscriber until `token` is cancelled. Retries connect/subscribe
/// failures every [`bus::SUBSCRIBE_RETRY_INTERVAL`] indefinitely.
pub async fn run(
    connect_url: String,
    agent_id: String,
    tx: mpsc::Sender<Message>,
    token: CancellationToken,
) {
    loop {
        if token.is_cancelled() {
            return;
        }

        match connect_and_consume(&connect_url, &agent_id, &tx, &token).await {
            Ok(()) => return, // shutdown requested mid-stream
            Err(e) => {
                warn!(error = %e, "subscriber connect/subscribe failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(bus::SUBSCRIBE_RETRY_INTERVAL) => {}
                    _ = token.cancelled() => return,
                }
            }
        }
    }
}

async fn connect_and_consume(
    connect_url: &str,
    agent_id: &str,
    tx: &mpsc::Sender<Message>,
    token: &CancellationToken,
) -> Result<(), bus::BusError> {
    let nats = NatsBus::connect(connect_url, agent_id).await?;
    let consumer = nats.durable_request_consumer(agent_id).await?;
    info!(agent_id, client_name = nats.client_name(), "subscriber connected");

    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| bus::BusError::Consumer(e.to_string()))?;

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            next = messages.next() => {
                match next {
                    Some(Ok(message)) => {
                        if tx.send(message).await.is_err() {
                            // Ingest worker has shut down; nothing more to do.
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => {
                        // Transport-level hiccup. The durable consumer state
                        // lives on the broker, so no resubscribe is needed;
                        // just keep pulling.
                        error!(error = %e, "error pulling next message, continuing");
                    }
                    None => {
                        warn!("consumer message stream ended, reconnecting");
                        return Err(bus::BusError::Consumer("message stream ended".to_owned()));
                    }
                }
            }
        }
    }
}
