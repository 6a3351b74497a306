//! JetStream connection, durable subscription, and publishing.
//!
//! A typed error enum, an explicit `connect` step, and methods that surface
//! protocol errors rather than panicking.

use async_nats::jetstream::{self, consumer::PullConsumer, Context};
use async_trait::async_trait;
use std::time::Duration;

/// Capacity of the bounded in-memory queue the subscriber feeds.
pub const INBOUND_QUEUE_CAPACITY: usize = 1000;

/// Ack-wait for the durable consumer.
pub const ACK_WAIT: Duration = Duration::from_secs(60);

/// Retry interval when the broker is unreachable at subscribe time.
pub const SUBSCRIBE_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Retry interval for the reply publisher's connection reset.
pub const PUBLISHER_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum BusError {
    Connect(String),
    Stream(String),
    Consumer(String),
    Publish(String),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Connect(s) => write!(f, "connect error: {s}"),
            BusError::Stream(s) => write!(f, "stream error: {s}"),
            BusError::Consumer(s) => write!(f, "consumer error: {s}"),
            BusError::Publish(s) => write!(f, "publish error: {s}"),
        }
    }
}

impl std::error::Error for BusError {}

/// Subject this agent's durable consumer is bound to: `proxy.<agent_id>.request.>`.
pub fn request_subject_filter(agent_id: &str) -> String {
    format!("proxy.{agent_id}.request.>")
}

/// Subject prefix stripped from an inbound message to obtain its `event`.
pub fn request_subject_prefix(agent_id: &str) -> String {
    format!("proxy.{agent_id}.request.")
}

/// Outbound reply subject for a given event.
pub fn reply_subject(agent_id: &str, event: &str) -> String {
    format!("proxy.{agent_id}.reply.{event}")
}

/// Durable consumer name: `proxy-<agent_id>`.
pub fn durable_consumer_name(agent_id: &str) -> String {
    format!("proxy-{agent_id}")
}

/// A connected JetStream client bound to one agent's request/reply subjects.
pub struct NatsBus {
    client_name: String,
    context: Context,
}

impl NatsBus {
    /// Connect with the agent's identity as client name and infinite
    /// reconnect: agent identity as client name, infinite reconnect.
    pub async fn connect(connect_url: &str, agent_id: &str) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .name(agent_id.to_owned())
            .retry_on_initial_connect()
            .max_reconnects(None)
            .connect(connect_url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let context = jetstream::new(client);
        Ok(NatsBus {
            client_name: agent_id.to_owned(),
            context,
        })
    }

    /// Create (or bind to an existing) durable pull consumer on the stream
    /// that owns `proxy.<agent_id>.request.>`. The broker/stream
    /// administration itself is an external collaborator; this
    /// agent only manages its own durable consumer.
    pub async fn durable_request_consumer(
        &self,
        agent_id: &str,
    ) -> Result<PullConsumer, BusError> {
        let filter = request_subject_filter(agent_id);
        let stream = self
            .context
            .get_stream_by_subject(&filter)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &durable_consumer_name(agent_id),
                jetstream::consumer::pull::Config {
                    durable_name: Some(durable_consumer_name(agent_id)),
                    filter_subject: filter,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    deliver_policy: jetstream::consumer::DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;

        Ok(consumer)
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }
}

#[async_trait]
impl Publisher for NatsBus {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<(), BusError> {
        self.context
            .publish(subject, payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Publish-only seam used by the Reply Publisher, so the publish loop can be
/// exercised against a fake in tests without a live broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Test-only `Publisher` impl, kept out of `#[cfg(test)]` so the crate's own
/// `tests/` integration binaries (compiled without this crate's `cfg(test)`)
/// can use it too.
pub mod fake {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every published (subject, payload) pair; never fails.
    #[derive(Default)]
    pub struct FakePublisher {
        pub published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<(), BusError> {
            self.published.lock().await.push((subject, payload));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_helpers_format_expected_wire_strings() {
        assert_eq!(
            request_subject_filter("agent-1"),
            "proxy.agent-1.request.>"
        );
        assert_eq!(
            request_subject_prefix("agent-1"),
            "proxy.agent-1.request."
        );
        assert_eq!(
            reply_subject("agent-1", "v1.tls_certificate.upsert"),
            "proxy.agent-1.reply.v1.tls_certificate.upsert"
        );
        assert_eq!(durable_consumer_name("agent-1"), "proxy-agent-1");
    }
}
