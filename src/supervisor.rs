//! Wires the four long-running tasks together behind one cancellation token
//! and join barrier.

use crate::broadcast;
use crate::bus::NatsBus;
use crate::config::AgentConfig;
use crate::store::Store;
use async_nats::jetstream::Message as JetstreamMessage;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{ingest, processor, reply, subscriber};

/// Run all four tasks until `token` is cancelled, then wait for them to
/// unwind. Returns once every task has exited.
pub async fn run(config: AgentConfig, store: Store, token: CancellationToken) {
    let store = std::sync::Arc::new(store);
    let (broadcaster, _subscription) = broadcast::channel();
    let broadcaster = std::sync::Arc::new(broadcaster);

    let connect_url = config.nats.connect_url();
    let agent_id = config.agent_id.clone();

    let (tx, rx) = mpsc::channel::<JetstreamMessage>(crate::bus::INBOUND_QUEUE_CAPACITY);

    let mut tasks = JoinSet::new();

    {
        let connect_url = connect_url.clone();
        let agent_id = agent_id.clone();
        let token = token.clone();
        tasks.spawn(async move {
            subscriber::run(connect_url, agent_id, tx, token).await;
            "subscriber"
        });
    }

    {
        let store = store.clone();
        let agent_id = agent_id.clone();
        let token = token.clone();
        tasks.spawn(async move {
            ingest::run(&store, &agent_id, rx, token).await;
            "ingest"
        });
    }

    {
        let store = store.clone();
        let broadcaster = broadcaster.clone();
        let token = token.clone();
        tasks.spawn(async move {
            processor::run(&store, &broadcaster, token).await;
            "processor"
        });
    }

    {
        let store = store.clone();
        let agent_id = agent_id.clone();
        let token = token.clone();
        tasks.spawn(async move {
            run_reply_with_reconnect(store, agent_id, connect_url, token).await;
            "reply"
        });
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(name) => info!(task = name, "task exited"),
            Err(e) => tracing::error!(error = %e, "task panicked"),
        }
    }
}

/// The Reply Publisher owns its own broker connection: establishes one if
/// absent, and resets it on error rather than sharing the subscriber's.
async fn run_reply_with_reconnect(
    store: std::sync::Arc<Store>,
    agent_id: String,
    connect_url: String,
    token: CancellationToken,
) {
    loop {
        if token.is_cancelled() {
            return;
        }
        match NatsBus::connect(&connect_url, &agent_id).await {
            Ok(bus) => {
                reply::run(&store, &agent_id, &bus, token.clone()).await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reply publisher failed to connect, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(crate::bus::PUBLISHER_RETRY_INTERVAL) => {}
                    _ = token.cancelled() => return,
                }
            }
        }
    }
}
