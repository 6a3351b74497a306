//! Thin wrappers around crate-private pipeline stages, exposed so the
//! crate's own `tests/` integration binaries can drive one processor batch
//! or one reply batch without standing up a live NATS broker.
//!
//! Not part of the public API surface an embedder would depend on; kept
//! unconditionally compiled (rather than behind `#[cfg(test)]`) because
//! integration test binaries build against this crate without its own
//! `cfg(test)` in scope.

use crate::bus::{BusError, Publisher};
use crate::processor;
use crate::reply;
use crate::store::{Store, StoreError};

/// Run exactly one processor batch (up to the processor's own batch limit).
/// Returns the number of messages processed.
pub fn process_once_for_tests(store: &Store) -> Result<usize, StoreError> {
    processor::process_batch_once(store)
}

/// Run exactly one reply batch against `publisher`. Returns the number of
/// messages published and marked replied.
pub async fn reply_once_for_tests(
    store: &Store,
    agent_id: &str,
    publisher: &dyn Publisher,
) -> Result<usize, BusError> {
    reply::reply_batch_once(store, agent_id, publisher).await
}
