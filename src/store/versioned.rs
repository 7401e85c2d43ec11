//! Retry and optimistic read-modify-write on top of a [`DocumentStore`].
//!
//! Reads are retried on transient failures with exponential backoff. Writes
//! are never repeated blindly: a conditional write that loses a race is
//! redone from a fresh read, and a remote failure on a write is returned as is.

use std::{future::Future, time::Duration};

use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{to_fields, Document, DocumentStore, Precondition, Query, StoreError, Stored};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub read_attempts: u32,
    pub read_base_delay: Duration,
    pub write_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            read_base_delay: Duration::from_millis(50),
            write_attempts: 8,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.read_base_delay.saturating_mul(1 << attempt.saturating_sub(1).min(10));
        let jitter_ms = self.read_base_delay.as_millis() as u64 / 2;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

/// Run an idempotent read, retrying transient failures.
pub async fn with_read_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut read: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = policy.read_attempts.max(1);
    let mut attempt = 1;
    loop {
        match read().await {
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay(attempt);
                warn!(op, attempt, error = %e, delay_ms = delay.as_millis() as u64, "read failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

pub async fn get(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    collection: &str,
    id: &str,
) -> Result<Document, StoreError> {
    with_read_retry(policy, "get_document", || store.get_document(collection, id)).await
}

pub async fn query(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    collection: &str,
    query: &Query,
) -> Result<Vec<Document>, StoreError> {
    with_read_retry(policy, "query_documents", || store.query_documents(collection, query)).await
}

/// What a mutation decided to do with the record it was handed.
#[derive(Debug)]
pub enum Change<R> {
    /// Persist the mutated record.
    Write(R),
    /// Leave the stored record untouched.
    Keep(R),
}

/// Load a record, apply `mutate` and write it back guarded by the version
/// that was read. Lost races are retried from a fresh read up to
/// `policy.write_attempts` times; the last conflict is returned after that.
///
/// `mutate` may run several times and must derive its result from the record
/// it is given only.
pub async fn update_versioned<T, R, F>(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    collection: &str,
    id: &str,
    mut mutate: F,
) -> Result<(Stored<T>, R), StoreError>
where
    T: Serialize + DeserializeOwned + Send,
    R: Send,
    F: FnMut(&mut T) -> Change<R> + Send,
{
    let attempts = policy.write_attempts.max(1);
    let mut attempt = 1;
    loop {
        let doc = get(store, policy, collection, id).await?;
        let mut stored: Stored<T> = doc.decode(collection)?;

        let outcome = match mutate(&mut stored.record) {
            Change::Keep(r) => return Ok((stored, r)),
            Change::Write(r) => r,
        };

        let fields = to_fields(&stored.record)?;
        match store
            .update_document(collection, id, fields, Precondition::Version(stored.version))
            .await
        {
            Ok(version) => {
                stored.version = version;
                return Ok((stored, outcome));
            }
            Err(e @ StoreError::VersionConflict { .. }) if attempt < attempts => {
                debug!(collection, id, attempt, error = %e, "lost write race; re-reading");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
