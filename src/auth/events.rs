//! Identity change notifications.
//!
//! Every registration, sign-in, token refresh and email verification is
//! published on a broadcast channel. Consumers subscribe with a callback and
//! stop receiving by dropping the returned [`Subscription`].

use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::warn;

use super::extractors::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Registered,
    SignedIn,
    Refreshed,
    EmailVerified,
}

#[derive(Debug, Clone)]
pub struct IdentityChange {
    pub identity: Identity,
    pub reason: ChangeReason,
}

#[derive(Clone)]
pub struct IdentityEvents {
    tx: broadcast::Sender<IdentityChange>,
}

impl Default for IdentityEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn publish(&self, identity: Identity, reason: ChangeReason) {
        // No subscribers is fine.
        let _ = self.tx.send(IdentityChange { identity, reason });
    }

    /// Invoke `callback` for every change published after this call.
    pub fn on_identity_change<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(IdentityChange) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => callback(change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "identity subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { task }
    }
}

/// Handle for a registered callback; delivery stops when it is dropped.
#[must_use = "dropping the subscription cancels it"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn ident(id: &str) -> Identity {
        Identity {
            id: id.into(),
            email_verified: false,
        }
    }

    #[tokio::test]
    async fn subscribers_see_changes_until_dropped() {
        let events = IdentityEvents::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = events.on_identity_change(move |c| {
            let _ = tx.send((c.identity.id, c.reason));
        });

        events.publish(ident("u1"), ChangeReason::Registered);
        events.publish(ident("u1"), ChangeReason::EmailVerified);
        assert_eq!(rx.recv().await, Some(("u1".to_string(), ChangeReason::Registered)));
        assert_eq!(rx.recv().await, Some(("u1".to_string(), ChangeReason::EmailVerified)));

        drop(sub);
        // The aborted task drops the callback and with it the sender.
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(closed, Ok(None));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        IdentityEvents::new().publish(ident("u1"), ChangeReason::SignedIn);
    }
}
