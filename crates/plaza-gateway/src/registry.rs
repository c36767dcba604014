use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use plaza_types::Notification;

/// Default capacity of a session's outbound notification queue.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 16;

/// The delivery-loop side of a registered session: the queue receiver and
/// the cancellation token that closes the connection.
///
/// A session moves one way through three states: *Open* (registered, queue
/// active), *Closing* (token cancelled: slow consumer or disconnect), and
/// *Closed* (removed from the registry). Session ids are never reused.
pub struct Session {
    pub space_id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub notifications: mpsc::Receiver<Notification>,
    pub cancel: CancellationToken,
}

struct SessionHandle {
    user_id: Uuid,
    tx: mpsc::Sender<Notification>,
    cancel: CancellationToken,
}

/// In-memory table of live subscriber sessions per space. The only path by
/// which the publisher reaches live connections.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, SessionHandle>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a session id and register a bounded queue for it under the
    /// space.
    pub async fn add_session(&self, space_id: Uuid, user_id: Uuid, buffer: usize) -> Session {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();

        self.inner.write().await.entry(space_id).or_default().insert(
            session_id,
            SessionHandle {
                user_id,
                tx,
                cancel: cancel.clone(),
            },
        );

        debug!(%space_id, %user_id, %session_id, "session registered");
        Session {
            space_id,
            user_id,
            session_id,
            notifications: rx,
            cancel,
        }
    }

    /// Remove a session. Idempotent: self-cleanup on disconnect may race an
    /// explicit delete.
    pub async fn delete_session(&self, space_id: Uuid, session_id: Uuid) {
        let mut spaces = self.inner.write().await;
        if let Some(sessions) = spaces.get_mut(&space_id) {
            if sessions.remove(&session_id).is_some() {
                debug!(%space_id, %session_id, "session removed");
            }
            if sessions.is_empty() {
                spaces.remove(&space_id);
            }
        }
    }

    /// Fan a notification out to every live session of its space.
    ///
    /// Never blocks on a receiver: a session whose queue is full is a slow
    /// consumer: its token is cancelled (which makes its delivery loop tear
    /// the connection down) and the notification is dropped for that session
    /// only. Returns the number of sessions the notification was queued for.
    pub async fn publish(&self, notification: &Notification) -> usize {
        let space_id = notification.space_id();
        let spaces = self.inner.read().await;
        let Some(sessions) = spaces.get(&space_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (session_id, handle) in sessions {
            if handle.cancel.is_cancelled() {
                continue; // already closing
            }
            match handle.tx.try_send(notification.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        %space_id,
                        %session_id,
                        user_id = %handle.user_id,
                        "slow consumer: queue full, closing session"
                    );
                    handle.cancel.cancel();
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // delivery loop already gone; delete_session will follow
                }
            }
        }
        delivered
    }

    pub async fn session_count(&self, space_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .get(&space_id)
            .map_or(0, |sessions| sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn joined(space_id: Uuid) -> Notification {
        Notification::SubscriberJoined {
            space_id,
            user_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let registry = SessionRegistry::new();
        let space_id = Uuid::new_v4();
        let mut session = registry.add_session(space_id, Uuid::new_v4(), 8).await;

        let mut sent_users = Vec::new();
        for _ in 0..3 {
            let n = joined(space_id);
            if let Notification::SubscriberJoined { user_id, .. } = n {
                sent_users.push(user_id);
            }
            assert_eq!(registry.publish(&n).await, 1);
        }

        for expected in sent_users {
            match session.notifications.recv().await.unwrap() {
                Notification::SubscriberJoined { user_id, .. } => assert_eq!(user_id, expected),
                other => panic!("unexpected notification: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_without_stalling_others() {
        let registry = SessionRegistry::new();
        let space_id = Uuid::new_v4();

        let slow = registry.add_session(space_id, Uuid::new_v4(), 1).await;
        let mut healthy = registry.add_session(space_id, Uuid::new_v4(), 8).await;

        // fills the slow session's queue of 1
        assert_eq!(registry.publish(&joined(space_id)).await, 2);
        // overflows it: slow gets cancelled, healthy still receives
        assert_eq!(registry.publish(&joined(space_id)).await, 1);

        assert!(slow.cancel.is_cancelled());
        assert!(!healthy.cancel.is_cancelled());
        healthy.notifications.recv().await.unwrap();
        healthy.notifications.recv().await.unwrap();

        // a closing session is skipped on later publishes
        assert_eq!(registry.publish(&joined(space_id)).await, 1);
    }

    #[tokio::test]
    async fn publish_routes_per_space_only() {
        let registry = SessionRegistry::new();
        let (space_a, space_b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut in_a = registry.add_session(space_a, Uuid::new_v4(), 8).await;
        let mut in_b = registry.add_session(space_b, Uuid::new_v4(), 8).await;

        registry.publish(&joined(space_a)).await;

        in_a.notifications.recv().await.unwrap();
        assert!(in_b.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let registry = SessionRegistry::new();
        let space_id = Uuid::new_v4();
        let session = registry.add_session(space_id, Uuid::new_v4(), 8).await;
        assert_eq!(registry.session_count(space_id).await, 1);

        registry.delete_session(space_id, session.session_id).await;
        registry.delete_session(space_id, session.session_id).await;
        assert_eq!(registry.session_count(space_id).await, 0);

        // publishing into an empty space reaches nobody and does not block
        assert_eq!(registry.publish(&joined(space_id)).await, 0);
    }
}
