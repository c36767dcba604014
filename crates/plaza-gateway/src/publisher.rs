use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use plaza_types::{Message, Notification, Thread, ThreadRole};

use crate::registry::SessionRegistry;

/// Turns domain writes into notifications and routes them to the live
/// sessions of the affected space. Fire-and-forget: delivery is best-effort
/// and never blocks the write path.
#[derive(Clone)]
pub struct Publisher {
    registry: SessionRegistry,
}

impl Publisher {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub async fn subscriber_joined(&self, space_id: Uuid, user_id: Uuid, joined_at: DateTime<Utc>) {
        self.send(Notification::SubscriberJoined {
            space_id,
            user_id,
            timestamp: joined_at,
        })
        .await;
    }

    pub async fn toplevel_thread_created(&self, actor_id: Uuid, thread: &Thread) {
        let ThreadRole::TopLevel { first_message_id } = thread.role else {
            warn!(thread_id = %thread.id, "nested thread passed to toplevel_thread_created");
            return;
        };
        self.send(Notification::ToplevelThreadCreated {
            space_id: thread.space_id,
            actor_id,
            thread_id: thread.id,
            first_message_id,
            timestamp: thread.created_at,
        })
        .await;
    }

    pub async fn thread_created(&self, actor_id: Uuid, thread: &Thread) {
        let ThreadRole::Nested { parent_message_id } = thread.role else {
            warn!(thread_id = %thread.id, "top-level thread passed to thread_created");
            return;
        };
        self.send(Notification::ThreadCreated {
            space_id: thread.space_id,
            actor_id,
            thread_id: thread.id,
            parent_message_id,
            timestamp: thread.created_at,
        })
        .await;
    }

    pub async fn message_created(&self, space_id: Uuid, message: &Message) {
        self.send(Notification::MessageCreated {
            space_id,
            actor_id: message.sender_id,
            thread_id: message.thread_id,
            message_id: message.id,
            timestamp: message.created_at,
        })
        .await;
    }

    pub async fn message_liked(&self, space_id: Uuid, actor_id: Uuid, message: &Message) {
        self.send(Notification::MessageLiked {
            space_id,
            actor_id,
            message_id: message.id,
            likes: message.likes,
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn send(&self, notification: Notification) {
        let delivered = self.registry.publish(&notification).await;
        debug!(
            space_id = %notification.space_id(),
            delivered,
            "notification fanned out"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_types::MessageKind;

    #[tokio::test]
    async fn maps_thread_writes_to_notification_kinds() {
        let registry = SessionRegistry::new();
        let publisher = Publisher::new(registry.clone());
        let space_id = Uuid::new_v4();
        let mut session = registry.add_session(space_id, Uuid::new_v4(), 8).await;

        let actor = Uuid::new_v4();
        let thread = Thread {
            id: Uuid::new_v4(),
            space_id,
            role: ThreadRole::TopLevel {
                first_message_id: Uuid::new_v4(),
            },
            likes: 0,
            messages_count: 1,
            created_at: Utc::now(),
        };
        publisher.toplevel_thread_created(actor, &thread).await;

        match session.notifications.recv().await.unwrap() {
            Notification::ToplevelThreadCreated {
                thread_id,
                actor_id,
                ..
            } => {
                assert_eq!(thread_id, thread.id);
                assert_eq!(actor_id, actor);
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        // a role mismatch publishes nothing
        publisher.thread_created(actor, &thread).await;
        assert!(session.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn like_notification_carries_new_count() {
        let registry = SessionRegistry::new();
        let publisher = Publisher::new(registry.clone());
        let space_id = Uuid::new_v4();
        let mut session = registry.add_session(space_id, Uuid::new_v4(), 8).await;

        let message = Message {
            id: Uuid::new_v4(),
            thread_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "nice".into(),
            kind: MessageKind::Text,
            likes: 3,
            child_thread_id: None,
            created_at: Utc::now(),
        };
        publisher
            .message_liked(space_id, Uuid::new_v4(), &message)
            .await;

        match session.notifications.recv().await.unwrap() {
            Notification::MessageLiked { likes, message_id, .. } => {
                assert_eq!(likes, 3);
                assert_eq!(message_id, message.id);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }
}
