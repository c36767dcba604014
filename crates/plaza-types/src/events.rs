use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events fanned out to live space subscribers over the WebSocket stream.
///
/// Payloads carry ids, not full entities, to keep frames small; clients
/// re-fetch what they need. Delivery is at-most-once, FIFO per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// A user subscribed to the space.
    SubscriberJoined {
        space_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A new top-level thread was started in the space.
    ToplevelThreadCreated {
        space_id: Uuid,
        actor_id: Uuid,
        thread_id: Uuid,
        first_message_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A nested thread was attached to a message.
    ThreadCreated {
        space_id: Uuid,
        actor_id: Uuid,
        thread_id: Uuid,
        parent_message_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A message was posted in a thread.
    MessageCreated {
        space_id: Uuid,
        actor_id: Uuid,
        thread_id: Uuid,
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A message was liked; `likes` is the count after the like.
    MessageLiked {
        space_id: Uuid,
        actor_id: Uuid,
        message_id: Uuid,
        likes: i64,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    /// The space whose subscribers this notification is routed to.
    pub fn space_id(&self) -> Uuid {
        match *self {
            Self::SubscriberJoined { space_id, .. }
            | Self::ToplevelThreadCreated { space_id, .. }
            | Self::ThreadCreated { space_id, .. }
            | Self::MessageCreated { space_id, .. }
            | Self::MessageLiked { space_id, .. } => space_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_kind_tagged() {
        let n = Notification::SubscriberJoined {
            space_id: Uuid::nil(),
            user_id: Uuid::nil(),
            timestamp: chrono::Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&n).unwrap();
        assert_eq!(json["kind"], "subscriber_joined");
        assert!(json["data"]["space_id"].is_string());
    }
}
