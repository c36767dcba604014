use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Maximum radius of a space in meters.
pub const MAX_SPACE_RADIUS_M: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    /// Verified id handed over by the identity provider.
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A geographic point. Longitude first, like GeoJSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    pub fn in_bounds(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// A geo-anchored discussion container with a subscriber list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: Uuid,
    pub name: String,
    pub theme_color: String,
    /// Meters, 0..=100.
    pub radius: f64,
    pub location: Location,
    pub admin_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSpace {
    pub name: String,
    pub theme_color: String,
    pub radius: f64,
    pub location: Location,
    pub admin_id: Uuid,
}

impl NewSpace {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("space name must not be empty");
        }
        if !(0.0..=MAX_SPACE_RADIUS_M).contains(&self.radius) {
            return Err("space radius must be between 0 and 100 meters");
        }
        if !self.location.in_bounds() {
            return Err("location out of bounds");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceWithDistance {
    #[serde(flatten)]
    pub space: Space,
    /// Great-circle distance from the query center, in meters.
    pub distance: f64,
}

/// A thread is rooted either at a space (top-level, started by its first
/// message) or at a message inside another thread (nested). Exactly one of
/// the two; the enum makes the invariant unrepresentable to break.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadRole {
    TopLevel { first_message_id: Uuid },
    Nested { parent_message_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub space_id: Uuid,
    pub role: ThreadRole,
    /// Aggregate like count across the thread's messages; doubles as the
    /// thread's popularity score.
    pub likes: i64,
    pub messages_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn first_message_id(&self) -> Option<Uuid> {
        match self.role {
            ThreadRole::TopLevel { first_message_id } => Some(first_message_id),
            ThreadRole::Nested { .. } => None,
        }
    }

    pub fn parent_message_id(&self) -> Option<Uuid> {
        match self.role {
            ThreadRole::Nested { parent_message_id } => Some(parent_message_id),
            ThreadRole::TopLevel { .. } => None,
        }
    }
}

/// A top-level thread as returned by the space thread listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopLevelThread {
    #[serde(flatten)]
    pub thread: Thread,
    pub first_message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub likes: i64,
    /// Set at most once, when a nested thread is attached to this message.
    pub child_thread_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
}

/// Input for the message that starts a top-level thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFirstMessage {
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
}

/// A message as returned by the thread message listings, carrying the
/// message count of its child thread when one is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(flatten)]
    pub message: Message,
    pub child_thread_messages_count: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sorting {
    #[default]
    Recent,
    Popularity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    /// Destructive operations (full keyspace wipe) are only permitted here.
    pub fn is_dev_or_test(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_validation_bounds() {
        let mut space = NewSpace {
            name: "corner cafe".into(),
            theme_color: "#10b981".into(),
            radius: 70.0,
            location: Location {
                longitude: 13.405,
                latitude: 52.52,
            },
            admin_id: Uuid::new_v4(),
        };
        assert!(space.validate().is_ok());

        space.radius = 100.5;
        assert!(space.validate().is_err());

        space.radius = 70.0;
        space.location.latitude = 91.0;
        assert!(space.validate().is_err());
    }

    #[test]
    fn thread_role_is_exclusive() {
        let first = Uuid::new_v4();
        let thread = Thread {
            id: Uuid::new_v4(),
            space_id: Uuid::new_v4(),
            role: ThreadRole::TopLevel {
                first_message_id: first,
            },
            likes: 0,
            messages_count: 1,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(thread.first_message_id(), Some(first));
        assert_eq!(thread.parent_message_id(), None);
    }
}
