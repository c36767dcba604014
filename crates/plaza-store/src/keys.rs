//! Key schema: the deterministic mapping from entity identity to record and
//! index keys. Stateless; everything else in the engine goes through it.

use uuid::Uuid;

/// `users:{id}`: JSON record of the user.
pub fn user(id: Uuid) -> String {
    format!("users:{id}")
}

/// `users:{id}:spaces`: sorted set, space ids scored by joining time.
/// Mirror of [`space_subscribers`]; both sides are written in one
/// transaction.
pub fn user_spaces(id: Uuid) -> String {
    format!("users:{id}:spaces")
}

/// `space_coords`: sorted set at score 0 whose members are
/// `{geohash}:{space_id}`, queried by geohash prefix.
pub const SPACE_COORDS: &str = "space_coords";

/// `spaces:{id}`: JSON record of the space.
pub fn space(id: Uuid) -> String {
    format!("spaces:{id}")
}

/// `spaces:{id}:subscribers`: sorted set, user ids scored by joining time.
pub fn space_subscribers(id: Uuid) -> String {
    format!("spaces:{id}:subscribers")
}

/// `spaces:{id}:active_subscribers`: sorted set, user ids scored by the
/// start of their first live session. Always a subset of
/// [`space_subscribers`].
pub fn space_active_subscribers(id: Uuid) -> String {
    format!("spaces:{id}:active_subscribers")
}

/// `spaces:{id}:subscribers:{user}:sessions`: sorted set, session ids
/// scored by session start time.
pub fn space_subscriber_sessions(space_id: Uuid, user_id: Uuid) -> String {
    format!("spaces:{space_id}:subscribers:{user_id}:sessions")
}

/// `spaces:{id}:toplevel_threads_by_time`: sorted set, thread ids scored by
/// creation time.
pub fn space_toplevel_threads_by_time(id: Uuid) -> String {
    format!("spaces:{id}:toplevel_threads_by_time")
}

/// `spaces:{id}:toplevel_threads_by_popularity`: sorted set, thread ids
/// scored by aggregate like count, ties by creation time.
pub fn space_toplevel_threads_by_popularity(id: Uuid) -> String {
    format!("spaces:{id}:toplevel_threads_by_popularity")
}

/// `threads:{id}`: JSON record of the thread.
pub fn thread(id: Uuid) -> String {
    format!("threads:{id}")
}

/// `threads:{id}:messages_by_time`: sorted set, message ids scored by
/// creation time.
pub fn thread_messages_by_time(id: Uuid) -> String {
    format!("threads:{id}:messages_by_time")
}

/// `threads:{id}:messages_by_popularity`: sorted set, message ids scored by
/// like count, ties by creation time.
pub fn thread_messages_by_popularity(id: Uuid) -> String {
    format!("threads:{id}:messages_by_popularity")
}

/// `messages:{id}`: JSON record of the message.
pub fn message(id: Uuid) -> String {
    format!("messages:{id}")
}

/// Member of the [`SPACE_COORDS`] index.
pub fn geo_member(geohash: &str, space_id: Uuid) -> String {
    format!("{geohash}:{space_id}")
}
