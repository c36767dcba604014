//! Notification fan-out engine: the session registry tracking live
//! subscriber connections per space, the publisher turning domain writes
//! into notifications, and the per-connection delivery loop.

pub mod connection;
pub mod publisher;
pub mod registry;

pub use publisher::Publisher;
pub use registry::{DEFAULT_NOTIFICATION_BUFFER, Session, SessionRegistry};
