pub mod events;
pub mod models;

pub use events::Notification;
pub use models::{
    Environment, Location, Message, MessageKind, NewFirstMessage, NewMessage, NewSpace, NewUser,
    Sorting, Space, SpaceWithDistance, Thread, ThreadMessage, ThreadRole, TopLevelThread, User,
};
