use chrono::{DateTime, Utc};
use plaza_types::{Message, NewFirstMessage, Space, Thread, ThreadMessage, ThreadRole};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{Repository, keys, millis};

impl Repository {
    pub fn get_thread(&self, thread_id: Uuid) -> Result<Thread> {
        self.store()
            .get_record(&keys::thread(thread_id))?
            .ok_or(StoreError::NotFound)
    }

    /// Create a top-level thread: the first message, the thread referencing
    /// it, and the space's two thread indices, all in one transaction.
    pub fn set_toplevel_thread(
        &self,
        space_id: Uuid,
        first_message: NewFirstMessage,
    ) -> Result<(Thread, Message)> {
        let now = Utc::now();
        let thread_id = Uuid::new_v4();
        let message = Message {
            id: Uuid::new_v4(),
            thread_id,
            sender_id: first_message.sender_id,
            content: first_message.content,
            kind: first_message.kind,
            likes: 0,
            child_thread_id: None,
            created_at: now,
        };
        let thread = Thread {
            id: thread_id,
            space_id,
            role: ThreadRole::TopLevel {
                first_message_id: message.id,
            },
            likes: 0,
            messages_count: 1,
            created_at: now,
        };

        let score = millis(now);
        let thread_member = thread.id.to_string();
        let message_member = message.id.to_string();

        self.store().transact(|tx| {
            if tx.get_record::<Space>(&keys::space(space_id))?.is_none() {
                return Err(StoreError::NotFound);
            }
            tx.put_record(&keys::message(message.id), &message)?;
            tx.put_record(&keys::thread(thread.id), &thread)?;
            tx.sorted_insert(
                &keys::space_toplevel_threads_by_time(space_id),
                &thread_member,
                score,
                score,
            );
            tx.sorted_insert(
                &keys::space_toplevel_threads_by_popularity(space_id),
                &thread_member,
                0,
                score,
            );
            tx.sorted_insert(
                &keys::thread_messages_by_time(thread.id),
                &message_member,
                score,
                score,
            );
            tx.sorted_insert(
                &keys::thread_messages_by_popularity(thread.id),
                &message_member,
                0,
                score,
            );
            Ok(())
        })?;

        Ok((thread, message))
    }

    /// Create a nested thread under a message and link it as the message's
    /// child thread in the same transaction. The parent message must live in
    /// a thread of the given space (`NotFound` otherwise). A message can have
    /// at most one child thread; a second attach fails with `Conflict` and
    /// leaves the original link untouched.
    pub fn set_thread(
        &self,
        space_id: Uuid,
        parent_message_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<Thread> {
        let thread = Thread {
            id: Uuid::new_v4(),
            space_id,
            role: ThreadRole::Nested { parent_message_id },
            likes: 0,
            messages_count: 0,
            created_at,
        };
        let parent_key = keys::message(parent_message_id);

        self.store().transact(|tx| {
            let parent: Message = tx.get_record(&parent_key)?.ok_or(StoreError::NotFound)?;
            let parent_thread: Thread = tx
                .get_record(&keys::thread(parent.thread_id))?
                .ok_or(StoreError::NotFound)?;
            if parent_thread.space_id != space_id {
                return Err(StoreError::NotFound);
            }
            if parent.child_thread_id.is_some() {
                return Err(StoreError::Conflict("parent message already has a child thread"));
            }
            let linked = Message {
                child_thread_id: Some(thread.id),
                ..parent
            };
            tx.put_record(&keys::thread(thread.id), &thread)?;
            tx.put_record(&parent_key, &linked)?;
            Ok(())
        })?;

        Ok(thread)
    }

    pub fn get_thread_messages_by_time(
        &self,
        thread_id: Uuid,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ThreadMessage>> {
        self.load_thread_messages(&keys::thread_messages_by_time(thread_id), offset, count)
    }

    pub fn get_thread_messages_by_popularity(
        &self,
        thread_id: Uuid,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ThreadMessage>> {
        self.load_thread_messages(&keys::thread_messages_by_popularity(thread_id), offset, count)
    }

    pub fn has_thread_message(&self, thread_id: Uuid, message_id: Uuid) -> Result<bool> {
        self.store().sorted_contains(
            &keys::thread_messages_by_time(thread_id),
            &message_id.to_string(),
        )
    }

    fn load_thread_messages(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<ThreadMessage>> {
        let mut messages = Vec::new();
        for (member, _) in self.store().sorted_range_desc(key, offset, count)? {
            let Ok(message_id) = Uuid::parse_str(&member) else {
                continue;
            };
            let Some(message) = self
                .store()
                .get_record::<Message>(&keys::message(message_id))?
            else {
                warn!(%message_id, "message index points at a missing message record");
                continue;
            };
            let child_thread_messages_count = match message.child_thread_id {
                Some(child_id) => self
                    .store()
                    .get_record::<Thread>(&keys::thread(child_id))?
                    .map(|t| t.messages_count),
                None => None,
            };
            messages.push(ThreadMessage {
                message,
                child_thread_messages_count,
            });
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_types::{Environment, Location, MessageKind, NewMessage, NewSpace, NewUser};

    fn setup() -> (Repository, Uuid, Uuid) {
        let repo = Repository::new(Environment::Test);
        let admin = Uuid::new_v4();
        repo.set_user(NewUser {
            id: admin,
            username: "admin".into(),
            avatar_url: None,
        })
        .unwrap();
        let space = repo
            .set_space(NewSpace {
                name: "yard".into(),
                theme_color: "#f59e0b".into(),
                radius: 50.0,
                location: Location {
                    longitude: 2.3522,
                    latitude: 48.8566,
                },
                admin_id: admin,
            })
            .unwrap();
        (repo, space.id, admin)
    }

    #[test]
    fn toplevel_thread_creates_message_and_indices() {
        let (repo, space_id, sender) = setup();
        let (thread, message) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "hello yard".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();

        assert_eq!(thread.first_message_id(), Some(message.id));
        assert_eq!(message.thread_id, thread.id);
        assert_eq!(thread.messages_count, 1);
        assert!(repo.has_space_thread(space_id, thread.id).unwrap());
        assert!(repo.has_thread_message(thread.id, message.id).unwrap());
    }

    #[test]
    fn toplevel_thread_in_unknown_space_is_not_found() {
        let (repo, _, sender) = setup();
        let err = repo.set_toplevel_thread(
            Uuid::new_v4(),
            NewFirstMessage {
                sender_id: sender,
                content: "into the void".into(),
                kind: MessageKind::Text,
            },
        );
        assert!(matches!(err, Err(StoreError::NotFound)));
    }

    #[test]
    fn nested_thread_stays_in_the_parent_message_space() {
        let (repo, space_id, sender) = setup();
        let other_space = repo
            .set_space(NewSpace {
                name: "annex".into(),
                theme_color: "#8b5cf6".into(),
                radius: 40.0,
                location: Location {
                    longitude: 2.2945,
                    latitude: 48.8584,
                },
                admin_id: sender,
            })
            .unwrap();
        let (_, message) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "root".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();

        // attaching through a different space must not create or link anything
        let err = repo.set_thread(other_space.id, message.id, Utc::now());
        assert!(matches!(err, Err(StoreError::NotFound)));
        assert_eq!(repo.get_message(message.id).unwrap().child_thread_id, None);

        let child = repo.set_thread(space_id, message.id, Utc::now()).unwrap();
        assert_eq!(child.space_id, space_id);
    }

    #[test]
    fn second_child_thread_conflicts_and_preserves_first() {
        let (repo, space_id, sender) = setup();
        let (_, message) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "root".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();

        let child = repo.set_thread(space_id, message.id, Utc::now()).unwrap();
        assert_eq!(child.parent_message_id(), Some(message.id));

        let err = repo.set_thread(space_id, message.id, Utc::now());
        assert!(matches!(err, Err(StoreError::Conflict(_))));

        let reread = repo.get_message(message.id).unwrap();
        assert_eq!(reread.child_thread_id, Some(child.id));
    }

    #[test]
    fn thread_messages_report_child_counts() {
        let (repo, space_id, sender) = setup();
        let (thread, first) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "root".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();

        let child = repo.set_thread(space_id, first.id, Utc::now()).unwrap();
        repo.set_message(NewMessage {
            thread_id: child.id,
            sender_id: sender,
            content: "nested reply".into(),
            kind: MessageKind::Text,
        })
        .unwrap();

        let listed = repo.get_thread_messages_by_time(thread.id, 0, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message.id, first.id);
        assert_eq!(listed[0].child_thread_messages_count, Some(1));
    }
}
