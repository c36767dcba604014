use chrono::Utc;
use plaza_types::{Message, NewMessage, Thread, ThreadRole};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{Repository, keys, millis};

impl Repository {
    pub fn get_message(&self, message_id: Uuid) -> Result<Message> {
        self.store()
            .get_record(&keys::message(message_id))?
            .ok_or(StoreError::NotFound)
    }

    /// Append a message to a thread: the record, both of the thread's
    /// message indices, and the thread's message counter, atomically.
    pub fn set_message(&self, new_message: NewMessage) -> Result<Message> {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            thread_id: new_message.thread_id,
            sender_id: new_message.sender_id,
            content: new_message.content,
            kind: new_message.kind,
            likes: 0,
            child_thread_id: None,
            created_at: now,
        };
        let score = millis(now);
        let member = message.id.to_string();
        let thread_key = keys::thread(message.thread_id);

        self.store().transact(|tx| {
            let thread: Thread = tx.get_record(&thread_key)?.ok_or(StoreError::NotFound)?;
            tx.put_record(&keys::message(message.id), &message)?;
            tx.put_record(
                &thread_key,
                &Thread {
                    messages_count: thread.messages_count + 1,
                    ..thread
                },
            )?;
            tx.sorted_insert(
                &keys::thread_messages_by_time(message.thread_id),
                &member,
                score,
                score,
            );
            tx.sorted_insert(
                &keys::thread_messages_by_popularity(message.thread_id),
                &member,
                0,
                score,
            );
            Ok(())
        })?;

        Ok(message)
    }

    /// Increment a message's like count and re-score it everywhere that
    /// orders by popularity: the thread's message index, the thread's
    /// aggregate like counter, and (for top-level threads) the space's
    /// thread popularity index. One transaction, safe under concurrent
    /// likes of the same message.
    pub fn like_message(&self, message_id: Uuid) -> Result<(Message, Thread)> {
        let message_key = keys::message(message_id);

        self.store().transact(|tx| {
            let message: Message = tx.get_record(&message_key)?.ok_or(StoreError::NotFound)?;
            let thread_key = keys::thread(message.thread_id);
            let thread: Thread = tx.get_record(&thread_key)?.ok_or(StoreError::NotFound)?;

            let liked = Message {
                likes: message.likes + 1,
                ..message
            };
            let rescored = Thread {
                likes: thread.likes + 1,
                ..thread
            };

            tx.put_record(&message_key, &liked)?;
            tx.put_record(&thread_key, &rescored)?;
            tx.sorted_insert(
                &keys::thread_messages_by_popularity(liked.thread_id),
                &liked.id.to_string(),
                liked.likes,
                millis(liked.created_at),
            );
            if matches!(rescored.role, ThreadRole::TopLevel { .. }) {
                tx.sorted_insert(
                    &keys::space_toplevel_threads_by_popularity(rescored.space_id),
                    &rescored.id.to_string(),
                    rescored.likes,
                    millis(rescored.created_at),
                );
            }
            Ok((liked, rescored))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_types::{Environment, Location, MessageKind, NewFirstMessage, NewSpace, NewUser};

    fn setup() -> (Repository, Uuid, Uuid) {
        let repo = Repository::new(Environment::Test);
        let sender = Uuid::new_v4();
        repo.set_user(NewUser {
            id: sender,
            username: "nia".into(),
            avatar_url: None,
        })
        .unwrap();
        let space = repo
            .set_space(NewSpace {
                name: "dock".into(),
                theme_color: "#ef4444".into(),
                radius: 30.0,
                location: Location {
                    longitude: -0.1276,
                    latitude: 51.5072,
                },
                admin_id: sender,
            })
            .unwrap();
        (repo, space.id, sender)
    }

    #[test]
    fn set_message_bumps_thread_counter() {
        let (repo, space_id, sender) = setup();
        let (thread, _) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "root".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();

        repo.set_message(NewMessage {
            thread_id: thread.id,
            sender_id: sender,
            content: "reply".into(),
            kind: MessageKind::Text,
        })
        .unwrap();

        assert_eq!(repo.get_thread(thread.id).unwrap().messages_count, 2);
        assert_eq!(
            repo.get_thread_messages_by_time(thread.id, 0, 10)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn set_message_into_unknown_thread_is_not_found() {
        let (repo, _, sender) = setup();
        let err = repo.set_message(NewMessage {
            thread_id: Uuid::new_v4(),
            sender_id: sender,
            content: "lost".into(),
            kind: MessageKind::Text,
        });
        assert!(matches!(err, Err(StoreError::NotFound)));
    }

    #[test]
    fn concurrent_likes_lose_no_updates_and_rerank() {
        let (repo, space_id, sender) = setup();
        let (quiet, _) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "quiet".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(3));
        let (loud, loud_first) = repo
            .set_toplevel_thread(
                space_id,
                NewFirstMessage {
                    sender_id: sender,
                    content: "loud".into(),
                    kind: MessageKind::Text,
                },
            )
            .unwrap();

        // with 8 concurrent likers, every transaction commits within the
        // retry bound: each retry implies another liker's commit
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let id = loud_first.id;
                std::thread::spawn(move || repo.like_message(id).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(repo.get_message(loud_first.id).unwrap().likes, 8);
        assert_eq!(repo.get_thread(loud.id).unwrap().likes, 8);

        let by_pop = repo
            .get_space_toplevel_threads_by_popularity(space_id, 0, 10)
            .unwrap();
        assert_eq!(by_pop[0].thread.id, loud.id);
        assert_eq!(by_pop[0].thread.likes, 8);
        assert_eq!(by_pop[1].thread.id, quiet.id);

        let messages = repo
            .get_thread_messages_by_popularity(loud.id, 0, 1)
            .unwrap();
        assert_eq!(messages[0].message.id, loud_first.id);
        assert_eq!(messages[0].message.likes, 8);
    }

    #[test]
    fn liking_a_missing_message_is_not_found() {
        let (repo, _, _) = setup();
        assert!(matches!(
            repo.like_message(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }
}
