use chrono::Utc;
use plaza_types::{NewUser, User};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{Repository, keys};

impl Repository {
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.store()
            .get_record(&keys::user(id))?
            .ok_or(StoreError::NotFound)
    }

    /// Upsert a user record. Re-registering an existing user updates the
    /// display fields but keeps the original creation time.
    pub fn set_user(&self, new_user: NewUser) -> Result<User> {
        let now = Utc::now();
        let key = keys::user(new_user.id);

        self.store().transact(|tx| {
            let existing: Option<User> = tx.get_record(&key)?;
            let user = User {
                id: new_user.id,
                username: new_user.username.clone(),
                avatar_url: new_user.avatar_url.clone(),
                created_at: existing.map_or(now, |u| u.created_at),
            };
            tx.put_record(&key, &user)?;
            Ok(user)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_types::Environment;

    fn repo() -> Repository {
        Repository::new(Environment::Test)
    }

    #[test]
    fn missing_user_is_not_found() {
        assert!(matches!(
            repo().get_user(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn reregistering_keeps_created_at() {
        let repo = repo();
        let id = Uuid::new_v4();
        let first = repo
            .set_user(NewUser {
                id,
                username: "mira".into(),
                avatar_url: None,
            })
            .unwrap();
        let second = repo
            .set_user(NewUser {
                id,
                username: "mira_v2".into(),
                avatar_url: Some("https://img.example/m.png".into()),
            })
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(repo.get_user(id).unwrap().username, "mira_v2");
    }
}
