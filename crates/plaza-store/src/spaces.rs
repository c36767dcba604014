use chrono::{DateTime, Utc};
use plaza_types::{Location, NewSpace, Space, SpaceWithDistance, TopLevelThread, User};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{Repository, geo, keys, millis};

impl Repository {
    pub fn get_space(&self, id: Uuid) -> Result<Space> {
        self.store()
            .get_record(&keys::space(id))?
            .ok_or(StoreError::NotFound)
    }

    /// Write a space record and add it to the geographic index. Admin
    /// existence is the caller's precondition.
    pub fn set_space(&self, new_space: NewSpace) -> Result<Space> {
        let space = Space {
            id: Uuid::new_v4(),
            name: new_space.name,
            theme_color: new_space.theme_color,
            radius: new_space.radius,
            location: new_space.location,
            admin_id: new_space.admin_id,
            created_at: Utc::now(),
        };
        let geohash = geo::encode(space.location, self.geo_precision());

        self.store().transact(|tx| {
            tx.put_record(&keys::space(space.id), &space)?;
            tx.sorted_insert(keys::SPACE_COORDS, &keys::geo_member(&geohash, space.id), 0, 0);
            Ok(())
        })?;

        Ok(space)
    }

    /// Spaces within `radius_m` meters of `center`, ascending by distance.
    ///
    /// Candidates come from a geohash-bucket expansion (center cell plus
    /// neighbors at a radius-appropriate precision); the exact great-circle
    /// distance then filters and orders them.
    pub fn get_spaces_by_location(
        &self,
        center: Location,
        radius_m: f64,
    ) -> Result<Vec<SpaceWithDistance>> {
        let mut found: Vec<SpaceWithDistance> = Vec::new();

        for cell in geo::cover(center, radius_m, self.geo_precision()) {
            for member in self.store().prefix_members(keys::SPACE_COORDS, &cell)? {
                let Some((_, id)) = member.rsplit_once(':') else {
                    continue;
                };
                let Ok(space_id) = Uuid::parse_str(id) else {
                    continue;
                };
                if found.iter().any(|s| s.space.id == space_id) {
                    continue;
                }
                let Some(space) = self.store().get_record::<Space>(&keys::space(space_id))? else {
                    warn!(%space_id, "geo index points at a missing space record");
                    continue;
                };
                let distance = geo::haversine_m(center, space.location);
                if distance <= radius_m {
                    found.push(SpaceWithDistance { space, distance });
                }
            }
        }

        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(found)
    }

    /// Subscribe a user to a space. Idempotent: a second call keeps the
    /// original joining time. The subscriber set is mirrored on the space
    /// and on the user; both sides are written in one transaction.
    pub fn set_space_subscriber(&self, space_id: Uuid, user_id: Uuid) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let subscribers_key = keys::space_subscribers(space_id);
        let user_spaces_key = keys::user_spaces(user_id);
        let member = user_id.to_string();

        self.store().transact(|tx| {
            if tx.get_record::<Space>(&keys::space(space_id))?.is_none() {
                return Err(StoreError::NotFound);
            }
            if let Some(joined_ms) = tx.sorted_score(&subscribers_key, &member)? {
                return Ok(DateTime::from_timestamp_millis(joined_ms).unwrap_or(now));
            }
            let score = millis(now);
            tx.sorted_insert(&subscribers_key, &member, score, score);
            tx.sorted_insert(&user_spaces_key, &space_id.to_string(), score, score);
            Ok(now)
        })
    }

    pub fn get_space_subscribers(&self, space_id: Uuid) -> Result<Vec<User>> {
        self.load_users(&keys::space_subscribers(space_id))
    }

    pub fn is_space_subscriber(&self, space_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.store()
            .sorted_contains(&keys::space_subscribers(space_id), &user_id.to_string())
    }

    pub fn get_space_active_subscribers(&self, space_id: Uuid) -> Result<Vec<User>> {
        self.load_users(&keys::space_active_subscribers(space_id))
    }

    /// Register a live session for a subscriber and mark the user active.
    /// The caller must already be a subscriber; a session never creates the
    /// subscription itself, so the active-subscriber index stays a subset of
    /// the subscriber index and subscriptions only ever enter through
    /// [`Repository::set_space_subscriber`]. The session id comes from the
    /// session registry, which allocates them.
    pub fn add_space_session(
        &self,
        space_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<DateTime<Utc>> {
        let started_at = Utc::now();
        let score = millis(started_at);

        let subscribers_key = keys::space_subscribers(space_id);
        let active_key = keys::space_active_subscribers(space_id);
        let sessions_key = keys::space_subscriber_sessions(space_id, user_id);
        let member = user_id.to_string();

        self.store().transact(|tx| {
            if tx.get_record::<Space>(&keys::space(space_id))?.is_none() {
                return Err(StoreError::NotFound);
            }
            if tx.sorted_score(&subscribers_key, &member)?.is_none() {
                return Err(StoreError::NotFound);
            }
            tx.sorted_insert(&sessions_key, &session_id.to_string(), score, score);
            if tx.sorted_score(&active_key, &member)?.is_none() {
                tx.sorted_insert(&active_key, &member, score, score);
            }
            Ok(())
        })?;

        Ok(started_at)
    }

    /// Drop a live session. When the user's last session goes, the user
    /// leaves the active-subscriber index, never the permanent subscriber
    /// index. Idempotent.
    pub fn delete_space_session(
        &self,
        space_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<()> {
        let active_key = keys::space_active_subscribers(space_id);
        let sessions_key = keys::space_subscriber_sessions(space_id, user_id);
        let session_member = session_id.to_string();

        self.store().transact(|tx| {
            let total = tx.sorted_len(&sessions_key)?;
            let holds_this = tx.sorted_contains(&sessions_key, &session_member)?;
            tx.sorted_remove(&sessions_key, &session_member);

            let remaining = total - usize::from(holds_this);
            if remaining == 0 {
                tx.sorted_remove(&active_key, &user_id.to_string());
            }
            Ok(())
        })
    }

    pub fn get_space_toplevel_threads_by_time(
        &self,
        space_id: Uuid,
        offset: usize,
        count: usize,
    ) -> Result<Vec<TopLevelThread>> {
        self.load_toplevel_threads(&keys::space_toplevel_threads_by_time(space_id), offset, count)
    }

    pub fn get_space_toplevel_threads_by_popularity(
        &self,
        space_id: Uuid,
        offset: usize,
        count: usize,
    ) -> Result<Vec<TopLevelThread>> {
        self.load_toplevel_threads(
            &keys::space_toplevel_threads_by_popularity(space_id),
            offset,
            count,
        )
    }

    pub fn has_space_thread(&self, space_id: Uuid, thread_id: Uuid) -> Result<bool> {
        self.store().sorted_contains(
            &keys::space_toplevel_threads_by_time(space_id),
            &thread_id.to_string(),
        )
    }

    fn load_users(&self, key: &str) -> Result<Vec<User>> {
        let mut users = Vec::new();
        for member in self.store().sorted_members(key)? {
            let Ok(user_id) = Uuid::parse_str(&member) else {
                continue;
            };
            if let Some(user) = self.store().get_record::<User>(&keys::user(user_id))? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn load_toplevel_threads(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<TopLevelThread>> {
        let mut threads = Vec::new();
        for (member, _) in self.store().sorted_range_desc(key, offset, count)? {
            let Ok(thread_id) = Uuid::parse_str(&member) else {
                continue;
            };
            match self.load_toplevel_thread(thread_id)? {
                Some(t) => threads.push(t),
                None => warn!(%thread_id, "thread index points at a missing or dangling thread"),
            }
        }
        Ok(threads)
    }

    fn load_toplevel_thread(&self, thread_id: Uuid) -> Result<Option<TopLevelThread>> {
        let Some(thread) = self
            .store()
            .get_record::<plaza_types::Thread>(&keys::thread(thread_id))?
        else {
            return Ok(None);
        };
        let Some(first_message_id) = thread.first_message_id() else {
            return Ok(None);
        };
        let Some(first_message) = self
            .store()
            .get_record::<plaza_types::Message>(&keys::message(first_message_id))?
        else {
            return Ok(None);
        };
        Ok(Some(TopLevelThread {
            thread,
            first_message,
        }))
    }
}
