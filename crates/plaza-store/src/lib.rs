//! Cache/index engine: authoritative storage for users, spaces,
//! subscriptions, threads and messages, plus the derived orderings (by time,
//! by popularity, by geography) that must stay consistent with them.
//!
//! All multi-key writes run as optimistic transactions with a bounded retry
//! loop; derived indices are only ever written inside those transactions.

pub mod engine;
pub mod error;
pub mod geo;
pub mod keys;

mod messages;
mod spaces;
mod threads;
mod users;

use plaza_types::Environment;

pub use engine::{Store, TX_MAX_ATTEMPTS};
pub use error::{Result, StoreError};

/// Default geohash precision of the geographic index buckets (~5 m cells).
pub const DEFAULT_GEO_PRECISION: usize = 9;

/// Handle to the cache/index engine. Cheap to clone; constructed once at
/// startup and passed to every component that needs it.
#[derive(Clone)]
pub struct Repository {
    store: Store,
    env: Environment,
    geo_precision: usize,
}

impl Repository {
    pub fn new(env: Environment) -> Self {
        Self::with_geo_precision(env, DEFAULT_GEO_PRECISION)
    }

    pub fn with_geo_precision(env: Environment, geo_precision: usize) -> Self {
        Self {
            store: Store::new(),
            env,
            geo_precision: geo_precision.clamp(1, geo::MAX_PRECISION),
        }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn geo_precision(&self) -> usize {
        self.geo_precision
    }

    /// Wipe the whole keyspace. Guarded: only development and test
    /// environments may do this.
    pub fn delete_all_keys(&self) -> Result<()> {
        if !self.env.is_dev_or_test() {
            return Err(StoreError::EnvRestricted);
        }
        self.store.flush_all();
        Ok(())
    }
}

pub(crate) fn millis(t: chrono::DateTime<chrono::Utc>) -> i64 {
    t.timestamp_millis()
}
