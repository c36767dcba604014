use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{Result, StoreError};

/// Retry bound for optimistic transactions. A transaction that loses the
/// commit race this many times fails with [`StoreError::TxExhausted`].
pub const TX_MAX_ATTEMPTS: u32 = 10;

/// In-process keyspace holding JSON records and sorted indices.
///
/// Two value kinds exist, matching what the key schema needs: a `Record`
/// (one JSON document per entity, keyed `{type}:{id}`) and a `Sorted` set
/// (entity-id members ordered by an integer score, a timestamp or a like
/// count, keyed `{owner}:{index}`).
///
/// Every key carries a version drawn from a global sequence; multi-key
/// writes go through [`Store::transact`], which re-runs its closure until
/// the versions of everything it read are unchanged at commit time.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Keyspace>>,
}

#[derive(Default)]
struct Keyspace {
    seq: u64,
    entries: HashMap<String, Entry>,
}

struct Entry {
    version: u64,
    value: Value,
}

enum Value {
    Record(serde_json::Value),
    Sorted(SortedSet),
}

/// Set of members ordered by `(score, tie, member)`.
///
/// Descending reads yield the by-time and by-popularity orderings: with
/// `score = likes` and `tie = created_at` millis, higher-scored members come
/// first and ties resolve to the most recently created.
#[derive(Clone, Default)]
pub struct SortedSet {
    by_member: HashMap<String, (i64, i64)>,
    ordered: BTreeSet<(i64, i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: String, score: i64, tie: i64) {
        if let Some((old_score, old_tie)) = self.by_member.insert(member.clone(), (score, tie)) {
            self.ordered.remove(&(old_score, old_tie, member.clone()));
        }
        self.ordered.insert((score, tie, member));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.by_member.remove(member) {
            Some((score, tie)) => {
                self.ordered.remove(&(score, tie, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn score(&self, member: &str) -> Option<i64> {
        self.by_member.get(member).map(|(score, _)| *score)
    }

    fn len(&self) -> usize {
        self.by_member.len()
    }

    fn range_desc(&self, offset: usize, count: usize) -> Vec<(String, i64)> {
        self.ordered
            .iter()
            .rev()
            .skip(offset)
            .take(count)
            .map(|(score, _, member)| (member.clone(), *score))
            .collect()
    }

    fn range_asc(&self, offset: usize, count: usize) -> Vec<(String, i64)> {
        self.ordered
            .iter()
            .skip(offset)
            .take(count)
            .map(|(score, _, member)| (member.clone(), *score))
            .collect()
    }

    /// Members starting with `prefix`. Only meaningful for sets whose
    /// members all sit at score 0 (the geo index), where `(0, 0, member)`
    /// ordering degenerates to plain lexical order.
    fn prefix_members(&self, prefix: &str) -> Vec<String> {
        self.ordered
            .range((0, 0, prefix.to_string())..)
            .take_while(|(score, tie, member)| {
                *score == 0 && *tie == 0 && member.starts_with(prefix)
            })
            .map(|(_, _, member)| member.clone())
            .collect()
    }
}

impl Keyspace {
    fn version(&self, key: &str) -> u64 {
        self.entries.get(key).map_or(0, |e| e.version)
    }

    fn record(&self, key: &str) -> Result<Option<&serde_json::Value>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Record(v),
                ..
            }) => Ok(Some(v)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn sorted(&self, key: &str) -> Result<Option<&SortedSet>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Sorted(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn apply(&mut self, op: Op) {
        self.seq += 1;
        let version = self.seq;
        match op {
            Op::PutRecord(key, value) => {
                self.entries.insert(
                    key,
                    Entry {
                        version,
                        value: Value::Record(value),
                    },
                );
            }
            Op::SortedInsert {
                key,
                member,
                score,
                tie,
            } => {
                let entry = self.entries.entry(key).or_insert_with(|| Entry {
                    version,
                    value: Value::Sorted(SortedSet::default()),
                });
                entry.version = version;
                if let Value::Sorted(set) = &mut entry.value {
                    set.insert(member, score, tie);
                }
            }
            Op::SortedRemove { key, member } => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    if let Value::Sorted(set) = &mut entry.value {
                        if set.remove(&member) {
                            entry.version = version;
                        }
                    }
                }
            }
        }
    }
}

enum Op {
    PutRecord(String, serde_json::Value),
    SortedInsert {
        key: String,
        member: String,
        score: i64,
        tie: i64,
    },
    SortedRemove {
        key: String,
        member: String,
    },
}

/// One attempt of an optimistic transaction.
///
/// Reads observe the pre-transaction state and are recorded in the watch
/// set; writes are queued and applied only if every watched key is
/// unchanged at commit. Like a Redis WATCH/MULTI block, a read issued after
/// a queued write still sees the old value.
pub struct Tx<'a> {
    ks: RwLockReadGuard<'a, Keyspace>,
    watched: HashMap<String, u64>,
    ops: Vec<Op>,
}

impl Tx<'_> {
    fn watch(&mut self, key: &str) {
        let version = self.ks.version(key);
        self.watched.entry(key.to_string()).or_insert(version);
    }

    pub fn get_record<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        self.watch(key);
        match self.ks.record(key)? {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    pub fn sorted_score(&mut self, key: &str, member: &str) -> Result<Option<i64>> {
        self.watch(key);
        Ok(self.ks.sorted(key)?.and_then(|s| s.score(member)))
    }

    pub fn sorted_contains(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(self.sorted_score(key, member)?.is_some())
    }

    pub fn sorted_len(&mut self, key: &str) -> Result<usize> {
        self.watch(key);
        Ok(self.ks.sorted(key)?.map_or(0, |s| s.len()))
    }

    pub fn put_record<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.ops
            .push(Op::PutRecord(key.to_string(), serde_json::to_value(value)?));
        Ok(())
    }

    pub fn sorted_insert(&mut self, key: &str, member: &str, score: i64, tie: i64) {
        self.ops.push(Op::SortedInsert {
            key: key.to_string(),
            member: member.to_string(),
            score,
            tie,
        });
    }

    pub fn sorted_remove(&mut self, key: &str, member: &str) {
        self.ops.push(Op::SortedRemove {
            key: key.to_string(),
            member: member.to_string(),
        });
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Keyspace> {
        // Writers never panic while holding the lock, so poison only means a
        // panicked reader; the data is intact either way.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` as an optimistic read-compute-commit transaction.
    ///
    /// The closure may be re-run up to [`TX_MAX_ATTEMPTS`] times, so it must
    /// be side-effect free apart from its reads and queued writes. Keys read
    /// through the [`Tx`] form the watch set; the queued writes commit only
    /// if none of them changed since the read.
    pub fn transact<T>(&self, f: impl Fn(&mut Tx) -> Result<T>) -> Result<T> {
        for attempt in 1..=TX_MAX_ATTEMPTS {
            let (watched, ops, out) = {
                let mut tx = Tx {
                    ks: self.read(),
                    watched: HashMap::new(),
                    ops: Vec::new(),
                };
                let out = f(&mut tx)?;
                (tx.watched, tx.ops, out)
            };

            let mut ks = self.write();
            if watched.iter().all(|(key, version)| ks.version(key) == *version) {
                for op in ops {
                    ks.apply(op);
                }
                return Ok(out);
            }
            trace!(attempt, "optimistic commit lost a race, retrying");
        }
        Err(StoreError::TxExhausted)
    }

    // -- Plain reads (single-key, no watch bookkeeping needed) --

    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read().record(key)? {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    pub fn sorted_range_desc(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, i64)>> {
        Ok(self
            .read()
            .sorted(key)?
            .map_or_else(Vec::new, |s| s.range_desc(offset, count)))
    }

    pub fn sorted_range_asc(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, i64)>> {
        Ok(self
            .read()
            .sorted(key)?
            .map_or_else(Vec::new, |s| s.range_asc(offset, count)))
    }

    pub fn sorted_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.sorted_range_asc(key, 0, usize::MAX)?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    pub fn sorted_score(&self, key: &str, member: &str) -> Result<Option<i64>> {
        Ok(self.read().sorted(key)?.and_then(|s| s.score(member)))
    }

    pub fn sorted_contains(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.sorted_score(key, member)?.is_some())
    }

    pub fn sorted_len(&self, key: &str) -> Result<usize> {
        Ok(self.read().sorted(key)?.map_or(0, |s| s.len()))
    }

    pub fn prefix_members(&self, key: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read()
            .sorted(key)?
            .map_or_else(Vec::new, |s| s.prefix_members(prefix)))
    }

    pub fn key_count(&self) -> usize {
        self.read().entries.len()
    }

    /// Drop every key. The environment gate lives in the repository layer.
    pub(crate) fn flush_all(&self) {
        let mut ks = self.write();
        ks.entries.clear();
        // seq keeps counting so stale watchers can never match a fresh key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        n: i64,
    }

    #[test]
    fn record_roundtrip_and_versioning() {
        let store = Store::new();
        assert_eq!(store.get_record::<Doc>("doc:a").unwrap(), None);

        store
            .transact(|tx| {
                tx.put_record("doc:a", &Doc { n: 1 })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get_record::<Doc>("doc:a").unwrap(), Some(Doc { n: 1 }));
    }

    #[test]
    fn sorted_desc_order_with_tie_break() {
        let store = Store::new();
        store
            .transact(|tx| {
                tx.sorted_insert("idx", "old-high", 5, 100);
                tx.sorted_insert("idx", "new-high", 5, 200);
                tx.sorted_insert("idx", "low", 1, 300);
                Ok(())
            })
            .unwrap();

        let members: Vec<String> = store
            .sorted_range_desc("idx", 0, 10)
            .unwrap()
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        // equal scores break toward the larger (more recent) tie key
        assert_eq!(members, vec!["new-high", "old-high", "low"]);
    }

    #[test]
    fn reinsert_rescores_member() {
        let store = Store::new();
        store
            .transact(|tx| {
                tx.sorted_insert("idx", "a", 1, 10);
                tx.sorted_insert("idx", "b", 2, 20);
                Ok(())
            })
            .unwrap();
        store
            .transact(|tx| {
                tx.sorted_insert("idx", "a", 3, 10);
                Ok(())
            })
            .unwrap();

        assert_eq!(store.sorted_score("idx", "a").unwrap(), Some(3));
        assert_eq!(store.sorted_len("idx").unwrap(), 2);
        let top = store.sorted_range_desc("idx", 0, 1).unwrap();
        assert_eq!(top[0].0, "a");
    }

    #[test]
    fn concurrent_increments_lose_no_updates() {
        let store = Store::new();
        store
            .transact(|tx| {
                tx.put_record("doc:n", &Doc { n: 0 })?;
                Ok(())
            })
            .unwrap();

        // Each retry of one thread implies another thread committed, so with
        // 8 writers every transaction lands well inside the retry bound.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .transact(|tx| {
                            let doc: Doc = tx.get_record("doc:n")?.ok_or(StoreError::NotFound)?;
                            tx.put_record("doc:n", &Doc { n: doc.n + 1 })?;
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get_record::<Doc>("doc:n").unwrap(), Some(Doc { n: 8 }));
    }

    #[test]
    fn prefix_scan_on_geo_style_members() {
        let store = Store::new();
        store
            .transact(|tx| {
                tx.sorted_insert("coords", "u336xp:a", 0, 0);
                tx.sorted_insert("coords", "u336xp:b", 0, 0);
                tx.sorted_insert("coords", "u336xq:c", 0, 0);
                Ok(())
            })
            .unwrap();

        let hits = store.prefix_members("coords", "u336xp").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|m| m.starts_with("u336xp:")));
    }
}
