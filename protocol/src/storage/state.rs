//! # Global State -- Key/Value View and Write Sets
//!
//! The escrow ledger keeps all of its state in one flat key/value map
//! (the host ledger's "global state"). Reads go through [`StateView`];
//! writes are never applied directly. Instead a transition collects them
//! into a [`WriteSet`], and the host commits that set atomically together
//! with any value transfer.
//!
//! ```text
//! StateView --read--> transition --WriteSet--> host commit (all or nothing)
//! ```
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! benchmarks. The sled-backed store lives in [`super::db`].

use std::collections::BTreeMap;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a state backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be interpreted.
    #[error("corrupt value under key {key}: {reason}")]
    Corrupt {
        /// Hex-encoded key of the offending entry.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// StateView
// ---------------------------------------------------------------------------

/// Read access to global state.
pub trait StateView {
    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Presence test. Denylist entries carry no meaningful value, so callers
    /// that only care whether a key is set should use this.
    fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Read a big-endian u64 stored under `key`.
    fn get_u64(&self, key: &[u8]) -> StoreResult<Option<u64>> {
        match self.get(key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| StoreError::Corrupt {
                    key: hex::encode(key),
                    reason: format!("expected 8-byte integer, found {} bytes", bytes.len()),
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// WriteSet
// ---------------------------------------------------------------------------

/// A staged batch of state mutations.
///
/// Keys are kept sorted so that applying a write set is deterministic
/// regardless of the order the transition produced them in. A later write
/// to the same key replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    /// `Some(value)` is a put, `None` is a delete.
    entries: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

/// A single staged mutation, as yielded by [`WriteSet::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation<'a> {
    /// Store `value` under the key.
    Put(&'a [u8]),
    /// Remove the key.
    Delete,
}

impl WriteSet {
    /// Create an empty write set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), Some(value.into()));
    }

    /// Stage a big-endian u64 put.
    pub fn put_u64(&mut self, key: impl Into<Vec<u8>>, value: u64) {
        self.put(key, value.to_be_bytes());
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), None);
    }

    /// Look up a staged mutation for `key`.
    pub fn staged(&self, key: &[u8]) -> Option<Mutation<'_>> {
        self.entries.get(key).map(|value| match value {
            Some(v) => Mutation::Put(v.as_slice()),
            None => Mutation::Delete,
        })
    }

    /// Number of staged keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate staged mutations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Mutation<'_>)> {
        self.entries.iter().map(|(k, v)| {
            let m = match v {
                Some(value) => Mutation::Put(value.as_slice()),
                None => Mutation::Delete,
            };
            (k.as_slice(), m)
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory global state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every mutation in `writes`.
    pub fn apply(&mut self, writes: &WriteSet) {
        for (key, mutation) in writes.iter() {
            match mutation {
                Mutation::Put(value) => {
                    self.entries.insert(key.to_vec(), value.to_vec());
                }
                Mutation::Delete => {
                    self.entries.remove(key);
                }
            }
        }
    }

    /// Write a single entry outside of any transition. Used for seeding
    /// state the core itself never writes, such as denylist entries.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove a single entry outside of any transition.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateView for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.entries.contains_key(key))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_write_to_same_key_wins() {
        let mut ws = WriteSet::new();
        ws.put(b"k".to_vec(), b"one".to_vec());
        ws.put(b"k".to_vec(), b"two".to_vec());
        assert_eq!(ws.len(), 1);
        assert_eq!(ws.staged(b"k"), Some(Mutation::Put(b"two")));

        ws.delete(b"k".to_vec());
        assert_eq!(ws.staged(b"k"), Some(Mutation::Delete));
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut ws = WriteSet::new();
        ws.put(b"b".to_vec(), b"2".to_vec());
        ws.put(b"a".to_vec(), b"1".to_vec());
        ws.delete(b"c".to_vec());

        let keys: Vec<&[u8]> = ws.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
    }

    #[test]
    fn memory_store_applies_puts_and_deletes() {
        let mut store = MemoryStore::new();
        store.insert(b"gone".to_vec(), b"x".to_vec());

        let mut ws = WriteSet::new();
        ws.put(b"kept".to_vec(), b"v".to_vec());
        ws.delete(b"gone".to_vec());
        store.apply(&ws);

        assert_eq!(store.get(b"kept").unwrap(), Some(b"v".to_vec()));
        assert!(!store.exists(b"gone").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_u64_reads_big_endian() {
        let mut store = MemoryStore::new();
        let mut ws = WriteSet::new();
        ws.put_u64(b"n".to_vec(), 258);
        store.apply(&ws);

        assert_eq!(store.get(b"n").unwrap(), Some(vec![0, 0, 0, 0, 0, 0, 1, 2]));
        assert_eq!(store.get_u64(b"n").unwrap(), Some(258));
        assert_eq!(store.get_u64(b"missing").unwrap(), None);
    }

    #[test]
    fn get_u64_rejects_wrong_width() {
        let mut store = MemoryStore::new();
        store.insert(b"n".to_vec(), vec![1, 2, 3]);
        assert!(matches!(
            store.get_u64(b"n"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn empty_value_still_counts_as_present() {
        let mut store = MemoryStore::new();
        store.insert(b"flag".to_vec(), Vec::new());
        assert!(store.exists(b"flag").unwrap());
    }
}
