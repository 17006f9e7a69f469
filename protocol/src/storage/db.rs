//! # EscrowDB - Persistent Storage Engine
//!
//! The persistence layer for a locally hosted escrow ledger, built on
//! sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key                  | Value                              |
//! |-------------|----------------------|------------------------------------|
//! | `state`     | global state key     | global state value (see `keys`)    |
//! | `transfers` | `seq` (8B BE)        | encoded transfer directive         |
//! | `metadata`  | key (UTF-8)          | value (bytes)                      |
//!
//! The `transfers` tree is an outbox: every value transfer a committed
//! transition emits is appended here, in the same sled transaction as the
//! state writes, for the host's payment rail to pick up. Either both land
//! on disk or neither does.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use super::keys::StateKey;
use super::state::{Mutation, StateView, StoreError, StoreResult, WriteSet};
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Address allowed to run update/delete lifecycle operations.
const META_ADMIN: &[u8] = b"admin_address";

/// Host round (block height) the next operation executes in.
const META_CURRENT_ROUND: &[u8] = b"current_round";

/// Sequence number the next outbox entry is stored under.
const META_NEXT_TRANSFER_SEQ: &[u8] = b"next_transfer_seq";

/// Denylist entries are presence-only; this is the placeholder value.
const DENYLIST_MARKER: &[u8] = &[1];

fn decode_u64(bytes: &[u8], what: &str) -> Result<u64, String> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| format!("invalid {what} bytes: expected 8, got {}", bytes.len()))?;
    Ok(u64::from_be_bytes(raw))
}

// ---------------------------------------------------------------------------
// EscrowDB
// ---------------------------------------------------------------------------

/// Persistent storage for one escrow ledger deployment.
///
/// Cheap to clone; all clones share the same sled instance.
#[derive(Debug, Clone)]
pub struct EscrowDB {
    /// The underlying sled database handle.
    db: Db,
    /// Global key/value state read and written by transitions.
    state: Tree,
    /// Outbox of emitted transfer directives, keyed by sequence number.
    transfers: Tree,
    /// Deployment metadata (admin, round, outbox sequence).
    metadata: Tree,
}

impl EscrowDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open or create a database at `path` without sled's background
    /// flusher thread. Durability then rests on explicit flushes, which
    /// [`commit`](Self::commit) always performs. Dropping the handle
    /// releases the directory lock at once, so the same path can be
    /// reopened immediately.
    pub fn open_synchronous<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let config = sled::Config::new().path(path).flush_every_ms(None);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let state = db.open_tree("state")?;
        let transfers = db.open_tree("transfers")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            state,
            transfers,
            metadata,
        })
    }

    // -- Commit -------------------------------------------------------------

    /// Apply a write set and, optionally, append one outbox entry, as a
    /// single atomic sled transaction.
    ///
    /// Returns the outbox sequence number when a transfer was appended.
    pub fn commit(&self, writes: &WriteSet, transfer: Option<&[u8]>) -> DbResult<Option<u64>> {
        self.commit_with_admin(writes, transfer, None)
    }

    /// Commit a deployment's creation writes and record its admin address
    /// in the same transaction, so a deployment never exists without one.
    pub fn commit_bootstrap(&self, writes: &WriteSet, admin: &Address) -> DbResult<()> {
        self.commit_with_admin(writes, None, Some(admin))?;
        Ok(())
    }

    fn commit_with_admin(
        &self,
        writes: &WriteSet,
        transfer: Option<&[u8]>,
        admin: Option<&Address>,
    ) -> DbResult<Option<u64>> {
        let result: Result<Option<u64>, TransactionError<String>> =
            (&self.state, &self.transfers, &self.metadata).transaction(
                |(state, transfers, metadata)| {
                    for (key, mutation) in writes.iter() {
                        match mutation {
                            Mutation::Put(value) => {
                                state.insert(key, value)?;
                            }
                            Mutation::Delete => {
                                state.remove(key)?;
                            }
                        }
                    }

                    if let Some(admin) = admin {
                        metadata.insert(META_ADMIN, &admin.as_bytes()[..])?;
                    }

                    let Some(payload) = transfer else {
                        return Ok(None);
                    };

                    let seq = match metadata.get(META_NEXT_TRANSFER_SEQ)? {
                        Some(bytes) => decode_u64(&bytes, "transfer sequence")
                            .map_err(ConflictableTransactionError::Abort)?,
                        None => 0,
                    };
                    let next = seq.checked_add(1).ok_or_else(|| {
                        ConflictableTransactionError::Abort(
                            "transfer sequence exhausted".to_string(),
                        )
                    })?;
                    transfers.insert(seq.to_be_bytes().to_vec(), payload)?;
                    metadata.insert(META_NEXT_TRANSFER_SEQ, next.to_be_bytes().to_vec())?;
                    Ok(Some(seq))
                },
            );

        let seq = result.map_err(|e| match e {
            TransactionError::Abort(reason) => DbError::Serialization(reason),
            TransactionError::Storage(err) => DbError::Sled(err),
        })?;

        self.db.flush()?;
        Ok(seq)
    }

    // -- Denylist administration --------------------------------------------

    /// Add an address to the denylist.
    ///
    /// This is the operator's administrative interface; escrow transitions
    /// only ever read membership.
    pub fn deny(&self, address: &Address) -> DbResult<()> {
        self.state
            .insert(StateKey::Denylisted(*address).to_bytes(), DENYLIST_MARKER)?;
        tracing::info!(address = %address, "address added to denylist");
        Ok(())
    }

    /// Remove an address from the denylist. Returns `true` if it was listed.
    pub fn allow(&self, address: &Address) -> DbResult<bool> {
        let removed = self
            .state
            .remove(StateKey::Denylisted(*address).to_bytes())?
            .is_some();
        tracing::info!(address = %address, removed, "address removed from denylist");
        Ok(removed)
    }

    // -- Outbox -------------------------------------------------------------

    /// All transfer payloads not yet acknowledged, in emission order.
    pub fn pending_transfers(&self) -> DbResult<Vec<(u64, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.transfers.iter() {
            let (key, value) = entry?;
            let seq = decode_u64(&key, "transfer sequence").map_err(DbError::Serialization)?;
            out.push((seq, value.to_vec()));
        }
        Ok(out)
    }

    /// Drop an outbox entry once the payment rail has executed it.
    pub fn acknowledge_transfer(&self, seq: u64) -> DbResult<()> {
        match self.transfers.remove(seq.to_be_bytes())? {
            Some(_) => Ok(()),
            None => Err(DbError::NotFound(format!("transfer #{seq}"))),
        }
    }

    // -- Metadata operations ------------------------------------------------

    /// Read a raw value from the metadata tree.
    pub fn get_metadata(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key)?.map(|v| v.to_vec()))
    }

    /// Write a raw value to the metadata tree.
    pub fn put_metadata(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key, value)?;
        Ok(())
    }

    /// The configured admin address, if the deployment was bootstrapped.
    pub fn admin(&self) -> DbResult<Option<Address>> {
        match self.get_metadata(META_ADMIN)? {
            Some(bytes) => Address::from_slice(&bytes)
                .map(Some)
                .map_err(|e| DbError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Record the admin address.
    pub fn set_admin(&self, admin: &Address) -> DbResult<()> {
        self.put_metadata(META_ADMIN, admin.as_bytes())
    }

    /// Current host round. Starts at 0 for a fresh database.
    pub fn current_round(&self) -> DbResult<u64> {
        match self.get_metadata(META_CURRENT_ROUND)? {
            Some(bytes) => decode_u64(&bytes, "round").map_err(DbError::Serialization),
            None => Ok(0),
        }
    }

    /// Advance the host round by `by` and return the new value.
    pub fn advance_round(&self, by: u64) -> DbResult<u64> {
        let next = self
            .current_round()?
            .checked_add(by)
            .ok_or_else(|| DbError::Serialization("round overflow".to_string()))?;
        self.put_metadata(META_CURRENT_ROUND, &next.to_be_bytes())?;
        Ok(next)
    }

    // -- Utility operations -------------------------------------------------

    /// Number of global state keys.
    pub fn state_len(&self) -> usize {
        self.state.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl StateView for EscrowDB {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let value = self.state.get(key).map_err(DbError::from)?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.state.contains_key(key).map_err(DbError::from)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 32])
    }

    #[test]
    fn open_temporary_database() {
        let db = EscrowDB::open_temporary().expect("should create temp db");
        assert_eq!(db.state_len(), 0);
        assert_eq!(db.current_round().unwrap(), 0);
        assert_eq!(db.admin().unwrap(), None);
        assert!(db.pending_transfers().unwrap().is_empty());
    }

    #[test]
    fn commit_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = EscrowDB::open_synchronous(dir.path()).expect("should open db");
            let mut ws = WriteSet::new();
            ws.put_u64(StateKey::Counter.to_bytes(), 3);
            db.commit(&ws, None).unwrap();
            db.set_admin(&addr(1)).unwrap();
            db.flush().unwrap();
        }

        let db = EscrowDB::open_synchronous(dir.path()).expect("should reopen db");
        assert_eq!(db.get_u64(&StateKey::Counter.to_bytes()).unwrap(), Some(3));
        assert_eq!(db.admin().unwrap(), Some(addr(1)));
    }

    #[test]
    fn synchronous_handle_reopens_repeatedly() {
        let dir = tempfile::tempdir().expect("tempdir");
        for round in 1..=5u64 {
            let db = EscrowDB::open_synchronous(dir.path()).expect("should reopen db");
            assert_eq!(db.current_round().unwrap(), round - 1);
            db.advance_round(1).unwrap();
            db.flush().unwrap();
        }
    }

    #[test]
    fn bootstrap_writes_state_and_admin_together() {
        let db = EscrowDB::open_temporary().unwrap();
        let mut ws = WriteSet::new();
        ws.put_u64(StateKey::Counter.to_bytes(), 0);

        db.commit_bootstrap(&ws, &addr(9)).unwrap();
        assert_eq!(db.admin().unwrap(), Some(addr(9)));
        assert_eq!(db.get_u64(&StateKey::Counter.to_bytes()).unwrap(), Some(0));
        assert!(db.pending_transfers().unwrap().is_empty());
    }

    #[test]
    fn metadata_accessors_back_typed_fields() {
        let db = EscrowDB::open_temporary().unwrap();
        assert_eq!(db.get_metadata(b"missing").unwrap(), None);

        db.put_metadata(b"note", b"hello").unwrap();
        assert_eq!(db.get_metadata(b"note").unwrap(), Some(b"hello".to_vec()));

        db.set_admin(&addr(4)).unwrap();
        assert_eq!(db.get_metadata(META_ADMIN).unwrap(), Some(vec![4; 32]));

        db.put_metadata(META_CURRENT_ROUND, &7u64.to_be_bytes()).unwrap();
        assert_eq!(db.current_round().unwrap(), 7);

        db.put_metadata(META_CURRENT_ROUND, b"bad").unwrap();
        assert!(matches!(db.current_round(), Err(DbError::Serialization(_))));
    }

    #[test]
    fn commit_applies_deletes() {
        let db = EscrowDB::open_temporary().unwrap();
        let mut ws = WriteSet::new();
        ws.put(b"a".to_vec(), b"1".to_vec());
        db.commit(&ws, None).unwrap();
        assert!(db.exists(b"a").unwrap());

        let mut ws = WriteSet::new();
        ws.delete(b"a".to_vec());
        db.commit(&ws, None).unwrap();
        assert!(!db.exists(b"a").unwrap());
    }

    #[test]
    fn transfers_get_sequential_outbox_slots() {
        let db = EscrowDB::open_temporary().unwrap();
        let ws = WriteSet::new();

        assert_eq!(db.commit(&ws, Some(&b"first"[..])).unwrap(), Some(0));
        assert_eq!(db.commit(&ws, None).unwrap(), None);
        assert_eq!(db.commit(&ws, Some(&b"second"[..])).unwrap(), Some(1));

        let pending = db.pending_transfers().unwrap();
        assert_eq!(
            pending,
            vec![(0, b"first".to_vec()), (1, b"second".to_vec())]
        );

        db.acknowledge_transfer(0).unwrap();
        assert_eq!(db.pending_transfers().unwrap().len(), 1);
        assert!(matches!(
            db.acknowledge_transfer(0),
            Err(DbError::NotFound(_))
        ));

        // Acknowledged slots are never handed out again.
        assert_eq!(db.commit(&ws, Some(&b"third"[..])).unwrap(), Some(2));
    }

    #[test]
    fn denylist_is_presence_only() {
        let db = EscrowDB::open_temporary().unwrap();
        let key = StateKey::Denylisted(addr(7)).to_bytes();

        assert!(!db.exists(&key).unwrap());
        db.deny(&addr(7)).unwrap();
        assert!(db.exists(&key).unwrap());
        assert!(!db.exists(&StateKey::Denylisted(addr(8)).to_bytes()).unwrap());

        assert!(db.allow(&addr(7)).unwrap());
        assert!(!db.allow(&addr(7)).unwrap());
        assert!(!db.exists(&key).unwrap());
    }

    #[test]
    fn round_advances_monotonically() {
        let db = EscrowDB::open_temporary().unwrap();
        assert_eq!(db.advance_round(1).unwrap(), 1);
        assert_eq!(db.advance_round(10).unwrap(), 11);
        assert_eq!(db.current_round().unwrap(), 11);
    }
}
