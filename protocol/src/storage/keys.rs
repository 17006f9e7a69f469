//! # Global State Key Layout
//!
//! | Key                               | Value                         |
//! |-----------------------------------|-------------------------------|
//! | `escrow_counter`                  | next escrow id (8B BE)        |
//! | `escrow_` + id (8B BE)            | encoded `EscrowRecord`        |
//! | `blacklist` + address (32B)       | presence only, value ignored  |
//!
//! Escrow ids are appended as big-endian bytes so that lexicographic key
//! order matches numeric id order.

use crate::config::{DENYLIST_KEY_PREFIX, ESCROW_COUNTER_KEY, ESCROW_KEY_PREFIX};
use crate::identity::Address;

/// A typed global state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// The next escrow id to assign.
    Counter,
    /// One escrow record.
    Escrow(u64),
    /// Denylist membership of one address.
    Denylisted(Address),
}

impl StateKey {
    /// Render the raw key bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            StateKey::Counter => ESCROW_COUNTER_KEY.to_vec(),
            StateKey::Escrow(id) => {
                let mut key = Vec::with_capacity(ESCROW_KEY_PREFIX.len() + 8);
                key.extend_from_slice(ESCROW_KEY_PREFIX);
                key.extend_from_slice(&id.to_be_bytes());
                key
            }
            StateKey::Denylisted(address) => {
                let mut key = Vec::with_capacity(DENYLIST_KEY_PREFIX.len() + 32);
                key.extend_from_slice(DENYLIST_KEY_PREFIX);
                key.extend_from_slice(address.as_bytes());
                key
            }
        }
    }
}

impl From<StateKey> for Vec<u8> {
    fn from(key: StateKey) -> Self {
        key.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_key_is_literal_name() {
        assert_eq!(StateKey::Counter.to_bytes(), b"escrow_counter".to_vec());
    }

    #[test]
    fn escrow_key_appends_big_endian_id() {
        let key = StateKey::Escrow(1).to_bytes();
        assert_eq!(&key[..7], b"escrow_");
        assert_eq!(&key[7..], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(StateKey::Escrow(255).to_bytes() < StateKey::Escrow(256).to_bytes());
    }

    #[test]
    fn escrow_keys_never_collide_with_counter() {
        // Same prefix, but record keys are one byte longer.
        for id in [0u64, 1, u64::MAX] {
            assert_ne!(StateKey::Escrow(id).to_bytes(), StateKey::Counter.to_bytes());
        }
    }

    #[test]
    fn denylist_key_is_prefix_plus_address() {
        let addr = Address::new([9u8; 32]);
        let key = StateKey::Denylisted(addr).to_bytes();
        assert_eq!(key.len(), 9 + 32);
        assert!(key.starts_with(b"blacklist"));
        assert_eq!(&key[9..], addr.as_bytes());
    }
}
