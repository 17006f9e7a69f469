//! # Storage Module
//!
//! Global state for the escrow ledger: a flat key/value map holding the
//! escrow counter, denylist membership, and one record per escrow.
//!
//! ## Architecture
//!
//! ```text
//! keys.rs   - Typed global state keys and their byte layout
//! state.rs  - StateView trait, WriteSet, in-memory store
//! db.rs     - sled persistence with an atomic commit + transfer outbox
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! StateView ──read──▶ transition ──WriteSet──▶ commit
//!                                               │
//!                                  MemoryStore / EscrowDB
//! ```
//!
//! Transitions never mutate a store in place. They produce a `WriteSet`,
//! and the host applies it in one step or not at all.

pub mod db;
pub mod keys;
pub mod state;

pub use db::{DbError, EscrowDB};
pub use keys::StateKey;
pub use state::{MemoryStore, Mutation, StateView, StoreError, StoreResult, WriteSet};
