// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Escrow Protocol - Core Library
//!
//! Foundation types for a two-party trade escrow ledger: a buyer locks
//! funds against a seller and a product, and the funds are paid out only
//! when the buyer confirms delivery.
//!
//! This crate holds what every layer above needs to agree on:
//!
//! - **config** - Protocol constants: state key names, status tags, fees.
//! - **identity** - 32-byte account addresses.
//! - **storage** - Global key/value state: read view, staged write sets,
//!   in-memory store, and the sled-backed `EscrowDB`.
//!
//! The escrow rules themselves live in `escrow-contracts`.
//!
//! ## Design Philosophy
//!
//! 1. State changes are staged, then committed all at once or not at all.
//! 2. Persisted byte layouts are decoded into typed structures right after
//!    a read and encoded right before a write. Nothing in between touches
//!    raw offsets.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod identity;
pub mod storage;

pub use identity::Address;
