//! # Trade Escrow Contracts
//!
//! The escrow ledger logic: how records are created, validated, and moved
//! from `Pending` to `Complete`, and which checks gate each step.
//!
//! - **Escrow** - the record type, its status, and its persisted encoding.
//! - **Engine** - decodes an invocation and computes the resulting state
//!   writes and payout, without mutating anything.
//! - **Transfer** - the payout directive emitted on confirmed delivery.
//! - **Host** - the seam to the ledger that commits state and payouts
//!   atomically, plus in-memory and sled-backed hosts.
//!
//! ## Design Principles
//!
//! 1. Every rejection leaves state untouched. The engine only reads; the
//!    host commits all writes and the payout together or not at all.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Identity gates every privileged step: admin for update/delete, the
//!    recorded buyer for delivery confirmation.
//! 4. Counter arithmetic is checked. A wrapped id would reuse a record.

pub mod engine;
pub mod escrow;
pub mod host;
pub mod transfer;

pub use engine::{apply, EngineConfig, Invocation, LifecycleEvent, Operation, Transition};
pub use escrow::{EscrowError, EscrowRecord, EscrowStatus};
pub use host::{execute, DbHost, ExecutionError, HostLedger, MemoryHost, Receipt, SettlementError};
pub use transfer::TransferDirective;
