//! # Host Ledger Seam
//!
//! The engine decides; the host commits. A [`HostLedger`] provides the
//! current round and a read view of global state, and must apply a
//! [`Transition`] (state writes plus optional payout) atomically: if the
//! payout cannot be honored, none of the writes may land.
//!
//! [`execute`] is the whole pipeline for one invocation:
//!
//! ```text
//! round ← host.current_round()
//! transition ← engine::apply(config, invocation, round, host.view())   (reject → stop)
//! host.settle(transition)                                              (refuse → stop)
//! ```
//!
//! Two hosts ship with the crate: [`MemoryHost`] for tests and benchmarks,
//! and [`DbHost`], which persists to sled and queues payouts in the
//! database's transfer outbox.

use escrow_protocol::storage::{DbError, EscrowDB, MemoryStore, StateView};
use serde::Serialize;
use thiserror::Error;

use crate::engine::{self, EngineConfig, Invocation, Transition};
use crate::escrow::EscrowError;
use crate::transfer::TransferDirective;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The host could not commit an accepted transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettlementError {
    /// The host refused the payout (for example, the escrow's holding
    /// account cannot cover it).
    #[error("transfer refused by host ledger: {0}")]
    Refused(String),

    /// The payout could not be serialized for the outbox.
    #[error("transfer encoding failed: {0}")]
    Encoding(String),

    /// The backing store failed.
    #[error("host storage error: {0}")]
    Storage(String),
}

impl From<DbError> for SettlementError {
    fn from(e: DbError) -> Self {
        SettlementError::Storage(e.to_string())
    }
}

/// Why an invocation did not take effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// The engine rejected the operation.
    #[error("operation rejected: {0}")]
    Rejected(#[from] EscrowError),

    /// The engine accepted, but the host could not commit.
    #[error("settlement failed: {0}")]
    Settlement(#[from] SettlementError),
}

// ---------------------------------------------------------------------------
// HostLedger
// ---------------------------------------------------------------------------

/// The execution environment an escrow deployment runs inside.
pub trait HostLedger {
    /// Read view of current global state.
    fn view(&self) -> &dyn StateView;

    /// Round (block height) the next operation executes in.
    fn current_round(&self) -> Result<u64, SettlementError>;

    /// Commit the transition's writes and payout together, or neither.
    fn settle(&mut self, transition: &Transition) -> Result<(), SettlementError>;
}

/// Summary of a committed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Operation that ran.
    pub operation: &'static str,
    /// Round it executed in.
    pub round: u64,
    /// Escrow created or settled, if any.
    pub escrow_id: Option<u64>,
    /// Payout executed with the commit, if any.
    pub transfer: Option<TransferDirective>,
}

/// Run one invocation end to end against `host`.
///
/// # Errors
///
/// [`ExecutionError::Rejected`] when the engine refuses the operation, and
/// [`ExecutionError::Settlement`] when the host cannot commit it. In both
/// cases global state is exactly as it was before the call.
pub fn execute<H>(
    host: &mut H,
    config: &EngineConfig,
    invocation: &Invocation,
) -> Result<Receipt, ExecutionError>
where
    H: HostLedger + ?Sized,
{
    let round = host.current_round()?;
    let transition = engine::apply(config, invocation, round, host.view())?;

    if let Err(e) = host.settle(&transition) {
        tracing::error!(
            operation = transition.operation,
            escrow_id = ?transition.escrow_id,
            error = %e,
            "settlement failed, transition discarded"
        );
        return Err(e.into());
    }

    Ok(Receipt {
        operation: transition.operation,
        round,
        escrow_id: transition.escrow_id,
        transfer: transition.transfer,
    })
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// In-memory host: a [`MemoryStore`], a round counter, and a list of the
/// payouts it has executed.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    /// Global state.
    pub store: MemoryStore,
    /// Current round.
    pub round: u64,
    /// Payouts executed so far, in order.
    pub executed: Vec<TransferDirective>,
}

impl MemoryHost {
    /// Empty host at round 0.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostLedger for MemoryHost {
    fn view(&self) -> &dyn StateView {
        &self.store
    }

    fn current_round(&self) -> Result<u64, SettlementError> {
        Ok(self.round)
    }

    fn settle(&mut self, transition: &Transition) -> Result<(), SettlementError> {
        self.store.apply(&transition.writes);
        if let Some(payout) = transition.transfer {
            self.executed.push(payout);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DbHost
// ---------------------------------------------------------------------------

/// sled-backed host. Payouts are appended to the database's transfer
/// outbox in the same transaction as the state writes.
#[derive(Debug, Clone)]
pub struct DbHost {
    db: EscrowDB,
}

impl DbHost {
    /// Host over an open database.
    pub fn new(db: EscrowDB) -> Self {
        Self { db }
    }

    /// The underlying database.
    pub fn db(&self) -> &EscrowDB {
        &self.db
    }

    /// Decoded outbox entries awaiting execution by the payment rail.
    pub fn pending_transfers(&self) -> Result<Vec<(u64, TransferDirective)>, SettlementError> {
        self.db
            .pending_transfers()?
            .into_iter()
            .map(|(seq, bytes)| {
                TransferDirective::from_bytes(&bytes)
                    .map(|t| (seq, t))
                    .map_err(|e| SettlementError::Encoding(e.to_string()))
            })
            .collect()
    }
}

impl HostLedger for DbHost {
    fn view(&self) -> &dyn StateView {
        &self.db
    }

    fn current_round(&self) -> Result<u64, SettlementError> {
        Ok(self.db.current_round()?)
    }

    fn settle(&mut self, transition: &Transition) -> Result<(), SettlementError> {
        let payload = transition
            .transfer
            .map(|t| t.to_bytes())
            .transpose()
            .map_err(|e| SettlementError::Encoding(e.to_string()))?;

        let seq = self.db.commit(&transition.writes, payload.as_deref())?;
        if let Some(seq) = seq {
            tracing::info!(seq, escrow_id = ?transition.escrow_id, "payout queued in outbox");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_protocol::Address;

    const ADMIN: Address = Address::new([0xAD; 32]);
    const BUYER: Address = Address::new([0xB0; 32]);
    const SELLER: Address = Address::new([0x5E; 32]);

    #[test]
    fn memory_host_records_executed_payouts() {
        let cfg = EngineConfig::new(ADMIN);
        let mut host = MemoryHost::new();
        host.round = 5;

        let receipt = execute(
            &mut host,
            &cfg,
            &Invocation::initiate_escrow(BUYER, SELLER, b"p1", 500),
        )
        .unwrap();
        assert_eq!(receipt.round, 5);
        assert_eq!(receipt.escrow_id, Some(0));
        assert!(host.executed.is_empty());

        let receipt = execute(&mut host, &cfg, &Invocation::confirm_delivery(BUYER, 0)).unwrap();
        assert_eq!(receipt.operation, "confirm_delivery");
        assert_eq!(host.executed.len(), 1);
        assert_eq!(host.executed[0].receiver, SELLER);
    }

    #[test]
    fn db_host_queues_payout_with_state() {
        let cfg = EngineConfig::new(ADMIN);
        let mut host = DbHost::new(EscrowDB::open_temporary().unwrap());

        execute(&mut host, &cfg, &Invocation::initiate_escrow(BUYER, SELLER, b"p1", 500)).unwrap();
        assert!(host.pending_transfers().unwrap().is_empty());

        execute(&mut host, &cfg, &Invocation::confirm_delivery(BUYER, 0)).unwrap();
        let pending = host.pending_transfers().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0],
            (
                0,
                TransferDirective {
                    receiver: SELLER,
                    amount: 500,
                    fee: 1_000
                }
            )
        );
    }

    #[test]
    fn rejection_is_reported_as_rejected() {
        let cfg = EngineConfig::new(ADMIN);
        let mut host = MemoryHost::new();
        let err = execute(&mut host, &cfg, &Invocation::confirm_delivery(BUYER, 99)).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Rejected(EscrowError::EscrowNotFound(99))
        );
        assert!(host.store.is_empty());
    }
}
