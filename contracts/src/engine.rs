//! # Transition Engine
//!
//! The single entry point for changing escrow state:
//!
//! ```text
//! apply(config, invocation, round, state) -> Result<Transition, EscrowError>
//! ```
//!
//! `apply` only reads `state`. Everything it wants to change comes back in
//! the [`Transition`]: a staged [`WriteSet`] and, for a delivery
//! confirmation, the seller payout. The host commits both together or
//! neither. An `Err` means the operation is rejected outright.
//!
//! ## Dispatch
//!
//! A lifecycle event, when present, always wins over the operation name:
//!
//! | Event / operation    | Accepted when                        | Effect                     |
//! |----------------------|--------------------------------------|----------------------------|
//! | creation             | always                               | counter := 0               |
//! | update, deletion     | caller is admin                      | none                       |
//! | opt-in, close-out    | always                               | none                       |
//! | clear-state          | always                               | none                       |
//! | `initiate_escrow`    | neither party denylisted             | new record, counter += 1   |
//! | `confirm_delivery`   | caller is recorded buyer, Pending    | record Complete + payout   |
//! | anything else        | never (`UnknownOperation`)           |                            |

use escrow_protocol::config::{
    CONFIRM_DELIVERY_ARITY, CONFIRM_DELIVERY_FEE, CONFIRM_DELIVERY_NAME, INITIATE_ESCROW_ARITY,
    INITIATE_ESCROW_NAME, MAX_INTEGER_ARG_LENGTH, MAX_PRODUCT_ID_LENGTH, OP_CONFIRM_DELIVERY,
    OP_INITIATE_ESCROW,
};
use escrow_protocol::storage::{StateKey, StateView, WriteSet};
use escrow_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::escrow::{EscrowError, EscrowRecord};
use crate::transfer::{self, TransferDirective};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Deployment lifecycle events delivered by the host alongside a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// The deployment is being created. The host must deliver this once
    /// per deployment: a second creation resets the escrow counter, after
    /// which every `initiate_escrow` collides with an existing record.
    Creation,
    /// The deployment's logic is being replaced.
    Update,
    /// The deployment is being removed.
    Deletion,
    /// An account opts in to the deployment.
    OptIn,
    /// An account closes out of the deployment.
    CloseOut,
    /// An account force-clears its local state.
    ClearState,
}

/// One submitted operation, as delivered by the host ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Authenticated sender.
    pub caller: Address,
    /// Lifecycle event, if this call carries one.
    pub event: Option<LifecycleEvent>,
    /// Operation name. Ignored when `event` is set.
    pub operation: Vec<u8>,
    /// Positional arguments, excluding the operation name.
    pub args: Vec<Vec<u8>>,
}

impl Invocation {
    /// A plain application call.
    pub fn call(caller: Address, operation: impl Into<Vec<u8>>, args: Vec<Vec<u8>>) -> Self {
        Self {
            caller,
            event: None,
            operation: operation.into(),
            args,
        }
    }

    /// A lifecycle event with no application arguments.
    pub fn lifecycle(caller: Address, event: LifecycleEvent) -> Self {
        Self {
            caller,
            event: Some(event),
            operation: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Encode an `initiate_escrow` call from `buyer`.
    pub fn initiate_escrow(buyer: Address, seller: Address, product_id: &[u8], amount: u64) -> Self {
        Self::call(
            buyer,
            OP_INITIATE_ESCROW,
            vec![
                seller.as_bytes().to_vec(),
                product_id.to_vec(),
                amount.to_be_bytes().to_vec(),
            ],
        )
    }

    /// Encode a `confirm_delivery` call from `caller`.
    pub fn confirm_delivery(caller: Address, escrow_id: u64) -> Self {
        Self::call(
            caller,
            OP_CONFIRM_DELIVERY,
            vec![escrow_id.to_be_bytes().to_vec()],
        )
    }
}

/// Decoded operation. One variant per thing the engine can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Deployment creation.
    Bootstrap,
    /// Admin-gated logic update.
    Update,
    /// Admin-gated deployment removal.
    Delete,
    /// Account opt-in.
    OptIn,
    /// Account close-out.
    CloseOut,
    /// Account clear-state.
    ClearState,
    /// Open a new escrow with the caller as buyer.
    InitiateEscrow {
        /// Party paid on confirmation.
        seller: Address,
        /// Opaque product reference.
        product_id: Vec<u8>,
        /// Amount to lock.
        amount: u64,
    },
    /// Buyer confirms delivery of an existing escrow.
    ConfirmDelivery {
        /// Escrow being settled.
        escrow_id: u64,
    },
}

const INITIATE: &str = INITIATE_ESCROW_NAME;
const CONFIRM: &str = CONFIRM_DELIVERY_NAME;

impl Operation {
    /// Decode an invocation, following the dispatch order in the module docs.
    pub fn decode(invocation: &Invocation) -> Result<Self, EscrowError> {
        if let Some(event) = invocation.event {
            return Ok(match event {
                LifecycleEvent::Creation => Operation::Bootstrap,
                LifecycleEvent::Deletion => Operation::Delete,
                LifecycleEvent::Update => Operation::Update,
                LifecycleEvent::CloseOut => Operation::CloseOut,
                LifecycleEvent::OptIn => Operation::OptIn,
                LifecycleEvent::ClearState => Operation::ClearState,
            });
        }

        let args = &invocation.args;
        match invocation.operation.as_slice() {
            op if op == OP_INITIATE_ESCROW => {
                expect_arity(INITIATE, args, INITIATE_ESCROW_ARITY)?;
                let seller = Address::from_slice(&args[0]).map_err(|e| malformed(INITIATE, e))?;
                let product_id = args[1].clone();
                if product_id.len() > MAX_PRODUCT_ID_LENGTH {
                    return Err(malformed(
                        INITIATE,
                        format!(
                            "product id is {} bytes, limit is {MAX_PRODUCT_ID_LENGTH}",
                            product_id.len()
                        ),
                    ));
                }
                let amount = decode_uint(INITIATE, "amount", &args[2])?;
                Ok(Operation::InitiateEscrow {
                    seller,
                    product_id,
                    amount,
                })
            }
            op if op == OP_CONFIRM_DELIVERY => {
                expect_arity(CONFIRM, args, CONFIRM_DELIVERY_ARITY)?;
                let escrow_id = decode_uint(CONFIRM, "escrow id", &args[0])?;
                Ok(Operation::ConfirmDelivery { escrow_id })
            }
            other => Err(EscrowError::UnknownOperation(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// Short name for logs and receipts.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Bootstrap => "bootstrap",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::OptIn => "opt-in",
            Operation::CloseOut => "close-out",
            Operation::ClearState => "clear-state",
            Operation::InitiateEscrow { .. } => INITIATE,
            Operation::ConfirmDelivery { .. } => CONFIRM,
        }
    }
}

fn malformed(operation: &'static str, reason: impl ToString) -> EscrowError {
    EscrowError::MalformedArguments {
        operation,
        reason: reason.to_string(),
    }
}

fn expect_arity(operation: &'static str, args: &[Vec<u8>], want: usize) -> Result<(), EscrowError> {
    if args.len() != want {
        return Err(malformed(
            operation,
            format!("expected {want} arguments, got {}", args.len()),
        ));
    }
    Ok(())
}

/// Big-endian unsigned integer of up to 8 bytes. An empty argument is 0.
fn decode_uint(operation: &'static str, field: &str, bytes: &[u8]) -> Result<u64, EscrowError> {
    if bytes.len() > MAX_INTEGER_ARG_LENGTH {
        return Err(malformed(
            operation,
            format!("{field} is {} bytes, at most 8 allowed", bytes.len()),
        ));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-deployment engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The only address allowed to update or delete the deployment.
    pub admin: Address,
    /// Fee attached to every seller payout.
    pub confirm_fee: u64,
}

impl EngineConfig {
    /// Config with the standard confirmation fee.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            confirm_fee: CONFIRM_DELIVERY_FEE,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything an accepted operation changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Name of the operation that produced this transition.
    pub operation: &'static str,
    /// Staged state writes.
    pub writes: WriteSet,
    /// Payout the host must execute with the writes.
    pub transfer: Option<TransferDirective>,
    /// Escrow created or settled, if any.
    pub escrow_id: Option<u64>,
}

impl Transition {
    fn empty(operation: &'static str) -> Self {
        Self {
            operation,
            writes: WriteSet::new(),
            transfer: None,
            escrow_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Compute the effect of one invocation against `state`.
///
/// # Errors
///
/// Any [`EscrowError`] rejects the invocation. `state` is only read, so a
/// rejection leaves nothing to undo.
pub fn apply<S>(
    config: &EngineConfig,
    invocation: &Invocation,
    round: u64,
    state: &S,
) -> Result<Transition, EscrowError>
where
    S: StateView + ?Sized,
{
    let caller = invocation.caller;
    let operation = match Operation::decode(invocation) {
        Ok(op) => op,
        Err(e) => {
            warn!(caller = %caller, error = %e, "invocation rejected");
            return Err(e);
        }
    };
    let name = operation.name();

    let result = match operation {
        Operation::Bootstrap => {
            let mut t = Transition::empty(name);
            t.writes.put_u64(StateKey::Counter, 0);
            Ok(t)
        }
        Operation::Update | Operation::Delete => {
            if caller == config.admin {
                Ok(Transition::empty(name))
            } else {
                Err(EscrowError::Unauthorized {
                    caller,
                    required: "admin",
                })
            }
        }
        Operation::OptIn | Operation::CloseOut | Operation::ClearState => {
            Ok(Transition::empty(name))
        }
        Operation::InitiateEscrow {
            seller,
            product_id,
            amount,
        } => initiate_escrow(caller, seller, product_id, amount, round, state),
        Operation::ConfirmDelivery { escrow_id } => {
            confirm_delivery(config, caller, escrow_id, state)
        }
    };

    match &result {
        Ok(t) => info!(
            operation = name,
            caller = %caller,
            round,
            escrow_id = ?t.escrow_id,
            writes = t.writes.len(),
            transfer = t.transfer.is_some(),
            "operation accepted"
        ),
        Err(e) => warn!(operation = name, caller = %caller, round, error = %e, "operation rejected"),
    }
    result
}

fn initiate_escrow<S>(
    buyer: Address,
    seller: Address,
    product_id: Vec<u8>,
    amount: u64,
    round: u64,
    state: &S,
) -> Result<Transition, EscrowError>
where
    S: StateView + ?Sized,
{
    // Both lookups happen before either can reject.
    let buyer_denied = state.exists(&StateKey::Denylisted(buyer).to_bytes())?;
    let seller_denied = state.exists(&StateKey::Denylisted(seller).to_bytes())?;
    if buyer_denied || seller_denied {
        return Err(EscrowError::PartyBlacklisted {
            buyer: buyer_denied,
            seller: seller_denied,
        });
    }

    let escrow_id = escrow_count(state)?;
    let next_id = escrow_id
        .checked_add(1)
        .ok_or(EscrowError::CounterOverflow)?;

    let key = StateKey::Escrow(escrow_id).to_bytes();
    if state.exists(&key)? {
        return Err(EscrowError::CorruptRecord(format!(
            "counter points at existing escrow {escrow_id}"
        )));
    }

    let record = EscrowRecord::open(buyer, seller, amount, product_id, round);
    debug!(escrow_id, amount, seller = %seller, "opening escrow");

    let mut t = Transition::empty(INITIATE);
    t.writes.put(key, record.encode()?);
    t.writes.put_u64(StateKey::Counter, next_id);
    t.escrow_id = Some(escrow_id);
    Ok(t)
}

fn confirm_delivery<S>(
    config: &EngineConfig,
    caller: Address,
    escrow_id: u64,
    state: &S,
) -> Result<Transition, EscrowError>
where
    S: StateView + ?Sized,
{
    let mut record = escrow(state, escrow_id)?.ok_or(EscrowError::EscrowNotFound(escrow_id))?;

    if caller != record.buyer {
        return Err(EscrowError::Unauthorized {
            caller,
            required: "recorded buyer",
        });
    }

    record.complete()?;
    let payout = transfer::emit(&record, config.confirm_fee);
    debug!(escrow_id, receiver = %payout.receiver, amount = payout.amount, "emitting payout");

    let mut t = Transition::empty(CONFIRM);
    t.writes.put(StateKey::Escrow(escrow_id), record.encode()?);
    t.transfer = Some(payout);
    t.escrow_id = Some(escrow_id);
    Ok(t)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Load and decode one escrow record.
pub fn escrow<S>(state: &S, escrow_id: u64) -> Result<Option<EscrowRecord>, EscrowError>
where
    S: StateView + ?Sized,
{
    match state.get(&StateKey::Escrow(escrow_id).to_bytes())? {
        Some(bytes) => Ok(Some(EscrowRecord::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Number of escrows ever opened, which is also the next id to assign.
/// An unbootstrapped deployment reads as 0.
pub fn escrow_count<S>(state: &S) -> Result<u64, EscrowError>
where
    S: StateView + ?Sized,
{
    Ok(state.get_u64(&StateKey::Counter.to_bytes())?.unwrap_or(0))
}

/// Denylist membership of `address`.
pub fn is_denylisted<S>(state: &S, address: &Address) -> Result<bool, EscrowError>
where
    S: StateView + ?Sized,
{
    Ok(state.exists(&StateKey::Denylisted(*address).to_bytes())?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
