//! # Trade Escrow Records
//!
//! One record per escrow, holding the two parties, the locked amount, the
//! product reference, and the settlement status. The lifecycle is:
//!
//! 1. **Initiate** - the buyer opens the escrow against a seller and a
//!    product; the record is written as `Pending`.
//! 2. **Confirm** - the buyer confirms delivery; the seller is paid and the
//!    record becomes `Complete`.
//!
//! There is no other transition. A record is never cancelled, re-opened,
//! or deleted, and its parties and amount never change after creation.
//!
//! ## Persisted Layout
//!
//! ```text
//! buyer (32) | seller (32) | amount (8, BE) | product_len (2, BE)
//!   | product_id (product_len) | created_round (8, BE) | status tag
//! ```
//!
//! The status tag is the ASCII string `pending` or `complete` and runs to
//! the end of the value. The explicit product length means every field has
//! a fixed boundary; nothing is located by counting back from the end.

use escrow_protocol::config::{
    ADDRESS_LENGTH, MAX_PRODUCT_ID_LENGTH, STATUS_TAG_COMPLETE, STATUS_TAG_PENDING,
};
use escrow_protocol::storage::StoreError;
use escrow_protocol::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons an escrow operation is rejected.
///
/// Every variant rejects the whole operation: no state is written and no
/// value moves.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// Wrong argument count, or an argument that cannot be decoded.
    #[error("malformed arguments for {operation}: {reason}")]
    MalformedArguments {
        /// Operation being decoded.
        operation: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The caller does not hold the identity this operation requires.
    #[error("unauthorized: {caller} is not the {required}")]
    Unauthorized {
        /// Who submitted the operation.
        caller: Address,
        /// The role that was required ("admin", "recorded buyer").
        required: &'static str,
    },

    /// The buyer, the seller, or both are on the denylist.
    #[error("party blacklisted (buyer: {buyer}, seller: {seller})")]
    PartyBlacklisted {
        /// Buyer is listed.
        buyer: bool,
        /// Seller is listed.
        seller: bool,
    },

    /// No record exists under the requested id.
    #[error("escrow {0} not found")]
    EscrowNotFound(u64),

    /// The escrow is not in the status this operation needs.
    #[error("invalid state transition: escrow is {current}, expected {expected}")]
    InvalidState {
        /// The escrow's current status.
        current: EscrowStatus,
        /// The status required for this operation.
        expected: EscrowStatus,
    },

    /// The operation name is not recognised.
    #[error("unknown operation: {0:?}")]
    UnknownOperation(String),

    /// The escrow counter cannot be advanced any further.
    #[error("escrow counter exhausted")]
    CounterOverflow,

    /// A persisted record could not be decoded.
    #[error("corrupt escrow record: {0}")]
    CorruptRecord(String),

    /// The state backend failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Settlement status of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    /// Funds are locked, delivery not yet confirmed.
    Pending,
    /// Delivery confirmed and the seller payout emitted.
    Complete,
}

impl EscrowStatus {
    /// The ASCII tag persisted at the end of the record.
    pub fn tag(self) -> &'static [u8] {
        match self {
            EscrowStatus::Pending => STATUS_TAG_PENDING,
            EscrowStatus::Complete => STATUS_TAG_COMPLETE,
        }
    }

    /// Parse a persisted tag.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        if tag == STATUS_TAG_PENDING {
            Some(EscrowStatus::Pending)
        } else if tag == STATUS_TAG_COMPLETE {
            Some(EscrowStatus::Complete)
        } else {
            None
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowStatus::Pending => write!(f, "Pending"),
            EscrowStatus::Complete => write!(f, "Complete"),
        }
    }
}

/// A two-party escrow agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// The party that opened the escrow and may confirm delivery.
    pub buyer: Address,
    /// The party paid on confirmation.
    pub seller: Address,
    /// Locked amount in the smallest currency unit.
    pub amount: u64,
    /// Caller-supplied product reference. Opaque to the ledger.
    pub product_id: Vec<u8>,
    /// Host round the escrow was opened in. Informational only.
    pub created_round: u64,
    /// Current settlement status.
    pub status: EscrowStatus,
}

impl EscrowRecord {
    /// A freshly initiated escrow.
    pub fn open(
        buyer: Address,
        seller: Address,
        amount: u64,
        product_id: Vec<u8>,
        created_round: u64,
    ) -> Self {
        Self {
            buyer,
            seller,
            amount,
            product_id,
            created_round,
            status: EscrowStatus::Pending,
        }
    }

    /// Move the record from `Pending` to `Complete`.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidState`] if the record is already complete.
    pub fn complete(&mut self) -> Result<(), EscrowError> {
        if self.status != EscrowStatus::Pending {
            return Err(EscrowError::InvalidState {
                current: self.status,
                expected: EscrowStatus::Pending,
            });
        }
        self.status = EscrowStatus::Complete;
        Ok(())
    }

    /// Encode for storage. See the module docs for the layout.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::CorruptRecord`] if the product reference is
    /// longer than [`MAX_PRODUCT_ID_LENGTH`]; such a record can never have
    /// been produced by a valid `initiate_escrow`.
    pub fn encode(&self) -> Result<Vec<u8>, EscrowError> {
        if self.product_id.len() > MAX_PRODUCT_ID_LENGTH {
            return Err(EscrowError::CorruptRecord(format!(
                "product id is {} bytes, limit is {}",
                self.product_id.len(),
                MAX_PRODUCT_ID_LENGTH
            )));
        }
        let product_len = self.product_id.len() as u16;
        let tag = self.status.tag();

        let mut out = Vec::with_capacity(
            ADDRESS_LENGTH * 2 + 8 + 2 + self.product_id.len() + 8 + tag.len(),
        );
        out.extend_from_slice(self.buyer.as_bytes());
        out.extend_from_slice(self.seller.as_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        out.extend_from_slice(&product_len.to_be_bytes());
        out.extend_from_slice(&self.product_id);
        out.extend_from_slice(&self.created_round.to_be_bytes());
        out.extend_from_slice(tag);
        Ok(out)
    }

    /// Decode a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::CorruptRecord`] on truncated input, an
    /// oversized product reference, or an unknown status tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, EscrowError> {
        let mut r = Reader::new(bytes);
        let buyer = r.address()?;
        let seller = r.address()?;
        let amount = r.u64()?;
        let product_len = r.u16()? as usize;
        if product_len > MAX_PRODUCT_ID_LENGTH {
            return Err(EscrowError::CorruptRecord(format!(
                "product length {product_len} exceeds limit {MAX_PRODUCT_ID_LENGTH}"
            )));
        }
        let product_id = r.take(product_len)?.to_vec();
        let created_round = r.u64()?;
        let tag = r.rest();
        let status = EscrowStatus::from_tag(tag).ok_or_else(|| {
            EscrowError::CorruptRecord(format!(
                "unknown status tag {:?}",
                String::from_utf8_lossy(tag)
            ))
        })?;

        Ok(Self {
            buyer,
            seller,
            amount,
            product_id,
            created_round,
            status,
        })
    }
}

/// Forward-only reader over a stored record.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EscrowError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                EscrowError::CorruptRecord(format!(
                    "truncated: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, EscrowError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64, EscrowError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn address(&mut self) -> Result<Address, EscrowError> {
        let raw = self.take(ADDRESS_LENGTH)?;
        Address::from_slice(raw).map_err(|e| EscrowError::CorruptRecord(e.to_string()))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}
