//! # Transfer Directives
//!
//! The ledger core never moves value itself. When delivery is confirmed it
//! emits a [`TransferDirective`] describing the seller payout, and the host
//! ledger executes it in the same atomic commit as the status change.

use escrow_protocol::Address;
use serde::{Deserialize, Serialize};

use crate::escrow::EscrowRecord;

/// A value movement the host ledger must honor with the state commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDirective {
    /// Account credited.
    pub receiver: Address,
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// Fee attached to the payout, in the host's fee unit.
    pub fee: u64,
}

impl TransferDirective {
    /// Compact binary form stored in the host's outbox.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode an outbox entry.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Build the seller payout for a confirmed escrow.
pub fn emit(record: &EscrowRecord, fee: u64) -> TransferDirective {
    TransferDirective {
        receiver: record.seller,
        amount: record.amount,
        fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_goes_to_seller_for_full_amount() {
        let buyer = Address::new([1; 32]);
        let seller = Address::new([2; 32]);
        let record = EscrowRecord::open(buyer, seller, 500, b"p1".to_vec(), 7);

        let directive = emit(&record, 1_000);
        assert_eq!(directive.receiver, seller);
        assert_eq!(directive.amount, 500);
        assert_eq!(directive.fee, 1_000);
    }

    #[test]
    fn outbox_bytes_decode_back() {
        let directive = TransferDirective {
            receiver: Address::new([3; 32]),
            amount: u64::MAX,
            fee: 1_000,
        };
        let bytes = directive.to_bytes().unwrap();
        assert_eq!(TransferDirective::from_bytes(&bytes).unwrap(), directive);
        assert!(TransferDirective::from_bytes(&bytes[..4]).is_err());
    }
}
