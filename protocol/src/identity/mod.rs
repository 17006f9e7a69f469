//! # Identity Module
//!
//! Who is calling, and who gets paid. The escrow ledger trusts the host
//! ledger to authenticate callers; here we only model the resulting
//! identity as a 32-byte [`Address`] and compare it by value.

pub mod address;

pub use address::{Address, AddressError};
