//! # Account Addresses
//!
//! Parties on the host ledger are identified by a raw 32-byte public key.
//! The ledger core never interprets the bytes: two addresses are the same
//! party iff their bytes are equal.
//!
//! The text form is 64 lowercase hex characters. Parsing also accepts an
//! optional `0x` prefix and uppercase digits, since operators paste keys
//! from all kinds of tooling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ADDRESS_LENGTH;

/// Errors produced when constructing an [`Address`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The raw bytes are not exactly 32 bytes long.
    #[error("invalid address length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Byte length actually supplied.
        got: usize,
    },

    /// The text form is not valid hex.
    #[error("invalid address hex: {0}")]
    InvalidHex(String),
}

/// A 32-byte host ledger account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never a real account; handy as a placeholder
    /// admin in test deployments.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build an address from a byte slice that must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let raw: [u8; ADDRESS_LENGTH] =
            bytes.try_into().map_err(|_| AddressError::InvalidLength {
                expected: ADDRESS_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self(raw))
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding of the address.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_hex()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Address({}..)", &self.to_hex()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(Address::from_slice(&[7u8; 32]).is_ok());
        assert_eq!(
            Address::from_slice(&[7u8; 31]),
            Err(AddressError::InvalidLength {
                expected: 32,
                got: 31
            })
        );
        assert!(Address::from_slice(&[7u8; 33]).is_err());
    }

    #[test]
    fn hex_text_form_parses_back() {
        let addr = Address::new([0xAB; 32]);
        let text = addr.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<Address>().unwrap(), addr);
        assert_eq!(format!("0x{text}").parse::<Address>().unwrap(), addr);
        assert_eq!(text.to_uppercase().parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn rejects_bad_hex() {
        let bad = "zz".repeat(32);
        assert!(matches!(
            bad.parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
        assert!(matches!(
            "abcd".parse::<Address>(),
            Err(AddressError::InvalidLength { got: 2, .. })
        ));
    }

    #[test]
    fn serde_uses_hex_string() {
        let addr = Address::new([1u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn debug_is_abbreviated() {
        let addr = Address::new([0xFF; 32]);
        assert_eq!(format!("{addr:?}"), "Address(ffffffffffff..)");
    }
}
