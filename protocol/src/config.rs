//! # Ledger Configuration & Constants
//!
//! Every magic number the escrow ledger depends on lives here: state key
//! names, the confirmation fee, argument limits, and node defaults.
//!
//! The state key names and status tags are part of the persisted layout.
//! Changing them after deployment orphans every record already written, so
//! treat them as frozen.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the persisted record layout. Bump when `EscrowRecord`
/// encoding changes in a way older readers cannot decode.
pub const RECORD_LAYOUT_VERSION: u16 = 1;

/// The full crate version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Account addresses on the host ledger are raw 32-byte public keys.
pub const ADDRESS_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Global State Keys
// ---------------------------------------------------------------------------

/// Key holding the next escrow id to assign (8-byte big-endian u64).
pub const ESCROW_COUNTER_KEY: &[u8] = b"escrow_counter";

/// Prefix of every escrow record key. The full key is this prefix followed
/// by the escrow id as 8 big-endian bytes.
pub const ESCROW_KEY_PREFIX: &[u8] = b"escrow_";

/// Prefix of denylist membership keys. The full key is this prefix followed
/// by the 32 raw address bytes. Only key presence is meaningful.
pub const DENYLIST_KEY_PREFIX: &[u8] = b"blacklist";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Operation name for opening a new escrow.
pub const INITIATE_ESCROW_NAME: &str = "initiate_escrow";

/// Operation name for the buyer's delivery confirmation.
pub const CONFIRM_DELIVERY_NAME: &str = "confirm_delivery";

/// `initiate_escrow` as it appears in the first application argument.
pub const OP_INITIATE_ESCROW: &[u8] = INITIATE_ESCROW_NAME.as_bytes();

/// `confirm_delivery` as it appears in the first application argument.
pub const OP_CONFIRM_DELIVERY: &[u8] = CONFIRM_DELIVERY_NAME.as_bytes();

/// Argument count for `initiate_escrow`: seller, product id, amount.
pub const INITIATE_ESCROW_ARITY: usize = 3;

/// Argument count for `confirm_delivery`: escrow id.
pub const CONFIRM_DELIVERY_ARITY: usize = 1;

/// Longest accepted product reference. The record codec stores the length
/// as a big-endian u16, so this must stay below `u16::MAX`.
pub const MAX_PRODUCT_ID_LENGTH: usize = 256;

/// Integer arguments are big-endian and at most this many bytes wide.
pub const MAX_INTEGER_ARG_LENGTH: usize = 8;

// ---------------------------------------------------------------------------
// Record Status Tags
// ---------------------------------------------------------------------------

/// Persisted tag of an escrow awaiting delivery confirmation.
pub const STATUS_TAG_PENDING: &[u8] = b"pending";

/// Persisted tag of a settled escrow.
pub const STATUS_TAG_COMPLETE: &[u8] = b"complete";

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Fee attached to the seller payout emitted by `confirm_delivery`, in the
/// host ledger's smallest fee unit.
pub const CONFIRM_DELIVERY_FEE: u64 = 1_000;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default data directory for the operator node.
pub const DEFAULT_DATA_DIR: &str = "~/.escrow";

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "escrow_node=info,escrow_contracts=info,escrow_protocol=info";
