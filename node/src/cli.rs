//! # CLI Interface
//!
//! Defines the command-line argument structure for `escrow-node` using
//! `clap` derive. The node hosts one escrow deployment in a local sled
//! database and plays the host ledger's part: it supplies the round,
//! authenticates nobody (the `--caller` flag is trusted), commits state
//! atomically, and queues payouts in an outbox.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use escrow_contracts::LifecycleEvent;
use escrow_protocol::config::{DEFAULT_DATA_DIR, DEFAULT_LOG_FILTER};
use escrow_protocol::Address;

use crate::logging::LogFormat;

/// Trade escrow ledger node.
#[derive(Parser, Debug)]
#[command(
    name = "escrow-node",
    about = "Two-party trade escrow ledger",
    version,
    propagate_version = true
)]
pub struct EscrowNodeCli {
    /// Path to the data directory holding the ledger database.
    #[arg(long, short = 'd', env = "ESCROW_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, env = "ESCROW_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "ESCROW_LOG", default_value = DEFAULT_LOG_FILTER, global = true)]
    pub log_filter: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the deployment: initialize the escrow counter and record the
    /// admin address.
    Init(InitArgs),
    /// Open a new escrow as the buyer.
    Initiate(InitiateArgs),
    /// Confirm delivery of an escrow and release payment to the seller.
    Confirm(ConfirmArgs),
    /// Submit a deployment lifecycle event.
    Lifecycle(LifecycleArgs),
    /// Print one escrow record.
    Show(ShowArgs),
    /// Print deployment status.
    Status,
    /// Administer the denylist.
    #[command(subcommand)]
    Denylist(DenylistCommand),
    /// Inspect or acknowledge queued payouts.
    #[command(subcommand)]
    Transfers(TransfersCommand),
    /// Move the host round forward.
    AdvanceRound(AdvanceRoundArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for `init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Hex-encoded admin address, allowed to update or delete the deployment.
    #[arg(long, env = "ESCROW_ADMIN")]
    pub admin: Address,
}

/// Arguments for `initiate`.
#[derive(Args, Debug)]
pub struct InitiateArgs {
    /// Hex-encoded buyer address submitting the call.
    #[arg(long)]
    pub caller: Address,

    /// Hex-encoded seller address.
    #[arg(long)]
    pub seller: Address,

    /// Product reference, stored verbatim.
    #[arg(long)]
    pub product: String,

    /// Amount to lock, in the smallest currency unit.
    #[arg(long)]
    pub amount: u64,
}

/// Arguments for `confirm`.
#[derive(Args, Debug)]
pub struct ConfirmArgs {
    /// Hex-encoded address submitting the call.
    #[arg(long)]
    pub caller: Address,

    /// Escrow to confirm.
    #[arg(long)]
    pub escrow_id: u64,
}

/// Lifecycle events an operator can submit. Creation is `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LifecycleKind {
    Update,
    Delete,
    OptIn,
    CloseOut,
    ClearState,
}

impl From<LifecycleKind> for LifecycleEvent {
    fn from(kind: LifecycleKind) -> Self {
        match kind {
            LifecycleKind::Update => LifecycleEvent::Update,
            LifecycleKind::Delete => LifecycleEvent::Deletion,
            LifecycleKind::OptIn => LifecycleEvent::OptIn,
            LifecycleKind::CloseOut => LifecycleEvent::CloseOut,
            LifecycleKind::ClearState => LifecycleEvent::ClearState,
        }
    }
}

/// Arguments for `lifecycle`.
#[derive(Args, Debug)]
pub struct LifecycleArgs {
    /// Hex-encoded address submitting the call.
    #[arg(long)]
    pub caller: Address,

    /// Event to submit.
    #[arg(value_enum)]
    pub event: LifecycleKind,
}

/// Arguments for `show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Escrow id.
    pub escrow_id: u64,
}

/// Denylist administration.
#[derive(Subcommand, Debug)]
pub enum DenylistCommand {
    /// Bar an address from opening escrows as buyer or seller.
    Add {
        /// Hex-encoded address.
        address: Address,
    },
    /// Lift a bar.
    Remove {
        /// Hex-encoded address.
        address: Address,
    },
    /// Report whether an address is listed.
    Check {
        /// Hex-encoded address.
        address: Address,
    },
}

/// Payout outbox commands.
#[derive(Subcommand, Debug)]
pub enum TransfersCommand {
    /// List queued payouts.
    List,
    /// Mark a payout as executed by the payment rail.
    Ack {
        /// Outbox sequence number.
        seq: u64,
    },
}

/// Arguments for `advance-round`.
#[derive(Args, Debug)]
pub struct AdvanceRoundArgs {
    /// Number of rounds to advance.
    #[arg(default_value_t = 1)]
    pub by: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        EscrowNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_initiate() {
        let seller = "5e".repeat(32);
        let caller = "b0".repeat(32);
        let cli = EscrowNodeCli::try_parse_from([
            "escrow-node",
            "--data-dir",
            "/tmp/x",
            "initiate",
            "--caller",
            &caller,
            "--seller",
            &seller,
            "--product",
            "p1",
            "--amount",
            "500",
        ])
        .unwrap();

        match cli.command {
            Commands::Initiate(args) => {
                assert_eq!(args.seller, Address::new([0x5E; 32]));
                assert_eq!(args.caller, Address::new([0xB0; 32]));
                assert_eq!(args.amount, 500);
                assert_eq!(args.product, "p1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_short_address() {
        let result = EscrowNodeCli::try_parse_from([
            "escrow-node",
            "confirm",
            "--caller",
            "abcd",
            "--escrow-id",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn lifecycle_kinds_map_to_events() {
        assert_eq!(
            LifecycleEvent::from(LifecycleKind::Delete),
            LifecycleEvent::Deletion
        );
        assert_eq!(
            LifecycleEvent::from(LifecycleKind::ClearState),
            LifecycleEvent::ClearState
        );
    }
}
