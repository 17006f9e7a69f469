// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Escrow Node
//!
//! Entry point for the `escrow-node` binary. Parses CLI arguments,
//! initializes logging, opens the ledger database, and runs one command
//! against it. Command results go to stdout as JSON; logs go to stderr.
//!
//! - `init`          - create the deployment and record the admin
//! - `initiate`      - open an escrow
//! - `confirm`       - confirm delivery and queue the seller payout
//! - `lifecycle`     - submit update/delete/opt-in/close-out/clear-state
//! - `show`/`status` - inspect records and deployment state
//! - `denylist`      - operator denylist administration
//! - `transfers`     - inspect or acknowledge queued payouts
//! - `advance-round` - move the host round forward
//! - `version`       - print build version information

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

use escrow_contracts::engine::{self, EngineConfig, Invocation, LifecycleEvent};
use escrow_contracts::host::{execute, DbHost, Receipt};
use escrow_contracts::EscrowRecord;
use escrow_protocol::storage::EscrowDB;
use escrow_protocol::Address;

use cli::{Commands, DenylistCommand, EscrowNodeCli, TransfersCommand};

fn main() -> Result<()> {
    let cli = EscrowNodeCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(&cli.log_filter, cli.log_format);

    let data_dir = expand_home(&cli.data_dir);
    let db = open_db(&data_dir)?;
    let mut host = DbHost::new(db);

    match cli.command {
        Commands::Init(args) => init_deployment(&host, args.admin),
        Commands::Initiate(args) => {
            let cfg = engine_config(&host)?;
            let inv = Invocation::initiate_escrow(
                args.caller,
                args.seller,
                args.product.as_bytes(),
                args.amount,
            );
            submit(&mut host, &cfg, inv)
        }
        Commands::Confirm(args) => {
            let cfg = engine_config(&host)?;
            submit(
                &mut host,
                &cfg,
                Invocation::confirm_delivery(args.caller, args.escrow_id),
            )
        }
        Commands::Lifecycle(args) => {
            let cfg = engine_config(&host)?;
            submit(
                &mut host,
                &cfg,
                Invocation::lifecycle(args.caller, args.event.into()),
            )
        }
        Commands::Show(args) => {
            let record = engine::escrow(host.db(), args.escrow_id)?
                .with_context(|| format!("escrow {} not found", args.escrow_id))?;
            print_json(&EscrowView::new(args.escrow_id, &record))
        }
        Commands::Status => status(&host),
        Commands::Denylist(cmd) => denylist(&host, cmd),
        Commands::Transfers(cmd) => transfers(&host, cmd),
        Commands::AdvanceRound(args) => {
            let round = host.db().advance_round(args.by)?;
            tracing::info!(round, "round advanced");
            print_json(&serde_json::json!({ "round": round }))
        }
        // Printed before logging init.
        Commands::Version => Ok(()),
    }
}

/// Opens (creating if needed) the ledger database under `data_dir`.
fn open_db(data_dir: &Path) -> Result<EscrowDB> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = EscrowDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "database opened");
    Ok(db)
}

/// Runs the creation lifecycle event and records the admin address in the
/// same commit.
fn init_deployment(host: &DbHost, admin: Address) -> Result<()> {
    if let Some(existing) = host.db().admin()? {
        bail!("deployment already initialized (admin {existing})");
    }

    let cfg = EngineConfig::new(admin);
    let round = host.db().current_round()?;
    let inv = Invocation::lifecycle(admin, LifecycleEvent::Creation);
    let transition = engine::apply(&cfg, &inv, round, host.db())?;
    host.db()
        .commit_bootstrap(&transition.writes, &admin)
        .context("failed to commit deployment creation")?;

    tracing::info!(admin = %admin, round, "deployment initialized");
    print_json(&Receipt {
        operation: transition.operation,
        round,
        escrow_id: transition.escrow_id,
        transfer: transition.transfer,
    })
}

/// Loads the engine configuration recorded by `init`.
fn engine_config(host: &DbHost) -> Result<EngineConfig> {
    match host.db().admin()? {
        Some(admin) => Ok(EngineConfig::new(admin)),
        None => bail!("deployment not initialized; run `escrow-node init --admin <address>` first"),
    }
}

/// Executes one invocation and prints its receipt.
fn submit(host: &mut DbHost, cfg: &EngineConfig, inv: Invocation) -> Result<()> {
    let receipt: Receipt = execute(host, cfg, &inv)?;
    print_json(&receipt)
}

fn status(host: &DbHost) -> Result<()> {
    let db = host.db();
    let pending = host.pending_transfers()?;
    print_json(&serde_json::json!({
        "admin": db.admin()?,
        "round": db.current_round()?,
        "escrow_count": engine::escrow_count(db)?,
        "pending_transfers": pending.len(),
    }))
}

fn denylist(host: &DbHost, cmd: DenylistCommand) -> Result<()> {
    let db = host.db();
    let (address, listed) = match cmd {
        DenylistCommand::Add { address } => {
            db.deny(&address)?;
            (address, true)
        }
        DenylistCommand::Remove { address } => {
            db.allow(&address)?;
            (address, false)
        }
        DenylistCommand::Check { address } => (address, engine::is_denylisted(db, &address)?),
    };
    db.flush()?;
    print_json(&serde_json::json!({ "address": address, "denylisted": listed }))
}

fn transfers(host: &DbHost, cmd: TransfersCommand) -> Result<()> {
    match cmd {
        TransfersCommand::List => {
            let entries: Vec<_> = host
                .pending_transfers()?
                .into_iter()
                .map(|(seq, t)| serde_json::json!({ "seq": seq, "transfer": t }))
                .collect();
            print_json(&entries)
        }
        TransfersCommand::Ack { seq } => {
            host.db().acknowledge_transfer(seq)?;
            host.db().flush()?;
            tracing::info!(seq, "payout acknowledged");
            print_json(&serde_json::json!({ "acknowledged": seq }))
        }
    }
}

/// JSON shape of a record for operators.
#[derive(Debug, Serialize)]
struct EscrowView {
    escrow_id: u64,
    buyer: Address,
    seller: Address,
    amount: u64,
    product_id: String,
    product_id_hex: String,
    created_round: u64,
    status: escrow_contracts::EscrowStatus,
}

impl EscrowView {
    fn new(escrow_id: u64, record: &EscrowRecord) -> Self {
        Self {
            escrow_id,
            buyer: record.buyer,
            seller: record.seller,
            amount: record.amount,
            product_id: String::from_utf8_lossy(&record.product_id).into_owned(),
            product_id_hex: hex::encode(&record.product_id),
            created_round: record.created_round,
            status: record.status,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{out}");
    Ok(())
}

/// Expands a leading `~` to `$HOME`.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("escrow-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", escrow_protocol::config::PROTOCOL_VERSION);
    println!(
        "layout      v{}",
        escrow_protocol::config::RECORD_LAYOUT_VERSION
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_protocol::storage::{StateKey, StateView};

    const ADMIN: Address = Address::new([0xAD; 32]);
    const BUYER: Address = Address::new([0xB0; 32]);
    const SELLER: Address = Address::new([0x5E; 32]);

    fn temp_host() -> DbHost {
        DbHost::new(EscrowDB::open_temporary().unwrap())
    }

    #[test]
    fn init_records_admin_once() {
        let host = temp_host();
        init_deployment(&host, ADMIN).unwrap();
        assert_eq!(host.db().admin().unwrap(), Some(ADMIN));
        assert_eq!(engine::escrow_count(host.db()).unwrap(), 0);

        assert!(init_deployment(&host, BUYER).is_err());
        assert_eq!(host.db().admin().unwrap(), Some(ADMIN));
    }

    #[test]
    fn init_commits_counter_and_admin_together() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let host = DbHost::new(EscrowDB::open_synchronous(dir.path()).unwrap());
            init_deployment(&host, ADMIN).unwrap();
        }

        let host = DbHost::new(EscrowDB::open_synchronous(dir.path()).unwrap());
        assert_eq!(host.db().admin().unwrap(), Some(ADMIN));
        assert_eq!(host.db().get_u64(&StateKey::Counter.to_bytes()).unwrap(), Some(0));
    }

    #[test]
    fn commands_require_init() {
        let host = temp_host();
        assert!(engine_config(&host).is_err());
    }

    #[test]
    fn submit_runs_against_database() {
        let mut host = temp_host();
        init_deployment(&host, ADMIN).unwrap();
        let cfg = engine_config(&host).unwrap();

        submit(
            &mut host,
            &cfg,
            Invocation::initiate_escrow(BUYER, SELLER, b"p1", 500),
        )
        .unwrap();
        submit(&mut host, &cfg, Invocation::confirm_delivery(BUYER, 0)).unwrap();

        assert_eq!(host.pending_transfers().unwrap().len(), 1);
        assert!(submit(&mut host, &cfg, Invocation::confirm_delivery(BUYER, 0)).is_err());
    }

    #[test]
    fn escrow_view_renders_product_text_and_hex() {
        let record = EscrowRecord::open(BUYER, SELLER, 5, b"p1".to_vec(), 3);
        let view = EscrowView::new(0, &record);
        assert_eq!(view.product_id, "p1");
        assert_eq!(view.product_id_hex, "7031");
    }

    #[test]
    fn expand_home_only_touches_tilde_prefix() {
        let abs = PathBuf::from("/var/lib/escrow");
        assert_eq!(expand_home(&abs), abs);
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/.escrow")),
                PathBuf::from(home).join(".escrow")
            );
        }
    }
}
