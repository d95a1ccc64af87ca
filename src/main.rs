mod abi;
mod builder;
mod bundler;
mod config;
mod encoding;
mod error;
mod jsonrpc;
mod node;
mod owner;
mod paymaster;
mod retry;
mod signer;
mod types;

use anyhow::{Context, Result};
use bundler::BundlerClient;
use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigArgs};
use ethers::signers::Signer;
use node::NodeClient;
use owner::{OwnerAction, OwnerChange, Outcome, Peers};
use paymaster::PaymasterClient;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "kernel-owner-aa", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enable a new owner on the account's MultiECDSAValidator.
    Enable(EnableArgs),

    /// Disable an owner (by default the signing owner itself).
    Disable(DisableArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Build, sponsor and sign the UserOperation, but do not send it.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct EnableArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Owner address to enable.
    #[arg(long, env = "NEW_OWNER_ADDRESS")]
    owner: Option<String>,
}

#[derive(Args, Debug)]
struct DisableArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Owner address to disable. Defaults to the address of OLD_OWNER_PK.
    #[arg(long)]
    owner: Option<String>,
}

/// Printed instead of submitting when `--dry-run` is set.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DryRunReport {
    user_op_hash: String,
    user_operation: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // stdout carries only the result line.
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Enable(args) => cmd_enable(args).await,
        Command::Disable(args) => cmd_disable(args).await,
    }
}

async fn cmd_enable(args: EnableArgs) -> Result<()> {
    let cfg = args.common.config.validate()?;
    let owner = config::parse_address("NEW_OWNER_ADDRESS", args.owner.as_deref())?;
    let change = OwnerChange {
        action: OwnerAction::Enable,
        owner,
    };
    run(&cfg, change, args.common.dry_run).await
}

async fn cmd_disable(args: DisableArgs) -> Result<()> {
    let cfg = args.common.config.validate()?;
    let owner = match args.owner.as_deref() {
        Some(addr) => config::parse_address("--owner", Some(addr))?,
        None => cfg.owner.address(),
    };
    let change = OwnerChange {
        action: OwnerAction::Disable,
        owner,
    };
    run(&cfg, change, args.common.dry_run).await
}

async fn run(cfg: &Config, change: OwnerChange, dry_run: bool) -> Result<()> {
    let node = NodeClient::new(&cfg.rpc_url, cfg.retry)?;
    let chain_id = owner::resolve_chain_id(&node, cfg.chain_id)
        .await
        .context("failed to resolve chain id")?;

    let paymaster = PaymasterClient::new(
        cfg.paymaster_url.clone(),
        cfg.retry,
        cfg.sponsorship_policy_id.clone(),
    );
    let bundler = BundlerClient::new(cfg.bundler_url.clone(), cfg.retry);
    let peers = Peers {
        node: &node,
        paymaster: &paymaster,
        bundler: &bundler,
    };

    let outcome = owner::execute_owner_change(
        &cfg.target(chain_id),
        &peers,
        Some(&cfg.owner),
        change,
        dry_run,
    )
    .await
    .with_context(|| {
        format!(
            "failed to {} owner {:?}",
            change.action.function_name(),
            change.owner
        )
    })?;

    match outcome {
        Outcome::Submitted(hash) => println!("userOpHash: {}", encoding::fmt_h256(hash)),
        Outcome::DryRun(op) => {
            tracing::info!(user_op_hash = ?op.hash, "dry run complete");
            let report = DryRunReport {
                user_op_hash: encoding::fmt_h256(op.hash),
                user_operation: encoding::user_op_to_json(&op),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
