//! Owner administration of a Kernel account through its MultiECDSAValidator, run as one
//! sponsored UserOperation: encode → build → sponsor → sign → submit.

use crate::abi::{self, KERNEL_ABI, MULTI_ECDSA_VALIDATOR_ABI};
use crate::builder::{self, AccountCall};
use crate::bundler::{self, Bundler};
use crate::encoding;
use crate::error::PipelineError;
use crate::node::ChainReader;
use crate::paymaster::{self, Sponsor};
use crate::signer;
use crate::types::SignedUserOperation;
use ethers::abi::Token;
use ethers::signers::Signer;
use ethers::types::{Address, H256, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerAction {
    Enable,
    Disable,
}

impl OwnerAction {
    pub fn function_name(self) -> &'static str {
        match self {
            OwnerAction::Enable => "enable",
            OwnerAction::Disable => "disable",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OwnerChange {
    pub action: OwnerAction,
    pub owner: Address,
}

/// Addresses and chain the operation is bound to.
#[derive(Debug, Clone, Copy)]
pub struct AccountTarget {
    pub entry_point: Address,
    pub account: Address,
    pub validator: Address,
    pub chain_id: u64,
}

/// Remote peers of the pipeline.
pub struct Peers<'a> {
    pub node: &'a dyn ChainReader,
    pub paymaster: &'a dyn Sponsor,
    pub bundler: &'a dyn Bundler,
}

#[derive(Debug)]
pub enum Outcome {
    Submitted(H256),
    /// Signed but not sent.
    DryRun(SignedUserOperation),
}

/// `execute(validator, 0, validator.enable|disable(owner))`.
pub fn owner_change_call(
    validator: Address,
    change: OwnerChange,
) -> Result<AccountCall, PipelineError> {
    let validator_abi = abi::parse_interface(MULTI_ECDSA_VALIDATOR_ABI)?;
    let inner = abi::encode(
        &validator_abi,
        change.action.function_name(),
        &[Token::Address(change.owner)],
    )?;

    Ok(AccountCall::new(
        "execute",
        vec![
            Token::Address(validator),
            Token::Uint(U256::zero()),
            Token::Bytes(inner.to_vec()),
        ],
    ))
}

/// Uses the configured chain id when present, after checking it against the node.
pub async fn resolve_chain_id(
    node: &dyn ChainReader,
    configured: Option<u64>,
) -> Result<u64, PipelineError> {
    let remote = node.chain_id().await?;
    match configured {
        Some(id) if id != remote => Err(PipelineError::Configuration(format!(
            "chainId mismatch: configured {id}, RPC returned {remote}"
        ))),
        _ => Ok(remote),
    }
}

pub async fn execute_owner_change<S: Signer>(
    target: &AccountTarget,
    peers: &Peers<'_>,
    signer: Option<&S>,
    change: OwnerChange,
    dry_run: bool,
) -> Result<Outcome, PipelineError> {
    tracing::info!(
        action = change.action.function_name(),
        owner = ?change.owner,
        account = ?target.account,
        chain_id = target.chain_id,
        "starting owner change"
    );

    let call = owner_change_call(target.validator, change)?;
    let kernel_abi = abi::parse_interface(KERNEL_ABI)?;

    let draft = builder::build(
        peers.node,
        &kernel_abi,
        target.account,
        target.entry_point,
        &call,
    )
    .await?;
    tracing::debug!(user_op = %encoding::user_op_to_json(&draft), "draft user operation");

    let sponsored = paymaster::sponsor(peers.paymaster, target.entry_point, draft).await?;
    let signed =
        signer::finalize(sponsored, target.entry_point, target.chain_id, signer).await?;
    tracing::debug!(user_op = %encoding::user_op_to_json(&signed), "signed user operation");

    if dry_run {
        tracing::info!("dry run: not sending user operation");
        return Ok(Outcome::DryRun(signed));
    }

    let hash = bundler::submit(peers.bundler, target.entry_point, &signed).await?;
    Ok(Outcome::Submitted(hash))
}
