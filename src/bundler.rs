use crate::encoding::{self, parse_h256};
use crate::error::PipelineError;
use crate::jsonrpc::{JsonRpcClient, RpcError};
use crate::retry::RetryPolicy;
use crate::types::{SignedUserOperation, UserOperation};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Address, H256};
use serde_json::Value;

/// An ERC-4337 bundler.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn send_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, RpcError>;

    /// `true` if the bundler already tracks an operation with this hash.
    async fn knows_user_operation(&self, user_op_hash: H256) -> Result<bool, RpcError>;
}

#[derive(Debug, Clone)]
pub struct BundlerClient {
    rpc: JsonRpcClient,
}

impl BundlerClient {
    pub fn new(url: String, policy: RetryPolicy) -> Self {
        Self {
            rpc: JsonRpcClient::new(url, policy),
        }
    }
}

#[async_trait]
impl Bundler for BundlerClient {
    async fn send_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, RpcError> {
        let params = serde_json::json!([
            encoding::user_op_to_json(user_op),
            encoding::fmt_address(entry_point)
        ]);
        // Never re-sent blindly; `submit` reconciles through the hash instead.
        let res = self.rpc.request_once("eth_sendUserOperation", params).await?;
        decode_send_result(&res)
    }

    async fn knows_user_operation(&self, user_op_hash: H256) -> Result<bool, RpcError> {
        let params = serde_json::json!([encoding::fmt_h256(user_op_hash)]);
        let res = self.rpc.request("eth_getUserOperationByHash", params).await?;
        Ok(user_operation_found(&res))
    }
}

fn decode_send_result(res: &Value) -> Result<H256, RpcError> {
    parse_userop_hash(res).map_err(|e| RpcError::Decode(e.to_string()))
}

/// `eth_getUserOperationByHash` answers `null` for operations the bundler does not hold.
fn user_operation_found(res: &Value) -> bool {
    !res.is_null()
}

fn parse_userop_hash(res: &Value) -> Result<H256> {
    // Most bundlers return the userOpHash directly as a JSON string; some wrap it.
    let hash_str = if let Some(s) = res.as_str() {
        s
    } else if let Some(s) = res.get("result").and_then(|v| v.as_str()) {
        s
    } else if let Some(s) = res.get("userOpHash").and_then(|v| v.as_str()) {
        s
    } else if let Some(s) = res.get("userOperationHash").and_then(|v| v.as_str()) {
        s
    } else {
        return Err(anyhow!(
            "unexpected eth_sendUserOperation result shape: {}",
            res
        ));
    };

    parse_h256(hash_str)
}

/// Submits a signed operation and returns the bundler's tracking hash.
///
/// The send is attempted once. If it is lost in transit, the bundler is asked whether it
/// already holds the operation under its locally computed hash.
pub async fn submit<B: Bundler + ?Sized>(
    bundler: &B,
    entry_point: Address,
    op: &SignedUserOperation,
) -> Result<H256, PipelineError> {
    if op.has_placeholder_signature() {
        return Err(PipelineError::SubmissionRejected(
            "refusing to submit an operation carrying the placeholder signature".to_string(),
        ));
    }

    match bundler.send_user_operation(op, entry_point).await {
        Ok(hash) => {
            if hash != op.hash {
                tracing::warn!(
                    bundler_hash = ?hash,
                    local_hash = ?op.hash,
                    "bundler returned a different userOpHash than computed locally"
                );
            }
            tracing::info!(user_op_hash = ?hash, "user operation submitted");
            Ok(hash)
        }
        Err(e) if e.is_transient() => {
            tracing::warn!(
                error = %e,
                local_hash = ?op.hash,
                "send failed in transit; checking bundler"
            );
            match bundler.knows_user_operation(op.hash).await {
                Ok(true) => {
                    tracing::info!(user_op_hash = ?op.hash, "bundler already holds user operation");
                    Ok(op.hash)
                }
                Ok(false) => Err(PipelineError::SubmissionRejected(e.to_string())),
                Err(lookup) => Err(PipelineError::SubmissionRejected(format!(
                    "{e}; lookup by hash also failed: {lookup}"
                ))),
            }
        }
        Err(e) => Err(PipelineError::SubmissionRejected(e.to_string())),
    }
}
