use crate::abi;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use ethers::prelude::*;
use std::sync::Arc;

/// EIP-1559 fee snapshot. A field is `None` when the node could not provide it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// Read-only chain queries needed to draft a UserOperation.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64, PipelineError>;

    /// `EntryPoint.getNonce(account, 0)`.
    async fn get_nonce(&self, account: Address, entry_point: Address)
        -> Result<U256, PipelineError>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, PipelineError>;
}

const ENTRY_POINT_NONCE_ABI: &[&str] =
    &["function getNonce(address sender, uint192 key) view returns (uint256)"];

/// `ChainReader` backed by an ethers HTTP provider.
#[derive(Debug, Clone)]
pub struct NodeClient {
    provider: Arc<Provider<Http>>,
    policy: RetryPolicy,
}

impl NodeClient {
    pub fn new(rpc_url: &str, policy: RetryPolicy) -> Result<Self, PipelineError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| PipelineError::Configuration(format!("invalid RPC url {rpc_url}: {e}")))?;
        Ok(Self {
            provider: Arc::new(provider),
            policy,
        })
    }

    async fn max_priority_fee(&self) -> Option<U256> {
        let res = self
            .policy
            .run("eth_maxPriorityFeePerGas", is_transient, || {
                self.provider
                    .request::<[(); 0], U256>("eth_maxPriorityFeePerGas", [])
            })
            .await;
        match res {
            Ok(fee) => Some(fee),
            Err(e) => {
                tracing::warn!(error = %e, "node did not return maxPriorityFeePerGas");
                None
            }
        }
    }
}

/// Transport failures and unreadable bodies (typically a gateway error page) are retried.
/// A JSON-RPC error object is the node's answer and is final.
fn is_transient(err: &ProviderError) -> bool {
    match err {
        ProviderError::HTTPError(_) => true,
        ProviderError::JsonRpcClientError(e) => e.as_error_response().is_none(),
        _ => false,
    }
}

fn is_transient_call(err: &ContractError<Provider<Http>>) -> bool {
    match err {
        ContractError::MiddlewareError { e } => is_transient(e),
        ContractError::ProviderError { e } => is_transient(e),
        _ => false,
    }
}

#[async_trait]
impl ChainReader for NodeClient {
    async fn chain_id(&self) -> Result<u64, PipelineError> {
        let id = self
            .policy
            .run("eth_chainId", is_transient, || self.provider.get_chainid())
            .await
            .map_err(|e| PipelineError::NetworkRead {
                what: "chain id",
                inner: e.to_string(),
            })?;
        Ok(id.as_u64())
    }

    async fn get_nonce(
        &self,
        account: Address,
        entry_point: Address,
    ) -> Result<U256, PipelineError> {
        let entry_point_abi = abi::parse_interface(ENTRY_POINT_NONCE_ABI)?;
        let entry_point_c = Contract::new(entry_point, entry_point_abi, self.provider.clone());
        let call = entry_point_c
            .method::<_, U256>("getNonce", (account, U256::zero()))
            .map_err(|e| PipelineError::AbiEncoding {
                function: "getNonce".to_string(),
                inner: e.to_string(),
            })?;

        self.policy
            .run("entryPoint.getNonce", is_transient_call, || call.call())
            .await
            .map_err(|e| PipelineError::NetworkRead {
                what: "entryPoint.getNonce",
                inner: e.to_string(),
            })
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, PipelineError> {
        let block = self
            .policy
            .run("eth_getBlockByNumber", is_transient, || {
                self.provider.get_block(BlockNumber::Latest)
            })
            .await
            .map_err(|e| PipelineError::NetworkRead {
                what: "latest block",
                inner: e.to_string(),
            })?
            .ok_or_else(|| PipelineError::NetworkRead {
                what: "latest block",
                inner: "node returned no block".to_string(),
            })?;

        let base_fee = block.base_fee_per_gas;
        let priority = if base_fee.is_some() {
            self.max_priority_fee().await
        } else {
            None
        };
        Ok(fees_from(base_fee, priority))
    }
}

/// maxFeePerGas = 1.2 * baseFee + priority. Legacy chains without a base fee yield no
/// estimate at all.
pub fn fees_from(base_fee: Option<U256>, priority: Option<U256>) -> FeeEstimate {
    let Some(base_fee) = base_fee else {
        return FeeEstimate::default();
    };
    let max_fee = base_fee * U256::from(120u64) / U256::from(100u64) + priority.unwrap_or_default();
    FeeEstimate {
        max_fee_per_gas: Some(max_fee),
        max_priority_fee_per_gas: priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fees_add_priority_to_buffered_base_fee() {
        let fees = fees_from(Some(U256::from(1_000u64)), Some(U256::from(10u64)));
        assert_eq!(fees.max_fee_per_gas, Some(U256::from(1_210u64)));
        assert_eq!(fees.max_priority_fee_per_gas, Some(U256::from(10u64)));
    }

    #[test]
    fn missing_priority_fee_is_left_empty() {
        let fees = fees_from(Some(U256::from(100u64)), None);
        assert_eq!(fees.max_fee_per_gas, Some(U256::from(120u64)));
        assert_eq!(fees.max_priority_fee_per_gas, None);
    }

    #[test]
    fn legacy_chain_has_no_estimate() {
        assert_eq!(fees_from(None, Some(U256::one())), FeeEstimate::default());
    }

    fn rpc_error(code: i64, message: &str) -> ProviderError {
        ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        })))
    }

    #[test]
    fn rpc_error_objects_are_not_retried() {
        assert!(!is_transient(&rpc_error(-32601, "method not found")));
        assert!(!is_transient(&rpc_error(3, "execution reverted")));
        assert!(!is_transient(&ProviderError::CustomError("bad".to_string())));
    }

    #[test]
    fn unreadable_body_is_retried() {
        let err = serde_json::from_str::<serde_json::Value>("<html>502 Bad Gateway</html>")
            .unwrap_err();
        let err = ProviderError::JsonRpcClientError(Box::new(HttpClientError::SerdeJson {
            err,
            text: "<html>502 Bad Gateway</html>".to_string(),
        }));
        assert!(is_transient(&err));
    }

    #[test]
    fn contract_call_errors_use_the_provider_classification() {
        let terminal: ContractError<Provider<Http>> = ContractError::MiddlewareError {
            e: rpc_error(-32000, "header not found"),
        };
        assert!(!is_transient_call(&terminal));

        let reverted: ContractError<Provider<Http>> = ContractError::Revert(Bytes::default());
        assert!(!is_transient_call(&reverted));
    }

    #[tokio::test]
    async fn rpc_error_object_is_sent_once() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_delay: std::time::Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let counter = &calls;
        let err = policy
            .run("eth_chainId", is_transient, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<U256, _>(rpc_error(-32601, "method not found"))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("method not found"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_rpc_url_is_a_configuration_error() {
        let err = NodeClient::new("not a url", RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
