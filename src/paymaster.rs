use crate::encoding;
use crate::error::PipelineError;
use crate::jsonrpc::JsonRpcClient;
use crate::retry::RetryPolicy;
use crate::types::UserOperation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use serde_json::Value;

/// Gas limits and sponsor data quoted by the paymaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorshipResult {
    pub paymaster_and_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

/// A gas-sponsorship service. A quote is stateless, so re-requesting it is safe.
#[async_trait]
pub trait Sponsor: Send + Sync {
    async fn sponsor_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<SponsorshipResult, PipelineError>;
}

/// Pimlico-style `pm_sponsorUserOperation` client.
#[derive(Debug, Clone)]
pub struct PaymasterClient {
    rpc: JsonRpcClient,
    sponsorship_policy_id: Option<String>,
}

impl PaymasterClient {
    pub fn new(url: String, policy: RetryPolicy, sponsorship_policy_id: Option<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url, policy),
            sponsorship_policy_id,
        }
    }
}

#[async_trait]
impl Sponsor for PaymasterClient {
    async fn sponsor_user_operation(
        &self,
        user_op: &UserOperation,
        entry_point: Address,
    ) -> Result<SponsorshipResult, PipelineError> {
        let params = build_params(
            encoding::user_op_to_json(user_op),
            entry_point,
            self.sponsorship_policy_id.as_deref(),
        );
        let res = self
            .rpc
            .request("pm_sponsorUserOperation", params)
            .await
            .map_err(|e| PipelineError::SponsorshipDenied(e.to_string()))?;

        parse_sponsorship(&res).map_err(|e| PipelineError::SponsorshipDenied(format!("{e:#}")))
    }
}

fn build_params(user_op: Value, entry_point: Address, policy_id: Option<&str>) -> Value {
    match policy_id {
        Some(id) => serde_json::json!([
            user_op,
            encoding::fmt_address(entry_point),
            { "sponsorshipPolicyId": id }
        ]),
        None => serde_json::json!([user_op, encoding::fmt_address(entry_point)]),
    }
}

fn parse_sponsorship(result: &Value) -> Result<SponsorshipResult> {
    Ok(SponsorshipResult {
        paymaster_and_data: encoding::bytes_field(result, "paymasterAndData")
            .context("invalid paymasterAndData")?,
        call_gas_limit: encoding::u256_field(result, "callGasLimit")?,
        verification_gas_limit: encoding::u256_field(result, "verificationGasLimit")?,
        pre_verification_gas: encoding::u256_field(result, "preVerificationGas")?,
    })
}

/// Requests sponsorship for a draft and merges the quote into it.
pub async fn sponsor<S: Sponsor + ?Sized>(
    paymaster: &S,
    entry_point: Address,
    mut draft: UserOperation,
) -> Result<UserOperation, PipelineError> {
    let quote = paymaster.sponsor_user_operation(&draft, entry_point).await?;

    if quote.paymaster_and_data.is_empty() {
        return Err(PipelineError::SponsorshipDenied(
            "paymaster returned empty paymasterAndData".to_string(),
        ));
    }

    draft.paymaster_and_data = quote.paymaster_and_data;
    draft.call_gas_limit = quote.call_gas_limit;
    draft.verification_gas_limit = quote.verification_gas_limit;
    draft.pre_verification_gas = quote.pre_verification_gas;

    tracing::info!(
        call_gas_limit = %draft.call_gas_limit,
        verification_gas_limit = %draft.verification_gas_limit,
        pre_verification_gas = %draft.pre_verification_gas,
        "user operation sponsored"
    );
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::dummy_signature;
    use serde_json::json;

    struct Quote(SponsorshipResult);

    #[async_trait]
    impl Sponsor for Quote {
        async fn sponsor_user_operation(
            &self,
            user_op: &UserOperation,
            _: Address,
        ) -> Result<SponsorshipResult, PipelineError> {
            assert!(user_op.has_placeholder_signature());
            Ok(self.0.clone())
        }
    }

    struct Declines;

    #[async_trait]
    impl Sponsor for Declines {
        async fn sponsor_user_operation(
            &self,
            _: &UserOperation,
            _: Address,
        ) -> Result<SponsorshipResult, PipelineError> {
            Err(PipelineError::SponsorshipDenied("account not eligible".to_string()))
        }
    }

    fn draft() -> UserOperation {
        UserOperation {
            nonce: U256::from(3u64),
            call_data: Bytes::from(vec![0x01]),
            signature: dummy_signature(),
            ..Default::default()
        }
    }

    fn quote() -> SponsorshipResult {
        SponsorshipResult {
            paymaster_and_data: Bytes::from(vec![0xaa]),
            call_gas_limit: U256::from(50_000u64),
            verification_gas_limit: U256::from(70_000u64),
            pre_verification_gas: U256::from(21_000u64),
        }
    }

    #[test]
    fn parse_sponsorship_hex_fields() {
        let res = json!({
            "paymasterAndData": "0xaa",
            "callGasLimit": "0xc350",
            "verificationGasLimit": "0x11170",
            "preVerificationGas": "0x5208",
        });
        assert_eq!(parse_sponsorship(&res).unwrap(), quote());
    }

    #[test]
    fn parse_sponsorship_missing_field() {
        let res = json!({ "paymasterAndData": "0xaa", "callGasLimit": "0x1" });
        assert!(parse_sponsorship(&res).is_err());
    }

    #[test]
    fn params_include_policy_only_when_configured() {
        let ep = Address::from([0xe0; 20]);
        let without = build_params(json!({}), ep, None);
        assert_eq!(without.as_array().unwrap().len(), 2);
        assert_eq!(without[1], encoding::fmt_address(ep));

        let with = build_params(json!({}), ep, Some("sp_test"));
        assert_eq!(with[2]["sponsorshipPolicyId"], "sp_test");
    }

    #[tokio::test]
    async fn sponsor_merges_quote_and_keeps_the_rest() {
        let out = sponsor(&Quote(quote()), Address::zero(), draft()).await.unwrap();
        assert_eq!(out.paymaster_and_data, Bytes::from(vec![0xaa]));
        assert_eq!(out.call_gas_limit, U256::from(50_000u64));
        assert_eq!(out.verification_gas_limit, U256::from(70_000u64));
        assert_eq!(out.pre_verification_gas, U256::from(21_000u64));
        assert_eq!(out.nonce, draft().nonce);
        assert_eq!(out.call_data, draft().call_data);
        assert!(out.has_placeholder_signature());
    }

    #[tokio::test]
    async fn denial_is_terminal() {
        let err = sponsor(&Declines, Address::zero(), draft()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SponsorshipDenied(_)));
    }

    #[tokio::test]
    async fn empty_paymaster_data_is_a_denial() {
        let mut q = quote();
        q.paymaster_and_data = Bytes::default();
        let err = sponsor(&Quote(q), Address::zero(), draft()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SponsorshipDenied(_)));
    }
}
