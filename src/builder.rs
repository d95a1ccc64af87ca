use crate::abi;
use crate::error::PipelineError;
use crate::node::ChainReader;
use crate::types::{dummy_signature, UserOperation};
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, U256};

/// A call the smart account itself executes, encoded against the account interface.
#[derive(Debug, Clone)]
pub struct AccountCall {
    pub function: String,
    pub args: Vec<Token>,
}

impl AccountCall {
    pub fn new(function: impl Into<String>, args: Vec<Token>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}

/// Drafts a UserOperation for `account`: fresh nonce, current fees, placeholder signature.
///
/// Gas limits stay zero; the paymaster fills them in.
pub async fn build<R: ChainReader + ?Sized>(
    reader: &R,
    account_interface: &Abi,
    account: Address,
    entry_point: Address,
    call: &AccountCall,
) -> Result<UserOperation, PipelineError> {
    let call_data = abi::encode(account_interface, &call.function, &call.args)?;

    let nonce = reader.get_nonce(account, entry_point).await?;
    let fees = reader.fee_estimate().await?;

    if fees.max_fee_per_gas.is_none() || fees.max_priority_fee_per_gas.is_none() {
        tracing::warn!(
            max_fee_per_gas = ?fees.max_fee_per_gas,
            max_priority_fee_per_gas = ?fees.max_priority_fee_per_gas,
            "fee estimate incomplete; defaulting missing fields to zero"
        );
    }

    let op = UserOperation {
        sender: account,
        nonce,
        init_code: Bytes::default(),
        call_data,
        call_gas_limit: U256::zero(),
        verification_gas_limit: U256::zero(),
        pre_verification_gas: U256::zero(),
        max_fee_per_gas: fees.max_fee_per_gas.unwrap_or_default(),
        max_priority_fee_per_gas: fees.max_priority_fee_per_gas.unwrap_or_default(),
        paymaster_and_data: Bytes::default(),
        signature: dummy_signature(),
    };

    tracing::info!(sender = ?op.sender, nonce = %op.nonce, "drafted user operation");
    Ok(op)
}
