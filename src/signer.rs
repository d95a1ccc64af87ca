use crate::error::PipelineError;
use crate::types::{SignedUserOperation, UserOperation};
use ethers::signers::Signer;
use ethers::types::{Address, Bytes};

/// Rejects operations that have not been through sponsorship. The hash commits to the gas
/// limits.
pub fn ensure_sponsored(op: &UserOperation) -> Result<(), PipelineError> {
    let limits = [
        ("callGasLimit", op.call_gas_limit),
        ("verificationGasLimit", op.verification_gas_limit),
        ("preVerificationGas", op.pre_verification_gas),
    ];
    for (field, value) in limits {
        if value.is_zero() {
            return Err(PipelineError::NotSponsored { field });
        }
    }
    Ok(())
}

/// Hashes the fully-filled operation for `entry_point` on `chain_id` and replaces the
/// placeholder signature with the owner's EIP-191 signature over the raw hash bytes.
pub async fn finalize<S: Signer>(
    mut op: UserOperation,
    entry_point: Address,
    chain_id: u64,
    signer: Option<&S>,
) -> Result<SignedUserOperation, PipelineError> {
    ensure_sponsored(&op)?;

    let signer = signer
        .ok_or_else(|| PipelineError::Signing("no owner key material configured".to_string()))?;

    let hash = op.hash(entry_point, chain_id);
    let sig = signer
        .sign_message(hash.as_bytes())
        .await
        .map_err(|e| PipelineError::Signing(e.to_string()))?;

    op.signature = Bytes::from(sig.to_vec());
    tracing::info!(user_op_hash = ?hash, signer = ?signer.address(), "user operation signed");

    Ok(SignedUserOperation {
        hash,
        user_operation: op,
    })
}
