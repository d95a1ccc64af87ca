use thiserror::Error;

/// Failure of one stage of the owner-change pipeline.
///
/// Every variant is terminal: the pipeline aborts on the first one and discards the draft.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed credentials, addresses or endpoints.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The interface descriptor has no function with this name.
    #[error("function \"{0}\" not found in ABI definition")]
    UnknownFunction(String),

    /// The function exists but the arguments do not fit its inputs.
    #[error("failed to encode call to {function}: {inner}")]
    AbiEncoding { function: String, inner: String },

    /// Nonce, fee or chain id read from the RPC node failed.
    #[error("network read failed ({what}): {inner}")]
    NetworkRead { what: &'static str, inner: String },

    #[error("paymaster declined sponsorship: {0}")]
    SponsorshipDenied(String),

    /// A gas limit was still zero when the operation reached hashing.
    #[error("user operation has not been sponsored: {field} is zero")]
    NotSponsored { field: &'static str },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("bundler rejected user operation: {0}")]
    SubmissionRejected(String),
}
