use crate::error::PipelineError;
use crate::owner::AccountTarget;
use crate::retry::RetryPolicy;
use clap::Args;
use ethers::signers::LocalWallet;
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;

/// Out-of-band configuration. Every field may come from the environment (or `.env`).
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Private key of the current (signing) owner, with or without 0x.
    #[arg(long, env = "OLD_OWNER_PK", hide_env_values = true)]
    pub owner_private_key: Option<String>,

    /// EntryPoint (v0.6) address.
    #[arg(long, env = "ENTRYPOINT_ADDRESS")]
    pub entrypoint: Option<String>,

    /// Kernel smart account address.
    #[arg(long, env = "KERNEL_ADDRESS")]
    pub kernel: Option<String>,

    /// MultiECDSAValidator module address.
    #[arg(long, env = "MULTIECDSAVALIDATOR_ADDRESS")]
    pub validator: Option<String>,

    /// Chain RPC URL.
    #[arg(long, env = "RPC")]
    pub rpc: Option<String>,

    /// Bundler RPC URL (must support ERC-4337 JSON-RPC methods).
    #[arg(long, env = "BUNDLER_RPC")]
    pub bundler: Option<String>,

    /// Paymaster RPC URL. Defaults to the bundler URL.
    #[arg(long, env = "PAYMASTER_RPC")]
    pub paymaster: Option<String>,

    /// Expected chain id; checked against the RPC node.
    #[arg(long, env = "CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Optional paymaster sponsorship policy.
    #[arg(long, env = "SPONSORSHIP_POLICY_ID")]
    pub sponsorship_policy_id: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Attempts for idempotent remote calls (reads and sponsorship quotes).
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,
}

/// Validated configuration, built once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub owner: LocalWallet,
    pub entry_point: Address,
    pub account: Address,
    pub validator: Address,
    pub rpc_url: String,
    pub bundler_url: String,
    pub paymaster_url: String,
    pub chain_id: Option<u64>,
    pub sponsorship_policy_id: Option<String>,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn target(&self, chain_id: u64) -> AccountTarget {
        AccountTarget {
            entry_point: self.entry_point,
            account: self.account,
            validator: self.validator,
            chain_id,
        }
    }
}

impl ConfigArgs {
    pub fn validate(&self) -> Result<Config, PipelineError> {
        let key = required("OLD_OWNER_PK", self.owner_private_key.as_deref())?;
        let owner = LocalWallet::from_str(key.strip_prefix("0x").unwrap_or(key))
            .map_err(|_| PipelineError::Configuration("invalid OLD_OWNER_PK".to_string()))?;

        let bundler_url = parse_url("BUNDLER_RPC", self.bundler.as_deref())?;
        let paymaster_url = match self.paymaster.as_deref() {
            Some(url) => parse_url("PAYMASTER_RPC", Some(url))?,
            None => bundler_url.clone(),
        };

        if self.request_timeout_secs == 0 {
            return Err(PipelineError::Configuration(
                "REQUEST_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        Ok(Config {
            owner,
            entry_point: parse_address("ENTRYPOINT_ADDRESS", self.entrypoint.as_deref())?,
            account: parse_address("KERNEL_ADDRESS", self.kernel.as_deref())?,
            validator: parse_address("MULTIECDSAVALIDATOR_ADDRESS", self.validator.as_deref())?,
            rpc_url: parse_url("RPC", self.rpc.as_deref())?,
            bundler_url,
            paymaster_url,
            chain_id: self.chain_id,
            sponsorship_policy_id: self.sponsorship_policy_id.clone(),
            retry: RetryPolicy {
                attempts: self.retry_attempts.max(1),
                timeout: Duration::from_secs(self.request_timeout_secs),
                ..RetryPolicy::default()
            },
        })
    }
}

fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, PipelineError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PipelineError::Configuration(format!("{name} is not set"))),
    }
}

/// Parses a 20-byte hex address, with or without 0x.
pub fn parse_address(name: &str, value: Option<&str>) -> Result<Address, PipelineError> {
    let raw = required(name, value)?;
    let hex_str = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(hex_str)
        .map_err(|e| PipelineError::Configuration(format!("invalid {name} address {raw}: {e}")))?;
    if bytes.len() != 20 {
        return Err(PipelineError::Configuration(format!(
            "invalid {name} address {raw}: expected 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

fn parse_url(name: &str, value: Option<&str>) -> Result<String, PipelineError> {
    let raw = required(name, value)?;
    reqwest::Url::parse(raw)
        .map_err(|e| PipelineError::Configuration(format!("invalid {name} url {raw}: {e}")))?;
    Ok(raw.to_string())
}
