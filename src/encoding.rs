//! JSON-RPC hex wire formats for addresses, quantities, byte strings and UserOperations.

use crate::types::UserOperation;
use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::Value;

pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

pub fn fmt_h256(h: H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

/// JSON-RPC "quantity" encoding.
pub fn fmt_u256(v: U256) -> String {
    if v.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", v)
    }
}

pub fn fmt_bytes(b: &Bytes) -> String {
    format!("0x{}", hex::encode(b.as_ref()))
}

/// EntryPoint v0.6 camelCase JSON shape expected by bundlers and paymasters.
pub fn user_op_to_json(op: &UserOperation) -> Value {
    serde_json::json!({
        "sender": fmt_address(op.sender),
        "nonce": fmt_u256(op.nonce),
        "initCode": fmt_bytes(&op.init_code),
        "callData": fmt_bytes(&op.call_data),
        "callGasLimit": fmt_u256(op.call_gas_limit),
        "verificationGasLimit": fmt_u256(op.verification_gas_limit),
        "preVerificationGas": fmt_u256(op.pre_verification_gas),
        "maxFeePerGas": fmt_u256(op.max_fee_per_gas),
        "maxPriorityFeePerGas": fmt_u256(op.max_priority_fee_per_gas),
        "paymasterAndData": fmt_bytes(&op.paymaster_and_data),
        "signature": fmt_bytes(&op.signature),
    })
}

pub fn parse_u256_quantity(s: &str) -> Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::zero());
    }
    Ok(U256::from_str_radix(s, 16)?)
}

pub fn parse_h256(s: &str) -> Result<H256> {
    let bytes = parse_hex_bytes(s)?;
    if bytes.len() != 32 {
        anyhow::bail!("expected 32-byte hex, got {} bytes", bytes.len());
    }
    Ok(H256::from_slice(&bytes))
}

pub fn parse_hex_bytes(s: &str) -> Result<Bytes> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("invalid hex: {s}"))?;
    Ok(Bytes::from(bytes))
}

/// Reads `key` from a JSON object as a hex quantity. Numbers are accepted too.
pub fn u256_field(v: &Value, key: &str) -> Result<U256> {
    match v.get(key) {
        Some(Value::String(s)) => parse_u256_quantity(s),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| anyhow!("field {key} is not an unsigned integer")),
        _ => Err(anyhow!("missing or invalid field {key}")),
    }
}

pub fn bytes_field(v: &Value, key: &str) -> Result<Bytes> {
    let s = v
        .get(key)
        .and_then(|x| x.as_str())
        .ok_or_else(|| anyhow!("missing or invalid field {key}"))?;
    parse_hex_bytes(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::dummy_signature;
    use serde_json::json;

    #[test]
    fn quantities_are_minimal_hex() {
        assert_eq!(fmt_u256(U256::zero()), "0x0");
        assert_eq!(fmt_u256(U256::from(50_000u64)), "0xc350");
    }

    #[test]
    fn user_op_json_uses_v06_field_names() {
        let op = UserOperation {
            sender: Address::from([0x01; 20]),
            nonce: U256::from(7u64),
            max_fee_per_gas: U256::from(100u64),
            signature: dummy_signature(),
            ..Default::default()
        };
        let v = user_op_to_json(&op);

        assert_eq!(v["sender"], "0x0101010101010101010101010101010101010101");
        assert_eq!(v["nonce"], "0x7");
        assert_eq!(v["initCode"], "0x");
        assert_eq!(v["callGasLimit"], "0x0");
        assert_eq!(v["maxFeePerGas"], "0x64");
        assert_eq!(v["paymasterAndData"], "0x");
        assert_eq!(v.as_object().unwrap().len(), 11);
    }

    #[test]
    fn u256_field_accepts_hex_and_numbers() {
        let v = json!({ "a": "0xc350", "b": 21000, "c": true });
        assert_eq!(u256_field(&v, "a").unwrap(), U256::from(50_000u64));
        assert_eq!(u256_field(&v, "b").unwrap(), U256::from(21_000u64));
        assert!(u256_field(&v, "c").is_err());
        assert!(u256_field(&v, "missing").is_err());
    }

    #[test]
    fn parse_h256_requires_32_bytes() {
        assert!(parse_h256("0x1234").is_err());
        let h = parse_h256(&format!("0x{}", "ab".repeat(32))).unwrap();
        assert_eq!(h, H256::from([0xab; 32]));
    }
}
