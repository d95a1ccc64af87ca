use crate::retry::{Exhausted, RetryPolicy};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("POST {url} failed: {inner}")]
    Transport { url: String, inner: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("missing result field")]
    MissingResult,

    /// The peer answered, but its result has an unexpected shape.
    #[error("undecodable result: {0}")]
    Decode(String),
}

impl RpcError {
    /// Whether re-sending the same request could succeed. JSON-RPC error objects are a
    /// deliberate answer from the peer and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Transport { .. } | RpcError::Timeout(_) => true,
            RpcError::Http { status, .. } => *status >= 500 || *status == 429,
            RpcError::Rpc { .. } | RpcError::MissingResult | RpcError::Decode(_) => false,
        }
    }

    fn from_exhausted(e: Exhausted<RpcError>) -> Self {
        match e {
            Exhausted::TimedOut(d) => RpcError::Timeout(d),
            Exhausted::Failed(e) => e,
        }
    }
}

/// Minimal HTTP JSON-RPC 2.0 client shared by the paymaster and bundler adapters.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    url: String,
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl JsonRpcClient {
    pub fn new(url: String, policy: RetryPolicy) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
            policy,
        }
    }

    /// Sends the request under the retry policy. Only use for idempotent methods.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.policy
            .run(method, RpcError::is_transient, || self.send(method, params.clone()))
            .await
            .map_err(RpcError::from_exhausted)
    }

    /// Sends the request exactly once, bounded by the policy timeout.
    pub async fn request_once(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.policy
            .once()
            .run(method, RpcError::is_transient, || self.send(method, params.clone()))
            .await
            .map_err(RpcError::from_exhausted)
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        tracing::debug!(url = %self.url, method, "json-rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| RpcError::Transport {
                url: self.url.clone(),
                inner: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| RpcError::Transport {
            url: self.url.clone(),
            inner: e.to_string(),
        })?;

        if !status.is_success() {
            // Some peers pair a JSON-RPC error object with a 4xx status.
            if let Ok(body) = serde_json::from_str::<Value>(&text) {
                if body.get("error").is_some() {
                    return parse_response(body);
                }
            }
            return Err(RpcError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| RpcError::Transport {
            url: self.url.clone(),
            inner: format!("failed to decode JSON: {e}"),
        })?;

        parse_response(body)
    }
}

fn parse_response(body: Value) -> Result<Value, RpcError> {
    if let Some(err) = body.get("error") {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(RpcError::Rpc { code, message });
    }

    body.get("result").cloned().ok_or(RpcError::MissingResult)
}
