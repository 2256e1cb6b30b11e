//! Rpc command: JSON-RPC 2.0 calls against bundler and paymaster endpoints

use crate::cli::RpcArgs;
use anyhow::{anyhow, Context, Result};
use retrier_core::retry::{
    HttpStatusError, HttpStatusPredicate, RetryError, RetryPredicate, RetryRunner,
    TracingObserver,
};
use retrier_core::types::{RetryPolicy, RpcConfig, RuntimeConfig};
use retrier_core::ConfigLoader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why one JSON-RPC call failed
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl HttpStatusError for RpcError {
    fn status_code(&self) -> Option<u16> {
        match self {
            RpcError::Http { status, .. } => Some(*status),
            RpcError::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

/// Retries transport failures, retryable HTTP statuses and server-side
/// JSON-RPC errors; stops on malformed requests and unknown methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcRetryPredicate;

// -32700 parse error, -32600 invalid request, -32601 method not found, -32602 invalid params
const PERMANENT_RPC_CODES: [i64; 4] = [-32700, -32600, -32601, -32602];

impl RetryPredicate<RpcError> for RpcRetryPredicate {
    fn should_retry(&self, error: &RpcError) -> bool {
        match error {
            RpcError::Rpc { code, .. } => !PERMANENT_RPC_CODES.contains(code),
            RpcError::InvalidResponse(_) => false,
            other => HttpStatusPredicate.should_retry(other),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP POST
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, config: &RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Send one request and return its `result`
    pub async fn call(&self, method: &str, params: &Value) -> std::result::Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method,
            params,
        };
        debug!("POST {} {}", self.url, method);

        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        match (body.result, body.error) {
            (_, Some(error)) => Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// Everything one `rpc` invocation needs, resolved from flags and config
#[derive(Debug)]
struct RpcPlan {
    /// Names both the policy looked up and the log context of the session
    operation: String,
    policy: RetryPolicy,
    url: String,
    params: Value,
}

fn plan_call(args: &RpcArgs, config: &RuntimeConfig) -> Result<RpcPlan> {
    let operation = args.policy.operation_name("rpc").to_string();
    let policy = args.policy.resolve(config, &operation)?;

    let url = args
        .url
        .clone()
        .or_else(|| config.rpc.endpoint.clone())
        .ok_or_else(|| anyhow!("no endpoint: pass --url or set RETRIER_RPC_URL"))?;

    Ok(RpcPlan {
        operation,
        policy,
        url,
        params: parse_params(args.params.as_deref())?,
    })
}

pub async fn run(args: RpcArgs, loader: &ConfigLoader, cancel: CancellationToken) -> Result<()> {
    let config = loader.load_runtime_config()?;
    let plan = plan_call(&args, &config)?;
    let client = JsonRpcClient::new(plan.url, &config.rpc)?;

    match call_with_retry(&client, &args.method, &plan.params, plan.policy, &plan.operation, cancel).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => super::fail(&err, 1),
    }
}

fn parse_params(raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("--params must be valid JSON"),
        None => Ok(Value::Array(Vec::new())),
    }
}

/// Call `method` under `policy`, retrying transient failures
pub async fn call_with_retry(
    client: &JsonRpcClient,
    method: &str,
    params: &Value,
    policy: RetryPolicy,
    operation: &str,
    cancel: CancellationToken,
) -> std::result::Result<Value, RetryError<RpcError>> {
    RetryRunner::builder()
        .with_policy(policy)
        .with_predicate(RpcRetryPredicate)
        .with_observer(TracingObserver::new(operation))
        .with_cancellation(cancel)
        .build()
        .run(|| client.call(method, params))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    fn client(url: String) -> JsonRpcClient {
        JsonRpcClient::new(url, &RpcConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(
                json!({"jsonrpc": "2.0", "method": "eth_supportedEntryPoints", "params": []}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":["0x0000000071727De22E5E9d8BAf0edAc6f37da032"]}"#)
            .create_async()
            .await;

        let result = call_with_retry(
            &client(server.url()),
            "eth_supportedEntryPoints",
            &json!([]),
            quick_policy(3),
            "rpc",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, json!(["0x0000000071727De22E5E9d8BAf0edAc6f37da032"]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unavailable_endpoint_is_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("upstream unavailable")
            .expect(3)
            .create_async()
            .await;

        let err = call_with_retry(
            &client(server.url()),
            "eth_chainId",
            &json!([]),
            quick_policy(3),
            "rpc",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_exhausted());
        assert!(matches!(err.last_error(), Some(RpcError::Http { status: 503, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let err = call_with_retry(
            &client(server.url()),
            "eth_chainId",
            &json!([]),
            quick_policy(5),
            "rpc",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_non_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_method_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = call_with_retry(
            &client(server.url()),
            "pm_sponsorUserOperation",
            &json!([]),
            quick_policy(5),
            "rpc",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_non_retryable());
        assert!(matches!(err.into_last_error(), Some(RpcError::Rpc { code: -32601, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_object_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#)
            .expect(2)
            .create_async()
            .await;

        let err = call_with_retry(
            &client(server.url()),
            "eth_getUserOperationReceipt",
            &json!(["0xabc"]),
            quick_policy(2),
            "user-operation-receipt",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 2);
        mock.assert_async().await;
    }

    fn rpc_args(argv: &[&str]) -> RpcArgs {
        let mut full = vec!["retrier", "rpc", "--method", "eth_getUserOperationReceipt"];
        full.extend_from_slice(argv);
        match crate::cli::Cli::try_parse_from(full).unwrap().command {
            crate::cli::Commands::Rpc(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn config_with_receipt_policy() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.rpc.endpoint = Some("http://localhost:3000/rpc".to_string());
        config
            .retry_policies
            .operations
            .insert("user-operation-receipt".to_string(), quick_policy(20));
        config
    }

    #[test]
    fn test_plan_uses_one_operation_for_policy_and_logs() {
        let config = config_with_receipt_policy();

        let plan = plan_call(&rpc_args(&["--operation", "user-operation-receipt"]), &config).unwrap();
        assert_eq!(plan.operation, "user-operation-receipt");
        assert_eq!(plan.policy.max_attempts, 20);

        let plan = plan_call(&rpc_args(&[]), &config).unwrap();
        assert_eq!(plan.operation, "rpc");
        assert_eq!(plan.policy, config.retry_policies.default);
    }

    #[test]
    fn test_plan_endpoint_fallback() {
        let mut config = config_with_receipt_policy();

        let plan = plan_call(&rpc_args(&["--url", "http://override"]), &config).unwrap();
        assert_eq!(plan.url, "http://override");
        assert_eq!(plan.params, json!([]));

        config.rpc.endpoint = None;
        assert!(plan_call(&rpc_args(&[]), &config).is_err());
    }

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params(None).unwrap(), json!([]));
        assert_eq!(parse_params(Some(r#"["0x1", true]"#)).unwrap(), json!(["0x1", true]));
        assert!(parse_params(Some("not json")).is_err());
    }

    #[test]
    fn test_predicate_classification() {
        let predicate = RpcRetryPredicate;
        assert!(predicate.should_retry(&RpcError::Http { status: 429, body: String::new() }));
        assert!(!predicate.should_retry(&RpcError::Http { status: 401, body: String::new() }));
        assert!(predicate.should_retry(&RpcError::Rpc { code: -32603, message: "internal".into() }));
        assert!(!predicate.should_retry(&RpcError::Rpc { code: -32602, message: "invalid params".into() }));
        assert!(!predicate.should_retry(&RpcError::InvalidResponse("eof".into())));
    }
}
