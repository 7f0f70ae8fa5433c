//! Shared RPC utilities for interacting with Starknet JSON-RPC endpoints.

use std::{future::Future, time::Duration};

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use starknet::core::types::Felt;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lower bound on how long a single readiness attempt may wait for an answer.
pub const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Attempts and delay used by the pipelines before any mutating call.
///
/// Each attempt is cut off after `attempt_timeout`, so a node that accepts connections
/// but never answers still exhausts the policy in bounded time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl ReadinessPolicy {
    /// Policy whose attempts time out after `delay`, but never sooner than
    /// [`MIN_ATTEMPT_TIMEOUT`].
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        let attempt_timeout = if delay.as_millis() > MIN_ATTEMPT_TIMEOUT.as_millis() {
            delay
        } else {
            MIN_ATTEMPT_TIMEOUT
        };

        Self {
            max_attempts,
            delay,
            attempt_timeout,
        }
    }

    pub const fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Upper bound on the time [`wait_for`] can take under this policy.
    pub fn budget(&self) -> Duration {
        let attempts = u32::try_from(self.max_attempts).unwrap_or(u32::MAX);
        self.attempt_timeout.saturating_mul(attempts)
            + self.delay.saturating_mul(attempts.saturating_sub(1))
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Query `starknet_chainId` and parse the hex result.
pub async fn query_chain_id(client: &reqwest::Client, url: &str) -> Result<Felt, anyhow::Error> {
    let chain_id: String = json_rpc_call(client, url, "starknet_chainId", vec![]).await?;
    Felt::from_hex(&chain_id).map_err(|e| anyhow::anyhow!("Invalid chain id '{}': {}", chain_id, e))
}

/// Repeatedly run `check_fn` until it succeeds or `policy.max_attempts` calls have failed.
///
/// Sleeps `policy.delay` between attempts with no backoff growth and never errors:
/// the outcome is reported as a boolean. An attempt still pending after
/// `policy.attempt_timeout` counts as failed.
pub async fn wait_for<F, Fut, T, E>(name: &str, policy: ReadinessPolicy, mut check_fn: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    if policy.max_attempts == 0 {
        return false;
    }

    let backoff = ConstantBuilder::default()
        .with_delay(policy.delay)
        .with_max_times(policy.max_attempts - 1);

    let attempt_timeout = policy.attempt_timeout;
    let attempt = || {
        let check = check_fn();
        async move {
            match tokio::time::timeout(attempt_timeout, check).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no answer within {:?}", attempt_timeout)),
            }
        }
    };

    let result = attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|e: &String, dur: Duration| {
            tracing::trace!(error = %e, service = %name, retry_in = ?dur, "Readiness check failed, retrying...");
        })
        .await;

    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(
                error = %e,
                service = %name,
                attempts = policy.max_attempts,
                "Readiness check exhausted its attempts"
            );
            false
        }
    }
}

/// Wait until the node at `rpc_url` answers a `starknet_chainId` call.
///
/// Returns `false` once `max_attempts` calls have failed. Callers treat `false` as a
/// fatal precondition failure.
pub async fn wait_for_ready(rpc_url: &str, max_attempts: usize, delay: Duration) -> bool {
    let client = match create_client() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot build RPC client for the readiness probe");
            return false;
        }
    };

    wait_for(
        rpc_url,
        ReadinessPolicy::new(max_attempts, delay),
        || query_chain_id(&client, rpc_url),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn test_wait_for_stops_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let policy = ReadinessPolicy::new(5, Duration::from_millis(10));

        let start = Instant::now();
        let ready = wait_for("test", policy, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("unreachable")
        })
        .await;
        let elapsed = start.elapsed();

        assert!(!ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        // Four inter-attempt delays of 10ms each.
        assert!(elapsed >= Duration::from_millis(40), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_wait_for_returns_on_first_success() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let policy = ReadinessPolicy::new(5, Duration::from_millis(10));

        let ready = wait_for("test", policy, || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err("not yet") } else { Ok(()) }
        })
        .await;

        assert!(ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_zero_attempts() {
        let ready = wait_for("test", ReadinessPolicy::new(0, Duration::ZERO), || async {
            Ok::<(), &str>(())
        })
        .await;
        assert!(!ready);
    }

    #[tokio::test]
    async fn test_wait_for_cuts_off_pending_attempts() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let policy = ReadinessPolicy::new(3, Duration::from_millis(10))
            .with_attempt_timeout(Duration::from_millis(20));

        let start = Instant::now();
        let ready = wait_for("test", policy, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<(), &str>>().await
        })
        .await;

        assert!(!ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(2), "elapsed: {:?}", start.elapsed());
    }

    #[test]
    fn test_attempt_timeout_floor() {
        let fast = ReadinessPolicy::new(3, Duration::from_millis(10));
        assert_eq!(fast.attempt_timeout, MIN_ATTEMPT_TIMEOUT);
        assert_eq!(fast.budget(), Duration::from_millis(3020));

        let slow = ReadinessPolicy::new(2, Duration::from_secs(3));
        assert_eq!(slow.attempt_timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_wait_for_ready_stalled_node() {
        // Accepts connections and never writes a response.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let start = Instant::now();
        let ready = wait_for_ready(&url, 2, Duration::from_millis(10)).await;
        let elapsed = start.elapsed();

        assert!(!ready);
        // Two attempts cut off at the one second floor.
        assert!(elapsed >= Duration::from_secs(2), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_wait_for_ready_unreachable_endpoint() {
        let start = Instant::now();
        // Port 9 (discard) on loopback is not serving JSON-RPC.
        let ready = wait_for_ready("http://127.0.0.1:9", 5, Duration::from_millis(10)).await;

        assert!(!ready);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
