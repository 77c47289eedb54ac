//! Exponential backoff with jitter for transient transfer errors (§4.3),
//! in the spirit of the SSH reference tool's pre/during-transfer retry
//! classification, generalized into one helper both implementors share.

use std::future::Future;
use std::time::Duration;

use crate::error::{ErrorKind, classify};

const BASE_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 8_000;

/// Deterministic jitter derived from the attempt number, so retries remain
/// reproducible in tests without pulling in a dedicated RNG crate.
fn jitter_ms(attempt: u32) -> u64 {
    (attempt as u64 * 37) % 250
}

/// Retries `op` up to `max_attempts` times when the resulting error classifies
/// as `ErrorKind::NetworkTransient`. Any other kind fails fast, matching
/// "non-recoverable errors ... fail fast" (§4.3).
pub async fn retry_with_backoff<T, F, Fut>(max_attempts: u32, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if classify(&e) == ErrorKind::NetworkTransient && attempt + 1 < max_attempts => {
                let delay = (BASE_DELAY_MS * 2u64.saturating_pow(attempt)).min(MAX_DELAY_MS) + jitter_ms(attempt);
                tracing::warn!(attempt, delay_ms = delay, error = %e, "retrying transient transfer error");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(crate::error::err(ErrorKind::NetworkTransient, "timeout"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fails_fast_on_non_transient() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_with_backoff(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(crate::error::err(ErrorKind::AuthFailed, "bad credentials")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
