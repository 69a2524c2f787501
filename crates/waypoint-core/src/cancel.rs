//! Cancellation and timeouts for the two kinds of suspension point: backend
//! calls and tool calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use waypoint_contracts::error::{EngineError, EngineResult};

pub type RunCancellationToken = CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAware<T> {
    Value(T),
    Cancelled,
}

pub fn is_cancelled(token: Option<&RunCancellationToken>) -> bool {
    token.is_some_and(RunCancellationToken::is_cancelled)
}

pub async fn await_or_cancel<T, F>(token: Option<&RunCancellationToken>, fut: F) -> CancelAware<T>
where
    F: Future<Output = T>,
{
    if let Some(token) = token {
        tokio::select! {
            _ = token.cancelled() => CancelAware::Cancelled,
            value = fut => CancelAware::Value(value),
        }
    } else {
        CancelAware::Value(fut.await)
    }
}

/// Await an external call under the caller's token and an optional timeout.
///
/// Cancellation becomes `EngineError::Cancelled`; an elapsed timeout becomes
/// `EngineError::Backend` naming `what` was being waited on.
pub async fn guarded<T, F>(
    token: Option<&RunCancellationToken>,
    timeout: Option<Duration>,
    what: &str,
    fut: F,
) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    let bounded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::backend(format!(
                    "{what} timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => fut.await,
        }
    };

    match await_or_cancel(token, bounded).await {
        CancelAware::Value(result) => result,
        CancelAware::Cancelled => Err(EngineError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use futures::future::pending;
    use tokio::time::{timeout, Duration};

    use super::*;

    #[tokio::test]
    async fn await_or_cancel_returns_value_without_token() {
        let out = await_or_cancel(None, async { 42usize }).await;
        assert_eq!(out, CancelAware::Value(42));
    }

    #[tokio::test]
    async fn await_or_cancel_returns_cancelled_when_token_cancelled() {
        let token = RunCancellationToken::new();
        let token_for_task = token.clone();
        let handle = tokio::spawn(async move {
            await_or_cancel(Some(&token_for_task), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                7usize
            })
            .await
        });

        token.cancel();
        let out = timeout(Duration::from_millis(300), handle)
            .await
            .expect("await_or_cancel should resolve quickly after cancellation")
            .expect("task should not panic");
        assert_eq!(out, CancelAware::Cancelled);
    }

    #[tokio::test]
    async fn guarded_maps_timeout_to_backend_error() {
        let result: EngineResult<()> = guarded(
            None,
            Some(Duration::from_millis(10)),
            "model call",
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        match result {
            Err(EngineError::Backend { reason }) => {
                assert!(reason.contains("model call timed out"), "unexpected reason: {reason}");
            }
            other => panic!("expected Backend timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn guarded_maps_cancellation() {
        let token = RunCancellationToken::new();
        token.cancel();
        let result: EngineResult<u8> = guarded(Some(&token), None, "tool call", pending::<EngineResult<u8>>()).await;
        assert_eq!(result, Err(EngineError::Cancelled));
    }

    #[tokio::test]
    async fn guarded_passes_through_inner_result() {
        let ok: EngineResult<u8> = guarded(None, Some(Duration::from_secs(1)), "x", async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));
    }
}
