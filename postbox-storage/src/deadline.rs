//! Per-call deadline for backend operations.

use std::future::Future;
use std::time::Duration;

use postbox_core::StorageError;

/// Run a backend call, failing with `BackendUnavailable` if it does not
/// finish within `timeout`. `None` waits indefinitely.
pub(crate) async fn with_deadline<T, F>(
    timeout: Option<Duration>,
    operation: &'static str,
    call: F,
) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    let Some(limit) = timeout else {
        return call.await;
    };

    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Backend call timed out"
            );
            Err(StorageError::unavailable(
                operation,
                format!("no response within {}ms", limit.as_millis()),
            ))
        }
    }
}
