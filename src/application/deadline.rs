//! Per-call timeout for boundary calls.

use std::future::Future;
use std::time::Duration;

use crate::domain::errors::TransportError;

/// Default timeout of a single boundary call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `call` under `limit`; an elapsed deadline becomes
/// [`TransportError::Timeout`] naming `operation`.
pub async fn within<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(format!(
            "{operation} did not complete within {}s",
            limit.as_secs_f32()
        ))),
    }
}
