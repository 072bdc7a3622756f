use crate::domain_port::IdentityError;
use std::future::Future;
use std::time::Duration;

/// Default bound on a single identity provider call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one identity provider call, turning an elapsed deadline into
/// `IdentityError::Timeout`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, IdentityError>>,
) -> Result<T, IdentityError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(IdentityError::Timeout),
    }
}
