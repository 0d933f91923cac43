//! Retrying call execution
//!
//! Every remote operation passes through [`RetryingCallExecutor::execute`].
//! A detected session expiry invalidates the session and re-runs the
//! operation exactly once; the re-run re-authenticates because operations
//! begin with `ensure_authenticated`. Everything else is wrapped and
//! raised without a retry.

use crate::controlplane::session::SessionManager;
use crate::error::{Error, Result};
use std::future::Future;
use tracing::{debug, warn};

/// Wraps remote operations with classification-and-retry.
#[derive(Clone)]
pub struct RetryingCallExecutor {
    session: SessionManager,
}

impl RetryingCallExecutor {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Run `op`, retrying at most once on session expiry. The retry reuses
    /// the same closure, so the original arguments are replayed unchanged.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Ok(value) => Ok(value),
            Err(err) if err.is_session_expired() => {
                warn!("controller session expired, re-authenticating and retrying");
                self.session.invalidate().await;
                match op().await {
                    Ok(value) => Ok(value),
                    // A second expiry means re-authentication did not help;
                    // wrap it like any other failure.
                    Err(retry_err) => Err(Self::wrap(retry_err)),
                }
            }
            Err(err @ Error::Controller { .. }) => {
                debug!(error = %err, "controller call failed");
                Err(Self::wrap(err))
            }
            Err(err) => Err(Self::wrap(err)),
        }
    }

    fn wrap(err: Error) -> Error {
        match err {
            // Already wrapped by a nested executor; keep the original trace.
            wrapped @ Error::RemoteOperation { .. } => wrapped,
            other => Error::remote(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controlplane::fake::FakeController;
    use crate::error::ControllerFault;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn executor(api: Arc<FakeController>) -> RetryingCallExecutor {
        RetryingCallExecutor::new(SessionManager::new(api, ControllerConfig::default()))
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let executor = executor(Arc::new(FakeController::new()));
        let result = executor.execute(|| async { Ok(42) }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_session_expiry_retries_once() {
        let api = Arc::new(FakeController::new());
        let executor = executor(api.clone());
        let calls = AtomicU32::new(0);

        let result = executor
            .execute(|| async {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    Err(Error::controller(ControllerFault::Http(401), "unauthorized"))
                } else {
                    Ok("recovered")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expiry_invalidates_session() {
        let api = Arc::new(FakeController::new());
        let executor = executor(api.clone());
        executor.session().ensure_authenticated().await.unwrap();

        let calls = AtomicU32::new(0);
        let _ = executor
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::controller(
                        ControllerFault::Http(500),
                        "missing session cookie",
                    ))
                } else {
                    Ok(())
                }
            })
            .await;

        // Invalidation happened; the next authenticated call logs in again.
        executor.session().ensure_authenticated().await.unwrap();
        assert_eq!(api.login_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_expiry_is_not_retried_twice() {
        let executor = executor(Arc::new(FakeController::new()));
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::controller(ControllerFault::Http(401), "unauthorized"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_matches!(err, Error::RemoteOperation { .. });
    }

    #[tokio::test]
    async fn test_fatal_controller_error_is_wrapped_not_retried() {
        let executor = executor(Arc::new(FakeController::new()));
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::controller(ControllerFault::Failure, "pool exhausted"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_matches!(err, Error::RemoteOperation { ref message, ref trace }
            if message.contains("pool exhausted") && !trace.is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_error_is_wrapped_not_retried() {
        let executor = executor(Arc::new(FakeController::new()));
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Io(std::io::Error::other("socket closed")))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_matches!(err, Error::RemoteOperation { .. });
    }
}
