//! Infinite retry of admin API operations.
//!
//! Every failure is mapped to an [`Outcome`] by [`RetryPolicy::decide`]:
//!
//! | failure                         | outcome                      |
//! |---------------------------------|------------------------------|
//! | 5xx status                      | retry after 5s               |
//! | 401 status                      | refresh the token, retry now |
//! | connection refused/unreachable  | retry after 1s               |
//! | any other API error or a panic  | log, retry now               |
//!
//! The loop only ends when the operation succeeds or the cancellation token
//! fires. Cancellation is checked between attempts and interrupts the delays,
//! but an attempt in flight is never interrupted.

use futures::FutureExt;
use keycloak_admin::{AdminApi, ApiError};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What to do after one attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    Retry(Duration),
    Refresh,
    Abort,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub server_error_delay: Duration,
    pub connect_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            server_error_delay: Duration::from_secs(5),
            connect_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn decide<T>(&self, result: Result<T, ApiError>) -> Outcome<T> {
        match result {
            Ok(value) => Outcome::Done(value),
            Err(e) if e.is_server_error() => {
                debug!("Server error, retrying in {:?}: {e}", self.server_error_delay);
                Outcome::Retry(self.server_error_delay)
            }
            Err(e) if e.is_unauthorized() => {
                debug!("Access token expired: {e}");
                Outcome::Refresh
            }
            Err(e) if e.is_connect() => {
                debug!("Server unreachable, retrying in {:?}: {e}", self.connect_delay);
                Outcome::Retry(self.connect_delay)
            }
            Err(e) => {
                error!("Admin API call failed: {e}\n{e:?}");
                Outcome::Retry(Duration::ZERO)
            }
        }
    }
}

/// Runs operations against one session until they succeed.
#[derive(Clone)]
pub struct RetryingOperation {
    session: Arc<dyn AdminApi>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingOperation {
    pub fn new(session: Arc<dyn AdminApi>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            session,
            policy,
            cancel,
        }
    }

    pub fn session(&self) -> &Arc<dyn AdminApi> {
        &self.session
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Calls `op` until it returns `Ok`. Returns `None` once cancelled.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        loop {
            let outcome = if self.cancel.is_cancelled() {
                Outcome::Abort
            } else {
                match AssertUnwindSafe(async { op().await }).catch_unwind().await {
                    Ok(result) => self.policy.decide(result),
                    Err(panic) => {
                        error!("Operation panicked: {}", panic_message(&*panic));
                        Outcome::Retry(Duration::ZERO)
                    }
                }
            };

            match outcome {
                Outcome::Done(value) => return Some(value),
                Outcome::Abort => return None,
                Outcome::Refresh => {
                    if let Err(e) = self.session.refresh_token().await {
                        warn!("Failed to refresh access token: {e}");
                    }
                }
                Outcome::Retry(delay) if delay.is_zero() => tokio::task::yield_now().await,
                Outcome::Retry(delay) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
