//! Load drivers.
//!
//! Both drivers call [`RetryingOperation::run`] in a loop until the
//! cancellation token fires. [`QueryDriver`] issues a single-result user
//! search; [`SyncDriver`] triggers a changed-users sync on every LDAP
//! component of the realm.

use crate::retry::RetryingOperation;
use keycloak_admin::{
    components_of_kind, AdminApi, ApiError, SyncAction, UserQuery, LDAP_PROVIDER_ID,
};
use std::time::Duration;
use tracing::{debug, info};

/// Sustained read pressure on the user search endpoint.
pub struct QueryDriver {
    id: usize,
    retrying: RetryingOperation,
    query: UserQuery,
    pause: Duration,
}

impl QueryDriver {
    pub fn new(id: usize, retrying: RetryingOperation, pause: Duration) -> Self {
        Self {
            id,
            retrying,
            query: UserQuery::unknown_user(),
            pause,
        }
    }

    /// One search, retried until it succeeds. `None` once cancelled.
    pub async fn invoke_once(&self) -> Option<usize> {
        let session = self.retrying.session();
        self.retrying
            .run(|| session.query_users(&self.query))
            .await
            .map(|users| users.len())
    }

    /// Searches until cancelled and returns the number of completed searches.
    pub async fn run(self) -> u64 {
        debug!("Search worker {} started", self.id);
        let cancel = self.retrying.cancel_token().clone();
        let mut completed = 0;
        while self.invoke_once().await.is_some() {
            completed += 1;
            if self.pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.pause) => {}
                }
            }
        }
        debug!("Search worker {} stopped after {completed} searches", self.id);
        completed
    }
}

/// Triggers `action` on every LDAP component of the session's realm.
///
/// A 500 answer is what this server's LDAP provider returns for a sync that
/// is already running, so it ends the pass as a success instead of going
/// through the generic server-error delay.
pub async fn sync_all(session: &dyn AdminApi, action: SyncAction) -> Result<usize, ApiError> {
    let pass = async {
        let components = components_of_kind(session, LDAP_PROVIDER_ID).await?;
        let mut triggered = 0;
        for component in &components {
            let Some(id) = component.id.as_deref() else {
                continue;
            };
            session.trigger_sync(id, action).await?;
            triggered += 1;
        }
        Ok::<_, ApiError>(triggered)
    };

    match pass.await {
        Err(e) if e.status() == Some(500) => {
            debug!("Ignoring sync failure: {e}");
            Ok(0)
        }
        result => result,
    }
}

/// Continuously re-triggers LDAP synchronization.
pub struct SyncDriver {
    retrying: RetryingOperation,
    action: SyncAction,
}

impl SyncDriver {
    pub fn new(retrying: RetryingOperation) -> Self {
        Self {
            retrying,
            action: SyncAction::ChangedUsers,
        }
    }

    /// One pass over all components. `None` once cancelled.
    pub async fn invoke_once(&self) -> Option<usize> {
        let session = self.retrying.session();
        self.retrying
            .run(|| sync_all(session.as_ref(), self.action))
            .await
    }

    /// Syncs until cancelled and returns the number of completed passes.
    pub async fn run(self) -> u64 {
        info!("Sync worker started ({})", self.action);
        let mut passes = 0;
        while self.invoke_once().await.is_some() {
            passes += 1;
            tokio::task::yield_now().await;
        }
        info!("Sync worker stopped after {passes} passes");
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use keycloak_admin::testing::{FakeAdmin, FakeOp};
    use keycloak_admin::ComponentRepresentation;
    use std::sync::Arc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn server_error(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            body: "{\"error\":\"unknown_error\"}".to_string(),
        }
    }

    fn retrying(admin: &Arc<FakeAdmin>, cancel: &CancellationToken) -> RetryingOperation {
        RetryingOperation::new(admin.clone(), RetryPolicy::default(), cancel.clone())
    }

    fn admin_with_ldaps(count: usize) -> Arc<FakeAdmin> {
        let admin = Arc::new(FakeAdmin::new("master"));
        for i in 0..count {
            admin.insert_component(ComponentRepresentation::user_storage(
                &format!("ldap-{}", 10389 + i),
                LDAP_PROVIDER_ID,
                "master-id",
                [("enabled", "true")],
            ));
        }
        admin.insert_component(ComponentRepresentation {
            id: None,
            name: "hmac-generated".to_string(),
            provider_id: "hmac-generated".to_string(),
            provider_type: None,
            parent_id: None,
            config: Default::default(),
        });
        admin
    }

    #[tokio::test]
    async fn test_sync_all_triggers_only_ldap_components() {
        let admin = admin_with_ldaps(2);

        let triggered = sync_all(admin.as_ref(), SyncAction::ChangedUsers)
            .await
            .unwrap();

        assert_eq!(triggered, 2);
        let synced = admin.synced();
        assert_eq!(synced.len(), 2);
        assert!(synced
            .iter()
            .all(|(_, action)| *action == SyncAction::ChangedUsers));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_500_is_swallowed_without_delay() {
        let admin = admin_with_ldaps(2);
        admin.fail_next(FakeOp::TriggerSync, server_error(500));
        let cancel = CancellationToken::new();
        let driver = SyncDriver::new(retrying(&admin, &cancel));
        let start = Instant::now();

        assert_eq!(driver.invoke_once().await, Some(0));
        assert_eq!(admin.calls(FakeOp::TriggerSync), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert_eq!(driver.invoke_once().await, Some(2));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_other_server_errors_wait() {
        let admin = admin_with_ldaps(1);
        admin.fail_next(FakeOp::TriggerSync, server_error(503));
        let cancel = CancellationToken::new();
        let driver = SyncDriver::new(retrying(&admin, &cancel));
        let start = Instant::now();

        assert_eq!(driver.invoke_once().await, Some(1));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(admin.calls(FakeOp::TriggerSync), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_driver_retriggers_continuously() {
        let admin = admin_with_ldaps(2);
        for _ in 0..3 {
            admin.fail_next(FakeOp::TriggerSync, server_error(500));
        }
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let task = tokio::spawn(SyncDriver::new(retrying(&admin, &cancel)).run());

        while admin.synced().len() < 6 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        let passes = task.await.unwrap();

        assert!(passes >= 6);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_driver_expired_token() {
        let admin = Arc::new(FakeAdmin::new("master"));
        admin.fail_next(FakeOp::QueryUsers, server_error(401));
        let cancel = CancellationToken::new();
        let driver = QueryDriver::new(0, retrying(&admin, &cancel), Duration::ZERO);

        assert_eq!(driver.invoke_once().await, Some(0));
        assert_eq!(admin.refresh_count(), 1);
        assert_eq!(admin.calls(FakeOp::QueryUsers), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_driver_pause_sets_cadence() {
        let admin = Arc::new(FakeAdmin::new("master"));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            QueryDriver::new(0, retrying(&admin, &cancel), Duration::from_millis(100)).run(),
        );

        tokio::time::sleep(Duration::from_millis(950)).await;
        cancel.cancel();
        let completed = task.await.unwrap();

        // searches at 0ms, 100ms, ..., 900ms
        assert_eq!(completed, 10);
        assert_eq!(admin.calls(FakeOp::QueryUsers), 10);
    }
}
