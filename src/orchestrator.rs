//! Lifecycle of one reproduction run.
//!
//! `Starting -> WaitingForServer -> Provisioning -> Running -> ShuttingDown -> Stopped`
//!
//! Cancellation moves any phase straight to `ShuttingDown`; provisioning
//! first finishes the backend in flight. Shutdown always removes the LDAP
//! backends, whatever ended the run.

use crate::config::RunSettings;
use crate::drivers::{QueryDriver, SyncDriver};
use crate::pool::WorkerPool;
use crate::readiness::wait_for_server;
use crate::retry::{RetryPolicy, RetryingOperation};
use anyhow::{Context, Result};
use jvm_monitor::{Monitor, ProcessInspector};
use keycloak_admin::{AdminApi, AdminConnector};
use ldap_pool::{ContainerRuntime, LdapPool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    WaitingForServer,
    Provisioning,
    Running,
    ShuttingDown,
    Stopped,
}

pub struct Orchestrator {
    settings: RunSettings,
    connector: Arc<dyn AdminConnector>,
    pool: LdapPool,
    inspector: Arc<dyn ProcessInspector>,
    cancel: CancellationToken,
    phase: Phase,
    admin: Option<Arc<dyn AdminApi>>,
    workers: Option<WorkerPool>,
}

impl Orchestrator {
    pub fn new(
        settings: RunSettings,
        connector: Arc<dyn AdminConnector>,
        runtime: Arc<dyn ContainerRuntime>,
        inspector: Arc<dyn ProcessInspector>,
        cancel: CancellationToken,
    ) -> Self {
        let pool = LdapPool::new(runtime, settings.pool.clone());
        Self {
            settings,
            connector,
            pool,
            inspector,
            cancel,
            phase: Phase::Starting,
            admin: None,
            workers: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs until cancelled or until a fatal error, then shuts down.
    ///
    /// The error that ended the run, if any, is returned after cleanup.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.start().await;
        if let Err(e) = &result {
            error!("Run failed: {e:#}");
        }
        self.shutdown().await;
        result
    }

    async fn start(&mut self) -> Result<()> {
        self.settings.validate()?;

        self.phase = Phase::WaitingForServer;
        let ready = wait_for_server(
            &self.settings.server_url,
            self.settings.readiness_interval,
            self.settings.verify_tls,
            &self.cancel,
        )
        .await?;
        if !ready {
            return Ok(());
        }

        let admin = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            admin = self.connector.connect() => admin.context("Failed to log in to keycloak")?,
        };
        self.admin = Some(admin.clone());

        self.phase = Phase::Provisioning;
        let backends = self
            .pool
            .provision(admin.as_ref(), self.settings.backend_count, &self.cancel)
            .await
            .context("Failed to provision ldap backends")?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        info!("{} ldap backends ready", backends.len());

        self.phase = Phase::Running;
        self.spawn_drivers(admin);

        let monitor = Monitor::new(
            self.inspector.clone(),
            &self.settings.monitor,
            self.cancel.clone(),
        )?;
        monitor.run().await
    }

    fn spawn_drivers(&mut self, admin: Arc<dyn AdminApi>) {
        let retrying = RetryingOperation::new(admin, RetryPolicy::default(), self.cancel.clone());
        let mut workers = WorkerPool::new(self.settings.worker_capacity, self.cancel.clone());

        for id in 0..self.settings.search_workers {
            let driver = QueryDriver::new(id, retrying.clone(), self.settings.query_pause);
            workers.spawn(async move {
                driver.run().await;
            });
        }
        let sync = SyncDriver::new(retrying);
        workers.spawn(async move {
            sync.run().await;
        });

        info!(
            "Started {} search workers and the sync worker",
            self.settings.search_workers
        );
        self.workers = Some(workers);
    }

    async fn shutdown(&mut self) {
        self.phase = Phase::ShuttingDown;
        info!("Shutting down");

        let removed = self.pool.cleanup(self.admin.as_deref()).await;
        info!("Removed {removed} ldap backends");

        if let Some(workers) = self.workers.take() {
            workers.shutdown().await;
        }
        self.cancel.cancel();
        self.phase = Phase::Stopped;
    }
}
