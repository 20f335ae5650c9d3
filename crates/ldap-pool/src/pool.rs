use crate::backend::{DirectoryBackend, PoolSettings, UserAccount};
use crate::runtime::ContainerRuntime;
use anyhow::{Context, Result};
use keycloak_admin::{components_of_kind, AdminApi, LDAP_PROVIDER_ID};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Creates and destroys the labelled directory backends.
pub struct LdapPool {
    runtime: Arc<dyn ContainerRuntime>,
    settings: PoolSettings,
}

impl LdapPool {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: PoolSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Replaces whatever a previous run left behind with `count` fresh
    /// backends, each registered as an `ldap` component of the session's realm.
    ///
    /// Nothing here is retried: any failure aborts provisioning. Cancellation
    /// is checked between backends, so a backend is never left half created;
    /// the backends provisioned so far are returned.
    pub async fn provision(
        &self,
        admin: &dyn AdminApi,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<DirectoryBackend>> {
        let realm = admin
            .get_realm(admin.realm_name())
            .await
            .with_context(|| format!("Failed to fetch realm '{}'", admin.realm_name()))?;

        for container in self.runtime.list(&self.settings.label).await? {
            info!("Removing stale container {}", container.name);
            self.runtime.remove(&container, true, true).await?;
        }

        let stale = components_of_kind(admin, LDAP_PROVIDER_ID)
            .await
            .context("Failed to list components")?;
        for component in stale {
            let Some(id) = component.id.as_deref() else {
                continue;
            };
            info!("Removing stale component {}", component.name);
            admin
                .delete_component(id)
                .await
                .with_context(|| format!("Failed to delete component {}", component.name))?;
        }

        let mut backends = Vec::with_capacity(count);
        for index in 0..count {
            if cancel.is_cancelled() {
                info!("Provisioning interrupted after {index} backends");
                return Ok(backends);
            }
            let port = u16::try_from(index)
                .ok()
                .and_then(|offset| self.settings.base_port.checked_add(offset))
                .with_context(|| {
                    format!(
                        "Backend {index} does not fit in the port range starting at {}",
                        self.settings.base_port
                    )
                })?;

            let spec = self.settings.container_spec(index, port);
            info!("Creating ldap {}", spec.name);
            let container = self.runtime.run(&spec).await?;

            let account = format!("user{index}");
            let backend = DirectoryBackend {
                name: spec.name.clone(),
                listen_port: port,
                credentials: UserAccount {
                    username: account.clone(),
                    password: account,
                },
                label: self.settings.label.clone(),
                container_id: container.id,
            };

            let component = self.settings.component(&backend, &realm.id);
            admin
                .create_component(&component)
                .await
                .with_context(|| format!("Failed to register component {}", backend.name))?;
            backends.push(backend);
        }

        info!("Provisioned {} ldap backends", backends.len());
        Ok(backends)
    }

    /// Removes every labelled container, then every `ldap` component when a
    /// session is available. Best effort: failures are logged, never returned.
    ///
    /// Returns the number of containers removed.
    pub async fn cleanup(&self, admin: Option<&dyn AdminApi>) -> usize {
        let mut removed = 0;
        match self.runtime.list(&self.settings.label).await {
            Ok(containers) => {
                for container in containers {
                    match self.runtime.remove(&container, true, true).await {
                        Ok(()) => {
                            info!("Removed container {}", container.name);
                            removed += 1;
                        }
                        Err(e) => warn!("Failed to remove container {}: {e:#}", container.name),
                    }
                }
            }
            Err(e) => warn!(
                "Failed to list containers labelled {}: {e:#}",
                self.settings.label
            ),
        }

        if let Some(admin) = admin {
            match components_of_kind(admin, LDAP_PROVIDER_ID).await {
                Ok(components) => {
                    for component in components {
                        let Some(id) = component.id.as_deref() else {
                            continue;
                        };
                        if let Err(e) = admin.delete_component(id).await {
                            warn!("Failed to delete component {}: {e}", component.name);
                        }
                    }
                }
                Err(e) => warn!("Failed to list components during cleanup: {e}"),
            }
        }

        removed
    }
}
