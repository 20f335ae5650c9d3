use crate::error::ApiError;
use crate::model::{ComponentRepresentation, RealmRepresentation, SyncAction, UserQuery};
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the reproducer performs against the admin API.
///
/// Implementations are shared between many concurrent workers, so every
/// method takes `&self`. `refresh_token` may be called redundantly by several
/// workers at once.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Realm the session authenticated against.
    fn realm_name(&self) -> &str;

    async fn get_realm(&self, name: &str) -> Result<RealmRepresentation, ApiError>;

    async fn list_components(&self) -> Result<Vec<ComponentRepresentation>, ApiError>;

    async fn create_component(&self, component: &ComponentRepresentation)
        -> Result<(), ApiError>;

    async fn delete_component(&self, id: &str) -> Result<(), ApiError>;

    async fn query_users(&self, query: &UserQuery) -> Result<Vec<serde_json::Value>, ApiError>;

    async fn trigger_sync(
        &self,
        component_id: &str,
        action: SyncAction,
    ) -> Result<serde_json::Value, ApiError>;

    async fn refresh_token(&self) -> Result<(), ApiError>;
}

/// Produces an authenticated [`AdminApi`] session once the server is up.
#[async_trait]
pub trait AdminConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Arc<dyn AdminApi>>;
}

/// Components of the session's realm registered with `provider_id`.
pub async fn components_of_kind(
    api: &dyn AdminApi,
    provider_id: &str,
) -> Result<Vec<ComponentRepresentation>, ApiError> {
    Ok(api
        .list_components()
        .await?
        .into_iter()
        .filter(|c| c.provider_id == provider_id)
        .collect())
}
