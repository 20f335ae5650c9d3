//! Keycloak admin REST client.
//!
//! Only the handful of operations the reproducer needs are exposed, behind the
//! [`AdminApi`] trait so that the load drivers and the LDAP pool can run
//! against [`testing::FakeAdmin`] in tests.

mod api;
mod error;
mod model;
mod session;
pub mod testing;

pub use api::{components_of_kind, AdminApi, AdminConnector};
pub use error::ApiError;
pub use model::{
    ComponentRepresentation, RealmRepresentation, SyncAction, UserQuery, LDAP_PROVIDER_ID,
    USER_STORAGE_PROVIDER_TYPE,
};
pub use session::{AdminCredentials, KeycloakAdmin, TokenSnapshot};
