//! Pool of ephemeral directory backends.
//!
//! Each backend is an OpenLDAP container started through a
//! [`ContainerRuntime`] and registered on the Keycloak realm as an `ldap`
//! user storage component. All containers carry an ownership label so that a
//! later run (or the `cleanup` command) can find and remove them.

mod backend;
mod docker;
mod pool;
mod runtime;
pub mod testing;

pub use backend::{DirectoryBackend, PoolSettings, UserAccount};
pub use docker::DockerCli;
pub use pool::LdapPool;
pub use runtime::{ContainerInfo, ContainerRuntime, ContainerSpec};
