//! Keycloak leak reproducer
//!
//! Puts a Keycloak server under sustained admin API load while a pool of
//! throwaway OpenLDAP backends is federated into its realm, and prints live
//! instance counts of the session and LDAP provider classes together with
//! heap usage of the server JVM.
//!
//! # CLI Usage
//!
//! ```bash
//! # Provision 12 backends, start 8 search workers and monitor the JVM
//! kc-leak-repro run
//!
//! # Same against a remote server with fewer backends
//! LDAP_COUNT=3 kc-leak-repro run --server-url https://kc.example:8443/auth/
//!
//! # Remove what a crashed run left behind
//! kc-leak-repro cleanup
//! ```

pub mod config;
pub mod drivers;
pub mod orchestrator;
pub mod pool;
pub mod readiness;
pub mod retry;
pub mod signal;

pub use config::{Cli, Commands, RunSettings};
pub use drivers::{sync_all, QueryDriver, SyncDriver};
pub use orchestrator::{Orchestrator, Phase};
pub use pool::WorkerPool;
pub use readiness::wait_for_server;
pub use retry::{Outcome, RetryPolicy, RetryingOperation};
