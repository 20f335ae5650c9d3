//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it (`LDAP_COUNT`, `SEARCH_COUNT`, ...).

use clap::{Args, Parser, Subcommand};
use jvm_monitor::MonitorSettings;
use keycloak_admin::AdminCredentials;
use ldap_pool::PoolSettings;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kc-leak-repro")]
#[command(about = "Reproduces Keycloak session and LDAP provider leaks under sustained load")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision LDAP backends, start the load drivers and monitor the JVM
    Run(RunArgs),

    /// Remove LDAP containers and components left behind by an earlier run
    Cleanup(CleanupArgs),

    /// Only monitor the Keycloak JVM
    Monitor(MonitorArgs),
}

impl Commands {
    /// Whether the command loops until cancelled by a signal. Other commands
    /// keep the default Ctrl-C behaviour.
    pub fn runs_until_interrupted(&self) -> bool {
        !matches!(self, Commands::Cleanup(_))
    }
}

/// Keycloak admin API connection.
#[derive(Args, Clone, Debug)]
pub struct ServerOpts {
    /// Keycloak base URL, including the context path
    #[arg(long, env = "KEYCLOAK_URL", default_value = "http://localhost:8081/auth/")]
    pub server_url: String,

    #[arg(long, env = "KEYCLOAK_ADMIN", default_value = "admin")]
    pub admin_username: String,

    #[arg(long, env = "KEYCLOAK_ADMIN_PASSWORD", default_value = "admin")]
    pub admin_password: String,

    #[arg(long, env = "KEYCLOAK_REALM", default_value = "master")]
    pub realm: String,

    /// Admin API request timeout in seconds
    #[arg(long, env = "KEYCLOAK_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Verify TLS certificates of the server
    #[arg(long, env = "KEYCLOAK_VERIFY_TLS")]
    pub verify_tls: bool,
}

impl ServerOpts {
    pub fn credentials(&self) -> AdminCredentials {
        let mut credentials = AdminCredentials::new(
            &self.server_url,
            &self.admin_username,
            &self.admin_password,
            &self.realm,
        );
        credentials.timeout = Duration::from_secs(self.request_timeout_secs);
        credentials.verify_tls = self.verify_tls;
        credentials
    }
}

/// LDAP backend pool.
#[derive(Args, Clone, Debug)]
pub struct PoolOpts {
    /// Number of LDAP backends to provision
    #[arg(long, env = "LDAP_COUNT", default_value_t = 12)]
    pub ldap_count: usize,

    #[arg(long, env = "LDAP_IMAGE", default_value = "bitnami/openldap:2.6.3")]
    pub ldap_image: String,

    /// Host port of the first backend; the others follow sequentially
    #[arg(long, env = "LDAP_BASE_PORT", default_value_t = 10389)]
    pub ldap_base_port: u16,

    /// Label marking the containers owned by this tool
    #[arg(long, env = "DOCKER_LABEL", default_value = "kc-reproducer")]
    pub docker_label: String,

    /// Host name Keycloak uses to reach the LDAP backends
    #[arg(long, env = "LDAP_HOST", default_value = "localhost")]
    pub ldap_host: String,

    /// Container runtime binary
    #[arg(long, env = "DOCKER_BIN", default_value = "docker")]
    pub docker_bin: String,
}

impl PoolOpts {
    pub fn settings(&self) -> PoolSettings {
        PoolSettings {
            image: self.ldap_image.clone(),
            label: self.docker_label.clone(),
            base_port: self.ldap_base_port,
            host: self.ldap_host.clone(),
            ..PoolSettings::default()
        }
    }
}

/// Load drivers.
#[derive(Args, Clone, Debug)]
pub struct LoadOpts {
    /// Number of concurrent user search workers
    #[arg(long, env = "SEARCH_COUNT", default_value_t = 8)]
    pub search_count: usize,

    /// Maximum number of concurrently running workers
    #[arg(long, env = "WORKER_CAPACITY", default_value_t = 100)]
    pub worker_capacity: usize,

    /// Pause between two searches of one worker, in milliseconds
    #[arg(long, env = "QUERY_PAUSE_MS", default_value_t = 0)]
    pub query_pause_ms: u64,

    /// Interval between two readiness probes, in seconds
    #[arg(long, env = "READINESS_INTERVAL_SECS", default_value_t = 2)]
    pub readiness_interval_secs: u64,
}

/// JVM telemetry.
#[derive(Args, Clone, Debug)]
pub struct MonitorOpts {
    /// Sampling interval in seconds
    #[arg(long, env = "MONITOR_INTERVAL_SECS", default_value_t = 5)]
    pub monitor_interval_secs: u64,

    #[arg(long, env = "JCMD_BIN", default_value = "jcmd")]
    pub jcmd_bin: String,

    #[arg(long, env = "JMAP_BIN", default_value = "jmap")]
    pub jmap_bin: String,
}

impl MonitorOpts {
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(self.monitor_interval_secs),
            ..MonitorSettings::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub server: ServerOpts,

    #[command(flatten)]
    pub pool: PoolOpts,

    #[command(flatten)]
    pub load: LoadOpts,

    #[command(flatten)]
    pub monitor: MonitorOpts,
}

#[derive(Args, Clone, Debug)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub server: ServerOpts,

    #[command(flatten)]
    pub pool: PoolOpts,
}

#[derive(Args, Clone, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub monitor: MonitorOpts,
}

/// Everything the orchestrator needs, resolved from [`RunArgs`].
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub server_url: String,
    pub verify_tls: bool,
    pub readiness_interval: Duration,
    pub backend_count: usize,
    pub search_workers: usize,
    pub worker_capacity: usize,
    pub query_pause: Duration,
    pub pool: PoolSettings,
    pub monitor: MonitorSettings,
}

impl RunSettings {
    /// Defaults against the given server.
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            verify_tls: false,
            readiness_interval: Duration::from_secs(2),
            backend_count: 12,
            search_workers: 8,
            worker_capacity: 100,
            query_pause: Duration::ZERO,
            pool: PoolSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }

    /// The query workers plus the sync worker must fit in the worker pool.
    pub fn validate(&self) -> anyhow::Result<()> {
        let needed = self.search_workers + 1;
        if self.worker_capacity < needed {
            anyhow::bail!(
                "Worker capacity {} is too small for {} search workers and the sync worker",
                self.worker_capacity,
                self.search_workers
            );
        }
        if self.monitor.interval.is_zero() {
            anyhow::bail!("Monitor interval must be at least one second");
        }
        Ok(())
    }
}

impl TryFrom<&RunArgs> for RunSettings {
    type Error = anyhow::Error;

    fn try_from(args: &RunArgs) -> anyhow::Result<Self> {
        let settings = Self {
            server_url: args.server.server_url.clone(),
            verify_tls: args.server.verify_tls,
            readiness_interval: Duration::from_secs(args.load.readiness_interval_secs),
            backend_count: args.pool.ldap_count,
            search_workers: args.load.search_count,
            worker_capacity: args.load.worker_capacity,
            query_pause: Duration::from_millis(args.load.query_pause_ms),
            pool: args.pool.settings(),
            monitor: args.monitor.settings(),
        };
        settings.validate()?;
        Ok(settings)
    }
}
