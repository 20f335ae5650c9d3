use anyhow::Context;
use clap::Parser;
use jvm_monitor::{JdkTools, Monitor};
use kc_leak_repro::config::{CleanupArgs, MonitorArgs, RunArgs};
use kc_leak_repro::signal::install_shutdown_handler;
use kc_leak_repro::{Cli, Commands, Orchestrator, RunSettings};
use keycloak_admin::AdminConnector;
use ldap_pool::{DockerCli, LdapPool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    if cli.command.runs_until_interrupted() {
        install_shutdown_handler(cancel.clone());
    }

    match cli.command {
        Commands::Run(args) => run_reproducer(args, cancel).await,
        Commands::Cleanup(args) => run_cleanup(args).await,
        Commands::Monitor(args) => run_monitor(args, cancel).await,
    }
}

async fn run_reproducer(args: RunArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let settings = RunSettings::try_from(&args)?;
    let mut orchestrator = Orchestrator::new(
        settings,
        Arc::new(args.server.credentials()),
        Arc::new(DockerCli::new(&args.pool.docker_bin)),
        Arc::new(JdkTools::new(&args.monitor.jcmd_bin, &args.monitor.jmap_bin)),
        cancel,
    );
    orchestrator.run().await
}

async fn run_cleanup(args: CleanupArgs) -> anyhow::Result<()> {
    let admin = args
        .server
        .credentials()
        .connect()
        .await
        .context("Failed to log in to keycloak")?;
    let pool = LdapPool::new(
        Arc::new(DockerCli::new(&args.pool.docker_bin)),
        args.pool.settings(),
    );
    let removed = pool.cleanup(Some(admin.as_ref())).await;
    info!("Removed {removed} ldap backends");
    Ok(())
}

async fn run_monitor(args: MonitorArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let inspector = Arc::new(JdkTools::new(&args.monitor.jcmd_bin, &args.monitor.jmap_bin));
    Monitor::new(inspector, &args.monitor.settings(), cancel)?
        .run()
        .await
}
