use crate::inspect::ProcessInspector;
use crate::parse::{class_filter, kb_to_mb, parse_heap_used_kb, parse_histogram, ClassCount};
use crate::target::{select_target, signature_pattern};
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    /// Substrings identifying the Keycloak JVM in the `jcmd` listing.
    pub signatures: Vec<String>,
    /// Simple class names whose live instances are reported.
    pub classes: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            signatures: vec![
                // production (Quarkus) distribution
                "io.quarkus.bootstrap.runner.QuarkusEntryPoint".to_string(),
                // dev server started from the source tree
                "Pkeycloak-server".to_string(),
            ],
            classes: vec![
                "DefaultKeycloakSession".to_string(),
                "QuarkusKeycloakSession".to_string(),
                "LDAPIdentityStore".to_string(),
                "LDAPStorageProvider".to_string(),
            ],
        }
    }
}

/// One telemetry cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub classes: Vec<ClassCount>,
    /// `None` when the heap figure could not be read this cycle.
    pub heap_used_kb: Option<u64>,
}

impl Sample {
    pub fn heap_used_mb(&self) -> Option<f64> {
        self.heap_used_kb.map(kb_to_mb)
    }

    /// Console form of the sample.
    pub fn render(&self) -> String {
        let mut out = String::from("number of instances:\n");
        for class in &self.classes {
            let _ = writeln!(out, "{:<10}{}", class.instances, class.short_name());
        }
        if let Some(mb) = self.heap_used_mb() {
            let _ = writeln!(out, "mem used: {mb:.2}m");
        }
        out.push('\n');
        out
    }
}

/// Foreground telemetry loop over the Keycloak JVM.
pub struct Monitor {
    inspector: Arc<dyn ProcessInspector>,
    interval: Duration,
    signature: Regex,
    class_filter: Regex,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(
        inspector: Arc<dyn ProcessInspector>,
        settings: &MonitorSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            inspector,
            interval: settings.interval,
            signature: signature_pattern(&settings.signatures)
                .context("Invalid process signature")?,
            class_filter: class_filter(&settings.classes).context("Invalid class list")?,
            cancel,
        })
    }

    /// Pid of the monitored JVM. Zero or several candidates is an error.
    pub async fn locate(&self) -> Result<u32> {
        let processes = self
            .inspector
            .list_processes()
            .await
            .context("Failed to list JVM processes")?;
        Ok(select_target(&processes, &self.signature)?)
    }

    pub async fn sample(&self, pid: u32) -> Result<Sample> {
        let histogram = self
            .inspector
            .live_histogram(pid)
            .await
            .context("Failed to sample live histogram")?;
        let classes = parse_histogram(&histogram, &self.class_filter);

        let heap_used_kb = match self.inspector.heap_info(pid).await {
            Ok(text) => parse_heap_used_kb(&text),
            Err(e) => {
                warn!("Failed to sample heap info: {e:#}");
                None
            }
        };
        if heap_used_kb.is_none() {
            warn!("heap info not found using jcmd");
        }

        Ok(Sample {
            classes,
            heap_used_kb,
        })
    }

    /// Locates the JVM, then prints a sample every interval until cancelled.
    pub async fn run(&self) -> Result<()> {
        let pid = self.locate().await?;
        info!("Monitoring keycloak process {pid}");
        self.poll(pid, |sample| print!("{}", sample.render())).await;
        Ok(())
    }

    /// Sampling loop over an already located `pid`.
    pub async fn poll<F>(&self, pid: u32, mut emit: F)
    where
        F: FnMut(&Sample),
    {
        loop {
            match self.sample(pid).await {
                Ok(sample) => emit(&sample),
                Err(e) => warn!("Skipping telemetry cycle: {e:#}"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Telemetry monitor stopped");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
