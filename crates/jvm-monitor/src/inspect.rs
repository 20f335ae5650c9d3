use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// A JVM listed by `jcmd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmProcess {
    pub pid: u32,
    /// Main class or jar plus arguments, as printed by `jcmd`.
    pub description: String,
}

/// Host-level inspection of running JVMs.
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    async fn list_processes(&self) -> Result<Vec<JvmProcess>>;

    /// Raw `jmap -histo:live` output.
    async fn live_histogram(&self, pid: u32) -> Result<String>;

    /// Raw `jcmd <pid> GC.heap_info` output.
    async fn heap_info(&self, pid: u32) -> Result<String>;
}

/// Inspects JVMs with the JDK's `jcmd` and `jmap` tools.
#[derive(Debug, Clone)]
pub struct JdkTools {
    jcmd: String,
    jmap: String,
}

impl JdkTools {
    pub fn new(jcmd: &str, jmap: &str) -> Self {
        Self {
            jcmd: jcmd.to_string(),
            jmap: jmap.to_string(),
        }
    }
}

async fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to execute {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{program} {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses the process listing printed by `jcmd` without arguments.
pub(crate) fn parse_jcmd_listing(output: &str) -> Vec<JvmProcess> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (pid, description) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            Some(JvmProcess {
                pid: pid.parse().ok()?,
                description: description.trim().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ProcessInspector for JdkTools {
    async fn list_processes(&self) -> Result<Vec<JvmProcess>> {
        Ok(parse_jcmd_listing(&run_tool(&self.jcmd, &[]).await?))
    }

    async fn live_histogram(&self, pid: u32) -> Result<String> {
        let pid = pid.to_string();
        run_tool(&self.jmap, &["-histo:live", pid.as_str()]).await
    }

    async fn heap_info(&self, pid: u32) -> Result<String> {
        let pid = pid.to_string();
        run_tool(&self.jcmd, &[pid.as_str(), "GC.heap_info"]).await
    }
}
