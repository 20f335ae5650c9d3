//! Docker container runtime driven through the `docker` CLI.

use crate::runtime::{ContainerInfo, ContainerRuntime, ContainerSpec};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Runs containers with the `docker` binary found on `PATH`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn docker(&self, args: &[String]) -> Result<String> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {} {}", self.binary, args[0]))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} {} failed: {}", self.binary, args[0], stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments of `docker run` for `spec`.
pub(crate) fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    for (host, container) in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{host}:{container}"));
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for label in &spec.labels {
        args.push("--label".to_string());
        args.push(label.clone());
    }
    args.push(spec.image.clone());
    args
}

/// Parses `docker ps --format '{{.ID}}\t{{.Names}}'` output.
pub(crate) fn parse_ps(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(2, '\t');
            let id = parts.next()?.trim();
            if id.is_empty() {
                return None;
            }
            let name = parts.next().unwrap_or_default().trim();
            Some(ContainerInfo {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list(&self, label: &str) -> Result<Vec<ContainerInfo>> {
        let output = self
            .docker(&[
                "ps".to_string(),
                "-a".to_string(),
                "--filter".to_string(),
                format!("label={label}"),
                "--format".to_string(),
                "{{.ID}}\t{{.Names}}".to_string(),
            ])
            .await?;
        Ok(parse_ps(&output))
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerInfo> {
        let output = self
            .docker(&run_args(spec))
            .await
            .with_context(|| format!("Failed to start container {}", spec.name))?;
        Ok(ContainerInfo {
            id: output.trim().to_string(),
            name: spec.name.clone(),
        })
    }

    async fn remove(&self, container: &ContainerInfo, force: bool, volumes: bool) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        if volumes {
            args.push("--volumes".to_string());
        }
        args.push(container.id.clone());
        self.docker(&args)
            .await
            .with_context(|| format!("Failed to remove container {}", container.name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let spec = ContainerSpec {
            image: "bitnami/openldap:2.6.3".to_string(),
            name: "ldap-10389".to_string(),
            ports: vec![(10389, 1389)],
            env: vec![("LDAP_USERS".to_string(), "user0".to_string())],
            labels: vec!["kc-reproducer".to_string()],
        };
        assert_eq!(
            run_args(&spec),
            vec![
                "run",
                "-d",
                "--name",
                "ldap-10389",
                "-p",
                "10389:1389",
                "-e",
                "LDAP_USERS=user0",
                "--label",
                "kc-reproducer",
                "bitnami/openldap:2.6.3",
            ]
        );
    }

    #[test]
    fn test_parse_ps() {
        let output = "3f2a1b\tldap-10389\n9c8d7e\tldap-10390\n\n";
        let containers = parse_ps(output);
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].id, "3f2a1b");
        assert_eq!(containers[1].name, "ldap-10390");
        assert!(parse_ps("").is_empty());
    }
}
