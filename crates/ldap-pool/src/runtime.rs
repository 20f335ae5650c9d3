use anyhow::Result;
use async_trait::async_trait;

/// What to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    /// `(host port, container port)` bindings.
    pub ports: Vec<(u16, u16)>,
    pub env: Vec<(String, String)>,
    pub labels: Vec<String>,
}

/// A container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
}

/// The slice of a container runtime the pool needs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers carrying `label`, running or not.
    async fn list(&self, label: &str) -> Result<Vec<ContainerInfo>>;

    /// Starts a detached container.
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerInfo>;

    async fn remove(&self, container: &ContainerInfo, force: bool, volumes: bool) -> Result<()>;
}
