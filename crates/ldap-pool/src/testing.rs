//! In-memory container runtime for tests.

use crate::runtime::{ContainerInfo, ContainerRuntime, ContainerSpec};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    containers: Vec<(ContainerInfo, ContainerSpec)>,
    next_id: u64,
    started: usize,
    fail_run_after: Option<usize>,
}

/// Keeps "running" containers in a list.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `run` after the first `n` successful ones fail.
    pub fn fail_run_after(&self, n: usize) {
        self.state.lock().unwrap().fail_run_after = Some(n);
    }

    pub fn containers(&self) -> Vec<ContainerInfo> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|(info, _)| info.clone())
            .collect()
    }

    pub fn labelled(&self, label: &str) -> Vec<ContainerInfo> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|(_, spec)| spec.labels.iter().any(|l| l == label))
            .map(|(info, _)| info.clone())
            .collect()
    }

    /// Published host ports, in start order.
    pub fn ports(&self) -> Vec<u16> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .flat_map(|(_, spec)| spec.ports.iter().map(|(host, _)| *host))
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list(&self, label: &str) -> Result<Vec<ContainerInfo>> {
        Ok(self.labelled(label))
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerInfo> {
        let mut state = self.state.lock().unwrap();
        if state.fail_run_after.is_some_and(|n| state.started >= n) {
            anyhow::bail!("docker run failed: port is already allocated");
        }
        if state.containers.iter().any(|(info, _)| info.name == spec.name) {
            anyhow::bail!("container name {} is already in use", spec.name);
        }
        state.started += 1;
        state.next_id += 1;
        let info = ContainerInfo {
            id: format!("{:012x}", state.next_id),
            name: spec.name.clone(),
        };
        state.containers.push((info.clone(), spec.clone()));
        Ok(info)
    }

    async fn remove(&self, container: &ContainerInfo, _force: bool, _volumes: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.containers.len();
        state.containers.retain(|(info, _)| info.id != container.id);
        if state.containers.len() == before {
            anyhow::bail!("No such container: {}", container.id);
        }
        Ok(())
    }
}
