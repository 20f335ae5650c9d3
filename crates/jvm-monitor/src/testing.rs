//! Scripted process inspector for tests.

use crate::inspect::{JvmProcess, ProcessInspector};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    processes: Vec<JvmProcess>,
    histogram: String,
    heap_info: String,
    failing_histograms: usize,
    sampled: Vec<u32>,
}

#[derive(Default)]
pub struct FakeInspector {
    state: Mutex<State>,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&self, pid: u32, description: &str) {
        self.state.lock().unwrap().processes.push(JvmProcess {
            pid,
            description: description.to_string(),
        });
    }

    pub fn set_histogram(&self, text: &str) {
        self.state.lock().unwrap().histogram = text.to_string();
    }

    pub fn set_heap_info(&self, text: &str) {
        self.state.lock().unwrap().heap_info = text.to_string();
    }

    /// Makes the next `n` histogram samples fail.
    pub fn fail_histograms(&self, n: usize) {
        self.state.lock().unwrap().failing_histograms = n;
    }

    pub fn histogram_calls(&self) -> usize {
        self.state.lock().unwrap().sampled.len()
    }

    /// Pids passed to `live_histogram`, in call order.
    pub fn sampled_pids(&self) -> Vec<u32> {
        self.state.lock().unwrap().sampled.clone()
    }
}

#[async_trait]
impl ProcessInspector for FakeInspector {
    async fn list_processes(&self) -> Result<Vec<JvmProcess>> {
        Ok(self.state.lock().unwrap().processes.clone())
    }

    async fn live_histogram(&self, pid: u32) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.sampled.push(pid);
        if state.failing_histograms > 0 {
            state.failing_histograms -= 1;
            anyhow::bail!("jmap -histo:live {pid} failed: Unable to open socket file");
        }
        Ok(state.histogram.clone())
    }

    async fn heap_info(&self, _pid: u32) -> Result<String> {
        Ok(self.state.lock().unwrap().heap_info.clone())
    }
}
