//! Mock compute provider for testing
//!
//! Records every call and can be configured to fail specific operations.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{ComputeProvider, NodeMetadata, NodeTemplate};
use crate::script::BootScript;
use crate::LaunchError;

/// A call received by the mock provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Launch {
        tag: String,
        count: usize,
        template: NodeTemplate,
    },
    RunScript {
        tag: String,
        script: BootScript,
    },
    Destroy {
        tag: String,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<ProviderCall>,
    launches: usize,
    nodes_created: usize,
    queued: VecDeque<Vec<NodeMetadata>>,
}

/// Mock provider
///
/// # Example
/// ```
/// use cloud_launch_rs::provider::mock::MockProvider;
///
/// let provider = MockProvider::new().with_launch_error(2, "quota exceeded");
/// assert!(provider.calls().is_empty());
/// ```
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
    launch_error: Option<(usize, String)>,
    run_script_error: Option<String>,
    destroy_error: Option<String>,
    launch_delay: Option<Duration>,
}

impl MockProvider {
    /// Create a mock that launches every request successfully
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` launch call (1-based) with a provisioning error
    pub fn with_launch_error(mut self, nth: usize, error: &str) -> Self {
        self.launch_error = Some((nth, error.to_string()));
        self
    }

    /// Fail every run-script call
    pub fn with_run_script_error(mut self, error: &str) -> Self {
        self.run_script_error = Some(error.to_string());
        self
    }

    /// Fail every destroy call
    pub fn with_destroy_error(mut self, error: &str) -> Self {
        self.destroy_error = Some(error.to_string());
        self
    }

    /// Sleep before answering each launch call
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    /// Answer the next unanswered launch call with `nodes` instead of
    /// generated ones
    pub fn with_launch_response(self, nodes: Vec<NodeMetadata>) -> Self {
        self.state().queued.push_back(nodes);
        self
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    /// Templates of every launch call, in order
    pub fn launched_templates(&self) -> Vec<NodeTemplate> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::Launch { template, .. } => Some(template.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Generated node `n`: public 198.51.100.n, private 10.0.0.n
pub fn generated_node(tag: &str, n: usize) -> NodeMetadata {
    NodeMetadata {
        id: Uuid::new_v4().to_string(),
        tag: tag.to_string(),
        public_addresses: vec![format!("198.51.100.{}", n)],
        private_addresses: vec![format!("10.0.0.{}", n)],
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn launch(
        &self,
        tag: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<NodeMetadata>, LaunchError> {
        let nth = {
            let mut state = self.state();
            state.calls.push(ProviderCall::Launch {
                tag: tag.to_string(),
                count,
                template: template.clone(),
            });
            state.launches += 1;
            state.launches
        };

        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((fail_at, error)) = &self.launch_error
            && *fail_at == nth
        {
            return Err(LaunchError::provisioning(tag, error.clone()));
        }

        let mut state = self.state();
        if let Some(nodes) = state.queued.pop_front() {
            return Ok(nodes);
        }
        let first = state.nodes_created + 1;
        state.nodes_created += count;
        Ok((first..first + count)
            .map(|n| generated_node(tag, n))
            .collect())
    }

    async fn run_script_on_tagged(
        &self,
        tag: &str,
        script: &BootScript,
    ) -> Result<(), LaunchError> {
        self.state().calls.push(ProviderCall::RunScript {
            tag: tag.to_string(),
            script: script.clone(),
        });

        match &self.run_script_error {
            Some(error) => Err(LaunchError::Configure(error.clone())),
            None => Ok(()),
        }
    }

    async fn destroy_tagged(&self, tag: &str) -> Result<(), LaunchError> {
        self.state().calls.push(ProviderCall::Destroy {
            tag: tag.to_string(),
        });

        match &self.destroy_error {
            Some(error) => Err(LaunchError::Destroy(error.clone())),
            None => Ok(()),
        }
    }
}
