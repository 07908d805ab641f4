//! Cluster launch services
//!
//! Each service knows how to bring up one kind of cluster: which boot
//! scripts each role gets, how many launch phases are needed, and how the
//! provider's answers become a [`Cluster`].
//!
//! Launch phases run strictly in sequence. Each provider call is awaited
//! before the next phase starts.

pub mod hadoop;
pub mod zookeeper;

pub use hadoop::HadoopService;
pub use zookeeper::ZooKeeperService;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cluster::Cluster;
use crate::provider::{bounded, ComputeProvider, NodeMetadata, NodeTemplate};
use crate::script::{BootScript, InstallSteps, ScriptRegistry};
use crate::spec::{ClusterSpec, FailurePolicy, ServiceSpec};
use crate::LaunchError;

/// Capability shared by every cluster type
#[async_trait]
pub trait ClusterService: Send + Sync {
    /// Service name (e.g., "hadoop", "zookeeper")
    fn name(&self) -> &'static str;

    /// Hook scripts consulted while composing boot scripts
    fn registry(&self) -> &ScriptRegistry;

    /// Populate hooks; must happen before [`ClusterService::launch_cluster`]
    fn registry_mut(&mut self) -> &mut ScriptRegistry;

    /// Launch every role group and describe the resulting cluster
    async fn launch_cluster(&self, cluster_spec: &ClusterSpec) -> Result<Cluster, LaunchError>;

    /// Destroy every node tagged with the cluster name
    async fn destroy_cluster(&self) -> Result<(), LaunchError>;
}

/// Build the service named by `spec.service_name`
pub fn for_spec(
    spec: ServiceSpec,
    provider: Arc<dyn ComputeProvider>,
) -> Result<Box<dyn ClusterService>, LaunchError> {
    match spec.service_name.to_lowercase().as_str() {
        hadoop::SERVICE_NAME => Ok(Box::new(HadoopService::new(spec, provider))),
        zookeeper::SERVICE_NAME => Ok(Box::new(ZooKeeperService::new(spec, provider))),
        other => Err(LaunchError::Config(format!("unknown service '{}'", other))),
    }
}

/// Key material for node templates
#[derive(Clone)]
pub(crate) struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    /// Node template running `script` with this key pair and `ports` open
    pub fn node_template(&self, script: BootScript, ports: &[u16]) -> NodeTemplate {
        NodeTemplate::new(script, self.private_key.clone(), self.public_key.clone())
            .with_inbound_ports(ports)
    }
}

/// State shared by the service implementations
pub(crate) struct ServiceContext {
    pub spec: ServiceSpec,
    pub provider: Arc<dyn ComputeProvider>,
    pub registry: ScriptRegistry,
    pub steps: InstallSteps,
}

impl ServiceContext {
    pub fn new(spec: ServiceSpec, provider: Arc<dyn ComputeProvider>) -> Self {
        let steps = InstallSteps::new(spec.script_base_url.as_deref());
        Self {
            spec,
            provider,
            registry: ScriptRegistry::new(),
            steps,
        }
    }

    pub fn tag(&self) -> &str {
        &self.spec.cluster_name
    }

    /// Read the key pair installed on every launched node
    pub async fn key_pair(&self) -> Result<KeyPair, LaunchError> {
        Ok(KeyPair {
            private_key: self.spec.read_private_key().await?,
            public_key: self.spec.read_public_key().await?,
        })
    }

    /// Launch one role group tagged with the cluster name
    pub async fn launch_group(
        &self,
        group: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<NodeMetadata>, LaunchError> {
        info!(
            "Launching {} {} node(s) for cluster {} via {}",
            count,
            group,
            self.tag(),
            self.provider.name()
        );

        let operation = format!("{} launch", group);
        let nodes = bounded(
            self.spec.deadline(),
            &operation,
            self.provider.launch(self.tag(), count, template),
        )
        .await
        .map_err(|e| match e {
            LaunchError::Provisioning { message, .. } => {
                LaunchError::provisioning(group, message)
            }
            other => other,
        })?;

        info!("Provider returned {} {} node(s)", nodes.len(), group);
        Ok(nodes)
    }

    /// Run `script` on every node of the cluster
    pub async fn run_script(&self, script: &BootScript) -> Result<(), LaunchError> {
        info!("Running configuration script on cluster {}", self.tag());
        bounded(
            self.spec.deadline(),
            "configuration script",
            self.provider.run_script_on_tagged(self.tag(), script),
        )
        .await
    }

    pub async fn destroy(&self) -> Result<(), LaunchError> {
        info!("Destroying cluster {}", self.tag());
        bounded(
            self.spec.deadline(),
            "cluster teardown",
            self.provider.destroy_tagged(self.tag()),
        )
        .await
    }

    /// Apply the failure policy to nodes already launched, then hand back `err`
    pub async fn after_failure(&self, err: LaunchError) -> LaunchError {
        match self.spec.failure_policy {
            FailurePolicy::LeaveRunning => {
                warn!(
                    "Launch of cluster {} failed; launched nodes are left running: {}",
                    self.tag(),
                    err
                );
            }
            FailurePolicy::DestroyCluster => {
                warn!(
                    "Launch of cluster {} failed, destroying launched nodes: {}",
                    self.tag(),
                    err
                );
                if let Err(destroy_err) = self.destroy().await {
                    error!(
                        "Could not destroy cluster {} after failed launch: {}",
                        self.tag(),
                        destroy_err
                    );
                }
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;

    #[test]
    fn test_for_spec_selects_service() {
        let provider: Arc<dyn ComputeProvider> = Arc::new(MockProvider::new());

        let hadoop = for_spec(ServiceSpec::new("hadoop", "c", "ec2"), provider.clone()).unwrap();
        assert_eq!(hadoop.name(), "hadoop");

        let zk = for_spec(ServiceSpec::new("ZooKeeper", "c", "ec2"), provider.clone()).unwrap();
        assert_eq!(zk.name(), "zookeeper");

        let err = for_spec(ServiceSpec::new("cassandra", "c", "ec2"), provider)
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_registry_is_owned_by_service() {
        let provider: Arc<dyn ComputeProvider> = Arc::new(MockProvider::new());
        let mut service = for_spec(ServiceSpec::new("hadoop", "c", "ec2"), provider).unwrap();
        service
            .registry_mut()
            .add_default_one(crate::script::ScriptFragment::new("extra"));
        assert_eq!(service.registry().get("DEFAULT").len(), 1);
    }

    #[tokio::test]
    async fn test_after_failure_destroys_when_configured() {
        let mock = Arc::new(MockProvider::new());
        let mut spec = ServiceSpec::new("hadoop", "doomed", "ec2");
        spec.failure_policy = FailurePolicy::DestroyCluster;
        let ctx = ServiceContext::new(spec, mock.clone());

        let err = ctx
            .after_failure(LaunchError::provisioning("worker", "boom"))
            .await;
        assert!(err.to_string().contains("boom"));
        assert_eq!(
            mock.calls(),
            vec![crate::provider::mock::ProviderCall::Destroy {
                tag: "doomed".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_after_failure_leaves_nodes_by_default() {
        let mock = Arc::new(MockProvider::new());
        let ctx = ServiceContext::new(ServiceSpec::new("hadoop", "c", "ec2"), mock.clone());

        ctx.after_failure(LaunchError::Configure("x".into())).await;
        assert!(mock.calls().is_empty());
    }
}
