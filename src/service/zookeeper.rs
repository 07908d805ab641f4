//! ZooKeeper: launch the whole ensemble, then configure the quorum
//!
//! Every member runs the same boot script. Quorum membership needs every
//! member's address, so it is configured in a second pass over the running
//! ensemble. The i-th node returned by the provider becomes server id i.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ClusterService, KeyPair, ServiceContext};
use crate::cluster::{instances_for, Cluster, ZOOKEEPER_HOSTS_KEY};
use crate::provider::{ComputeProvider, NodeMetadata};
use crate::script::{compose, BootScript, InstallStep, InstallSteps, ScriptRegistry};
use crate::spec::{ClusterSpec, RoleSet, ServiceSpec};
use crate::LaunchError;

pub const SERVICE_NAME: &str = "zookeeper";

pub const ZOOKEEPER_ROLE: &str = "zk";

pub const CLIENT_PORT: u16 = 2181;

pub fn ensemble_roles() -> RoleSet {
    RoleSet::new([ZOOKEEPER_ROLE])
}

/// A node's place in the quorum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumMember {
    /// Server id, equal to the node's position in the provider's answer
    pub id: usize,
    pub private_address: String,
}

/// Assign server ids by position
pub fn quorum_members(nodes: &[NodeMetadata]) -> Result<Vec<QuorumMember>, LaunchError> {
    nodes
        .iter()
        .enumerate()
        .map(|(id, node)| {
            Ok(QuorumMember {
                id,
                private_address: node.private_address()?.to_string(),
            })
        })
        .collect()
}

/// Space-separated private addresses, in server id order
pub fn peer_list(members: &[QuorumMember]) -> String {
    members
        .iter()
        .map(|m| m.private_address.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comma-separated `public-address:2181` connect string
pub fn client_hosts(nodes: &[NodeMetadata]) -> Result<String, LaunchError> {
    let hosts = nodes
        .iter()
        .map(|node| Ok(format!("{}:{}", node.public_address()?, CLIENT_PORT)))
        .collect::<Result<Vec<_>, LaunchError>>()?;
    Ok(hosts.join(","))
}

/// Java, then the ZooKeeper installer; the same for every member
pub fn boot_script(steps: &InstallSteps) -> BootScript {
    compose(&[
        steps.fragment(InstallStep::Java),
        steps.fragment(InstallStep::ZooKeeper),
    ])
}

/// ZooKeeper ensemble launcher
///
/// The registry is kept for API symmetry; ensemble boot scripts do not
/// consult it.
pub struct ZooKeeperService {
    ctx: ServiceContext,
}

impl ZooKeeperService {
    pub fn new(spec: ServiceSpec, provider: Arc<dyn ComputeProvider>) -> Self {
        Self {
            ctx: ServiceContext::new(spec, provider),
        }
    }

    /// Boot script shared by every ensemble member
    pub fn boot_script(&self) -> BootScript {
        boot_script(&self.ctx.steps)
    }

    /// Second-phase script configuring quorum membership from `peers`
    pub fn configure_script(&self, peers: &str) -> BootScript {
        compose(&[self
            .ctx
            .steps
            .fragment_with(InstallStep::ZooKeeperPostConfigure, [peers])])
    }

    async fn launch_ensemble(&self, keys: &KeyPair, size: usize) -> Result<Cluster, LaunchError> {
        let template = keys.node_template(self.boot_script(), &[CLIENT_PORT]);
        let nodes = self.ctx.launch_group("ensemble", size, &template).await?;

        let members = quorum_members(&nodes)?;
        let peers = peer_list(&members);
        debug!("Quorum peers in server id order: {}", peers);

        self.ctx.run_script(&self.configure_script(&peers)).await?;

        let mut configuration = BTreeMap::new();
        configuration.insert(ZOOKEEPER_HOSTS_KEY.to_string(), client_hosts(&nodes)?);
        Ok(Cluster::new(
            instances_for(&ensemble_roles(), &nodes)?,
            configuration,
        ))
    }
}

#[async_trait]
impl ClusterService for ZooKeeperService {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn registry(&self) -> &ScriptRegistry {
        &self.ctx.registry
    }

    fn registry_mut(&mut self) -> &mut ScriptRegistry {
        &mut self.ctx.registry
    }

    async fn launch_cluster(&self, cluster_spec: &ClusterSpec) -> Result<Cluster, LaunchError> {
        let size = cluster_spec.require(&ensemble_roles())?.count;
        if size == 0 {
            return Err(LaunchError::Config(
                "ZooKeeper ensemble needs at least one instance".into(),
            ));
        }
        let keys = self.ctx.key_pair().await?;
        info!(
            "Launching ZooKeeper ensemble {} with {} members",
            self.ctx.tag(),
            size
        );

        match self.launch_ensemble(&keys, size).await {
            Ok(cluster) => {
                info!(
                    "ZooKeeper ensemble {} ready at {}",
                    self.ctx.tag(),
                    cluster.zookeeper_hosts().unwrap_or_default()
                );
                Ok(cluster)
            }
            Err(e) => Err(self.ctx.after_failure(e).await),
        }
    }

    async fn destroy_cluster(&self) -> Result<(), LaunchError> {
        self.ctx.destroy().await
    }
}
