//! Hadoop: master first, then workers
//!
//! The single master (namenode + jobtracker) is launched first so that its
//! address can be baked into the workers' boot scripts. Both boot scripts
//! splice the registry hooks around the Java and Hadoop installers.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ClusterService, KeyPair, ServiceContext};
use crate::cluster::{instances_for, Cluster};
use crate::provider::{ComputeProvider, NodeMetadata};
use crate::script::{
    compose, BootScript, InstallStep, InstallSteps, ScriptFragment, ScriptRegistry,
};
use crate::spec::{ClusterSpec, RoleSet, ServiceSpec};
use crate::LaunchError;

pub const SERVICE_NAME: &str = "hadoop";

/// Namenode and jobtracker
pub const MASTER_ROLES: [&str; 2] = ["nn", "jt"];

/// Datanode and tasktracker
pub const WORKER_ROLES: [&str; 2] = ["dn", "tt"];

pub const NAMENODE_PORT: u16 = 8020;
pub const JOBTRACKER_PORT: u16 = 8021;
pub const JOBTRACKER_WEB_PORT: u16 = 50030;

/// Inbound ports opened on the master besides SSH
pub const MASTER_PORTS: [u16; 4] = [80, NAMENODE_PORT, JOBTRACKER_PORT, JOBTRACKER_WEB_PORT];

pub fn master_roles() -> RoleSet {
    RoleSet::new(MASTER_ROLES)
}

pub fn worker_roles() -> RoleSet {
    RoleSet::new(WORKER_ROLES)
}

/// Properties a client needs to reach the cluster through a SOCKS proxy
pub fn client_properties(namenode: &str, jobtracker: &str) -> BTreeMap<String, String> {
    let mut config = BTreeMap::new();
    config.insert("hadoop.job.ugi".to_string(), "root,root".to_string());
    config.insert(
        "fs.default.name".to_string(),
        format!("hdfs://{}:{}/", namenode, NAMENODE_PORT),
    );
    config.insert(
        "mapred.job.tracker".to_string(),
        format!("{}:{}", jobtracker, JOBTRACKER_PORT),
    );
    config.insert("hadoop.socks.server".to_string(), "localhost:6666".to_string());
    config.insert(
        "hadoop.rpc.socket.factory.class.default".to_string(),
        "org.apache.hadoop.net.SocksSocketFactory".to_string(),
    );
    config
}

/// Hooks and installers in bootstrap order, around `install`
fn bootstrap(
    registry: &ScriptRegistry,
    steps: &InstallSteps,
    install: ScriptFragment,
) -> Vec<ScriptFragment> {
    registry.around_install(SERVICE_NAME, steps.fragment(InstallStep::Java), install)
}

/// Master boot script: Hadoop installed for `nn,jt` with a hint naming the
/// target provider
pub fn master_boot_script(
    registry: &ScriptRegistry,
    steps: &InstallSteps,
    provider: &str,
) -> BootScript {
    let install = steps.fragment_with(
        InstallStep::Hadoop,
        [MASTER_ROLES.join(","), "-c".to_string(), provider.to_string()],
    );
    let fragments = bootstrap(registry, steps, install);
    debug!("Composed master boot script from {} fragments", fragments.len());
    compose(&fragments)
}

/// Worker boot script: Hadoop installed for `dn,tt`, pointed at the
/// namenode and jobtracker on `master_address`
pub fn worker_boot_script(
    registry: &ScriptRegistry,
    steps: &InstallSteps,
    master_address: &str,
) -> BootScript {
    let install = steps.fragment_with(
        InstallStep::Hadoop,
        [
            WORKER_ROLES.join(","),
            "-n".to_string(),
            master_address.to_string(),
            "-j".to_string(),
            master_address.to_string(),
        ],
    );
    let fragments = bootstrap(registry, steps, install);
    debug!("Composed worker boot script from {} fragments", fragments.len());
    compose(&fragments)
}

/// Two-tier Hadoop cluster launcher
pub struct HadoopService {
    ctx: ServiceContext,
}

impl HadoopService {
    pub fn new(spec: ServiceSpec, provider: Arc<dyn ComputeProvider>) -> Self {
        Self {
            ctx: ServiceContext::new(spec, provider),
        }
    }

    /// Boot script for the master: Hadoop installed for `nn,jt` with the provider hint
    pub fn master_boot_script(&self) -> BootScript {
        master_boot_script(&self.ctx.registry, &self.ctx.steps, &self.ctx.spec.provider)
    }

    /// Boot script for workers, pointing them at the master
    pub fn worker_boot_script(&self, master_address: &str) -> BootScript {
        worker_boot_script(&self.ctx.registry, &self.ctx.steps, master_address)
    }

    /// Master and worker counts, checked before any provider call
    fn group_sizes(cluster_spec: &ClusterSpec) -> Result<usize, LaunchError> {
        let master = cluster_spec.require(&master_roles())?;
        if master.count != 1 {
            return Err(LaunchError::Config(format!(
                "Hadoop needs exactly 1 {} instance, got {}",
                master.roles, master.count
            )));
        }
        Ok(cluster_spec.require(&worker_roles())?.count)
    }

    async fn launch_master(&self, keys: &KeyPair) -> Result<NodeMetadata, LaunchError> {
        let template = keys.node_template(self.master_boot_script(), &MASTER_PORTS);
        let mut nodes = self.ctx.launch_group("master", 1, &template).await?;
        match nodes.len() {
            1 => Ok(nodes.remove(0)),
            n => Err(LaunchError::Provider(format!(
                "expected exactly one master node, got {}",
                n
            ))),
        }
    }

    async fn launch_workers(
        &self,
        keys: &KeyPair,
        master: &NodeMetadata,
        count: usize,
    ) -> Result<Cluster, LaunchError> {
        let master_public = master.public_address()?;
        let master_for_workers = master.address(self.ctx.spec.master_address)?;
        info!(
            "Master {} is up at {} (workers use {} address {})",
            master.id, master_public, self.ctx.spec.master_address, master_for_workers
        );

        let template = keys.node_template(self.worker_boot_script(master_for_workers), &[]);
        let workers = self.ctx.launch_group("worker", count, &template).await?;

        let mut instances = instances_for(&master_roles(), std::slice::from_ref(master))?;
        instances.extend(instances_for(&worker_roles(), &workers)?);

        Ok(Cluster::new(
            instances,
            client_properties(master_public, master_public),
        ))
    }
}

#[async_trait]
impl ClusterService for HadoopService {
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
        let worker_count = Self::group_sizes(cluster_spec)?;
        let keys = self.ctx.key_pair().await?;
        info!(
            "Launching Hadoop cluster {} with 1 master and {} workers",
            self.ctx.tag(),
            worker_count
        );

        let master = match self.launch_master(&keys).await {
            Ok(master) => master,
            Err(e) => return Err(self.ctx.after_failure(e).await),
        };

        let cluster = match self.launch_workers(&keys, &master, worker_count).await {
            Ok(cluster) => cluster,
            Err(e) => return Err(self.ctx.after_failure(e).await),
        };
        info!(
            "Hadoop cluster {} launched with {} instances",
            self.ctx.tag(),
            cluster.instances().len()
        );

        // The nodes are up; a local write failure must not undo that
        if let Some(path) = &self.ctx.spec.client_site_file
            && let Err(e) = cluster.write_client_site(path).await
        {
            warn!(
                "Could not write client configuration to {}: {}",
                path.display(),
                e
            );
        }
        Ok(cluster)
    }

    async fn destroy_cluster(&self) -> Result<(), LaunchError> {
        self.ctx.destroy().await
    }
}
