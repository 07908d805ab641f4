//! cloud-launch-rs library
//!
//! Launches multi-role clusters (Hadoop, ZooKeeper) on a cloud compute
//! provider.
//!
//! # Design Principles
//!
//! - **Composable boot scripts**: a node's first boot is an ordered list of
//!   remote installer invocations, with named hook points for custom steps
//! - **Staged launches**: roles that depend on other roles are launched after
//!   them, with the addresses they need baked into their boot scripts
//! - **Provider agnostic**: all cloud access goes through [`provider::ComputeProvider`]

pub mod cluster;
pub mod provider;
pub mod script;
pub mod service;
pub mod spec;

mod error;

pub use cluster::{Cluster, Instance};
pub use error::LaunchError;
pub use service::ClusterService;
pub use spec::{ClusterSpec, LaunchConfig, ServiceSpec};

use std::sync::Arc;
use tracing::info;

use provider::ComputeProvider;

/// Build the configured service with its hooks loaded
pub fn service_for(
    config: &LaunchConfig,
    provider: Arc<dyn ComputeProvider>,
) -> Result<Box<dyn ClusterService>, LaunchError> {
    let mut service = service::for_spec(config.service.clone(), provider)?;
    *service.registry_mut() = config.registry();
    Ok(service)
}

/// Launch the cluster described by `config`
pub async fn launch_cluster(
    config: &LaunchConfig,
    provider: Arc<dyn ComputeProvider>,
) -> Result<Cluster, LaunchError> {
    info!(
        "Launching {} cluster {}",
        config.service.service_name, config.service.cluster_name
    );
    let service = service_for(config, provider)?;
    service.launch_cluster(&config.cluster).await
}

/// Destroy every node tagged with the configured cluster name
pub async fn destroy_cluster(
    config: &LaunchConfig,
    provider: Arc<dyn ComputeProvider>,
) -> Result<(), LaunchError> {
    let service = service_for(config, provider)?;
    service.destroy_cluster().await
}
