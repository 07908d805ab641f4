//! Compute provider capability
//!
//! Launch orchestrators never talk to a cloud directly. They go through a
//! [`ComputeProvider`], which creates tagged groups of nodes running a boot
//! script, runs scripts on already-running tagged nodes, and destroys nodes
//! by tag.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::script::BootScript;
use crate::spec::ServiceSpec;
use crate::LaunchError;

/// TCP port opened on every node for SSH
pub const SSH_PORT: u16 = 22;

/// Operating system family requested for new nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[default]
    Ubuntu,
    Debian,
    Centos,
}

/// Which of a node's addresses to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    #[default]
    Public,
    Private,
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressKind::Public => write!(f, "public"),
            AddressKind::Private => write!(f, "private"),
        }
    }
}

/// A node as reported by the provider after launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub id: String,
    pub tag: String,
    #[serde(default)]
    pub public_addresses: Vec<String>,
    #[serde(default)]
    pub private_addresses: Vec<String>,
}

impl NodeMetadata {
    /// First public address; extra addresses are ignored
    pub fn public_address(&self) -> Result<&str, LaunchError> {
        self.address(AddressKind::Public)
    }

    /// First private address; extra addresses are ignored
    pub fn private_address(&self) -> Result<&str, LaunchError> {
        self.address(AddressKind::Private)
    }

    pub fn address(&self, kind: AddressKind) -> Result<&str, LaunchError> {
        let addresses = match kind {
            AddressKind::Public => &self.public_addresses,
            AddressKind::Private => &self.private_addresses,
        };
        addresses.first().map(String::as_str).ok_or_else(|| {
            LaunchError::Provider(format!("node {} has no {} address", self.id, kind))
        })
    }
}

/// What to launch: OS, boot script, key material and inbound ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTemplate {
    pub os_family: OsFamily,
    pub boot_script: BootScript,
    /// Private key installed on the node
    pub private_key: String,
    /// Public key authorized for SSH login
    pub public_key: String,
    pub inbound_ports: Vec<u16>,
}

impl NodeTemplate {
    /// Ubuntu template with only SSH open
    pub fn new(boot_script: BootScript, private_key: String, public_key: String) -> Self {
        Self {
            os_family: OsFamily::Ubuntu,
            boot_script,
            private_key,
            public_key,
            inbound_ports: vec![SSH_PORT],
        }
    }

    /// Open additional inbound ports; SSH stays open
    pub fn with_inbound_ports(mut self, ports: &[u16]) -> Self {
        for port in ports {
            if !self.inbound_ports.contains(port) {
                self.inbound_ports.push(*port);
            }
        }
        self
    }
}

/// Trait for cloud compute providers
///
/// Each call blocks the launch sequence until the provider answers; a whole
/// group of `count` nodes is launched by one call.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Name of this provider (e.g., "http", "mock")
    fn name(&self) -> &'static str;

    /// Launch `count` nodes tagged with `tag`, each running the template's boot script
    async fn launch(
        &self,
        tag: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<NodeMetadata>, LaunchError>;

    /// Run `script` on every running node tagged with `tag`
    async fn run_script_on_tagged(&self, tag: &str, script: &BootScript) -> Result<(), LaunchError>;

    /// Destroy every node tagged with `tag`
    async fn destroy_tagged(&self, tag: &str) -> Result<(), LaunchError>;
}

/// Await a provider call, failing with [`LaunchError::Timeout`] once
/// `deadline` elapses. `None` waits as long as the provider takes.
pub async fn bounded<T, F>(
    deadline: Option<Duration>,
    operation: &str,
    call: F,
) -> Result<T, LaunchError>
where
    F: Future<Output = Result<T, LaunchError>>,
{
    match deadline {
        None => call.await,
        Some(limit) => {
            debug!("Waiting up to {:?} for {}", limit, operation);
            tokio::time::timeout(limit, call)
                .await
                .map_err(|_| LaunchError::Timeout {
                    operation: operation.to_string(),
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?
        }
    }
}

/// Build the provider described by a service spec
pub fn build(spec: &ServiceSpec) -> Result<Box<dyn ComputeProvider>, LaunchError> {
    match spec.provider_endpoint.as_deref() {
        Some(endpoint) => {
            tracing::info!(
                "Using compute gateway {} for provider {}",
                endpoint,
                spec.provider
            );
            Ok(Box::new(http::HttpProvider::new(endpoint)?))
        }
        None => Err(LaunchError::Config(format!(
            "no provider_endpoint configured for provider '{}'",
            spec.provider
        ))),
    }
}
