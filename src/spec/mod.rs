//! Service and cluster specifications
//!
//! A [`ServiceSpec`] says which service to launch, where, and with which
//! credentials. A [`ClusterSpec`] says how many instances of each role set
//! to launch.

pub mod loader;

pub use loader::LaunchConfig;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

use crate::provider::AddressKind;
use crate::LaunchError;

/// Set of role identifiers, e.g. `{nn, jt}` or `{zk}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<&str> = self.iter().collect();
        f.write_str(&roles.join("+"))
    }
}

impl FromStr for RoleSet {
    type Err = LaunchError;

    /// Parse `nn+jt`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = RoleSet::new(s.split('+').map(str::trim).filter(|r| !r.is_empty()));
        if roles.is_empty() {
            return Err(LaunchError::Config(format!("empty role set '{}'", s)));
        }
        Ok(roles)
    }
}

/// Desired instance count for one role set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTemplate {
    pub roles: RoleSet,
    pub count: usize,
}

impl InstanceTemplate {
    pub fn new(roles: RoleSet, count: usize) -> Self {
        Self { roles, count }
    }
}

impl FromStr for InstanceTemplate {
    type Err = LaunchError;

    /// Parse `3 dn+tt`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(count), Some(roles), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(LaunchError::Config(format!(
                "instance template '{}' is not of the form '<count> <role>+<role>'",
                s.trim()
            )));
        };
        let count = count
            .parse()
            .map_err(|_| LaunchError::Config(format!("invalid instance count '{}'", count)))?;
        Ok(Self::new(roles.parse()?, count))
    }
}

/// Role templates for one cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClusterSpec")]
pub struct ClusterSpec {
    pub instance_templates: Vec<InstanceTemplate>,
}

/// Either the compact `1 nn+jt,3 dn+tt` string or a template list
#[derive(Deserialize)]
#[serde(untagged)]
enum RawClusterSpec {
    Compact(String),
    Templates {
        instance_templates: Vec<InstanceTemplate>,
    },
}

impl TryFrom<RawClusterSpec> for ClusterSpec {
    type Error = LaunchError;

    fn try_from(raw: RawClusterSpec) -> Result<Self, Self::Error> {
        match raw {
            RawClusterSpec::Compact(s) => s.parse(),
            RawClusterSpec::Templates { instance_templates } => Ok(Self { instance_templates }),
        }
    }
}

impl FromStr for ClusterSpec {
    type Err = LaunchError;

    /// Parse `1 nn+jt,3 dn+tt`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let instance_templates = s
            .split(',')
            .filter(|t| !t.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { instance_templates })
    }
}

impl ClusterSpec {
    pub fn new(instance_templates: Vec<InstanceTemplate>) -> Self {
        Self { instance_templates }
    }

    /// Template for exactly this role set
    pub fn instance_template(&self, roles: &RoleSet) -> Option<&InstanceTemplate> {
        self.instance_templates.iter().find(|t| &t.roles == roles)
    }

    /// Template for `roles`, or a configuration error if none is declared
    pub fn require(&self, roles: &RoleSet) -> Result<&InstanceTemplate, LaunchError> {
        self.instance_template(roles).ok_or_else(|| {
            LaunchError::Config(format!("no instance template for roles {}", roles))
        })
    }
}

/// What to do with already-running nodes when a later launch phase fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Leave them running and tagged
    #[default]
    LeaveRunning,
    /// Destroy everything tagged with the cluster name, then report the failure
    DestroyCluster,
}

/// Service-level settings for a launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service to launch (`hadoop` or `zookeeper`)
    pub service_name: String,

    /// Cluster name, used as the provider tag
    pub cluster_name: String,

    /// Target cloud provider identifier (e.g. `ec2`)
    pub provider: String,

    /// Compute gateway URL
    #[serde(default)]
    pub provider_endpoint: Option<String>,

    /// Private key file (default `~/.ssh/id_rsa`)
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,

    /// Public key file (default: private key file + `.pub`)
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,

    /// Host serving the installer scripts
    #[serde(default)]
    pub script_base_url: Option<String>,

    /// Deadline applied to every provider call, in milliseconds
    #[serde(default)]
    pub provider_timeout_ms: Option<u64>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Master address handed to worker boot scripts
    #[serde(default)]
    pub master_address: AddressKind,

    /// Where to write the generated client configuration, if anywhere
    #[serde(default)]
    pub client_site_file: Option<PathBuf>,
}

impl ServiceSpec {
    pub fn new(
        service_name: impl Into<String>,
        cluster_name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            cluster_name: cluster_name.into(),
            provider: provider.into(),
            provider_endpoint: None,
            private_key_file: None,
            public_key_file: None,
            script_base_url: None,
            provider_timeout_ms: None,
            failure_policy: FailurePolicy::default(),
            master_address: AddressKind::default(),
            client_site_file: None,
        }
    }

    /// Deadline for each provider call, if configured
    pub fn deadline(&self) -> Option<Duration> {
        self.provider_timeout_ms.map(Duration::from_millis)
    }

    pub fn private_key_path(&self) -> Result<PathBuf, LaunchError> {
        if let Some(path) = &self.private_key_file {
            return Ok(path.clone());
        }
        let home = std::env::var_os("HOME").ok_or_else(|| {
            LaunchError::Config("no private_key_file configured and HOME is not set".into())
        })?;
        Ok(PathBuf::from(home).join(".ssh").join("id_rsa"))
    }

    pub fn public_key_path(&self) -> Result<PathBuf, LaunchError> {
        if let Some(path) = &self.public_key_file {
            return Ok(path.clone());
        }
        let mut path = self.private_key_path()?.into_os_string();
        path.push(".pub");
        Ok(PathBuf::from(path))
    }

    pub async fn read_private_key(&self) -> Result<String, LaunchError> {
        read_key(self.private_key_path()?).await
    }

    pub async fn read_public_key(&self) -> Result<String, LaunchError> {
        read_key(self.public_key_path()?).await
    }
}

async fn read_key(path: PathBuf) -> Result<String, LaunchError> {
    fs::read_to_string(&path)
        .await
        .map_err(|e| LaunchError::Config(format!("cannot read key {}: {}", path.display(), e)))
}
