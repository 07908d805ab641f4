//! Launch configuration loader
//!
//! Reads a YAML document holding the service spec, the cluster spec and any
//! hook scripts:
//!
//! ```yaml
//! service:
//!   service_name: hadoop
//!   cluster_name: analytics
//!   provider: ec2
//!   provider_endpoint: http://gateway.internal:8080
//! cluster: "1 nn+jt,3 dn+tt"
//! hooks:
//!   BEFORE_JAVA:
//!     - path: extra/apt-update
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use super::{ClusterSpec, ServiceSpec};
use crate::script::{ScriptFragment, ScriptRegistry};
use crate::LaunchError;

/// Everything needed to launch one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub service: ServiceSpec,

    #[serde(default)]
    pub cluster: ClusterSpec,

    /// Hook label -> fragments, in execution order
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<ScriptFragment>>,
}

impl LaunchConfig {
    /// Parse and validate a launch configuration
    pub fn from_yaml(yaml: &str) -> Result<Self, LaunchError> {
        let config: LaunchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a launch configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LaunchError> {
        let path = path.as_ref();
        debug!("Loading launch configuration from {}", path.display());

        let content = fs::read_to_string(path).await.map_err(|e| {
            LaunchError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;

        info!(
            "Loaded {} cluster '{}' with {} instance templates",
            config.service.service_name,
            config.service.cluster_name,
            config.cluster.instance_templates.len()
        );
        Ok(config)
    }

    /// Check fields that serde cannot
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.service.cluster_name.trim().is_empty() {
            return Err(LaunchError::Config("cluster_name must not be empty".into()));
        }
        for template in &self.cluster.instance_templates {
            if template.roles.is_empty() {
                return Err(LaunchError::Config(
                    "instance template with no roles".into(),
                ));
            }
        }
        for fragment in self.hooks.values().flatten() {
            fragment.validate()?;
        }
        Ok(())
    }

    /// Hook registry populated from the `hooks` section
    pub fn registry(&self) -> ScriptRegistry {
        self.hooks
            .iter()
            .map(|(label, fragments)| (label, fragments.iter().cloned()))
            .collect()
    }
}
