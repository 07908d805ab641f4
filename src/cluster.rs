//! Launched cluster descriptors
//!
//! A [`Cluster`] is the terminal artifact of a successful launch: the
//! launched instances plus client-facing configuration values.

use minijinja::Environment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::provider::NodeMetadata;
use crate::spec::RoleSet;
use crate::LaunchError;

/// Configuration key holding the ZooKeeper client connect string
pub const ZOOKEEPER_HOSTS_KEY: &str = "zookeeper.hosts";

const CLIENT_SITE_TEMPLATE: &str = r#"<?xml version="1.0"?>
<?xml-stylesheet type="text/xsl" href="configuration.xsl"?>
<configuration>
{% for name, value in properties|items %}<property>
<name>{{ name|xml }}</name>
<value>{{ value|xml }}</value>
</property>
{% endfor %}</configuration>
"#;

/// One launched node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub roles: RoleSet,
    pub public_address: String,
    pub private_address: String,
}

impl Instance {
    /// Instance for a node launched in a group with `roles`, using its first
    /// public and private addresses
    pub fn from_node(roles: &RoleSet, node: &NodeMetadata) -> Result<Self, LaunchError> {
        Ok(Self {
            roles: roles.clone(),
            public_address: node.public_address()?.to_string(),
            private_address: node.private_address()?.to_string(),
        })
    }
}

/// Instances for every node of one launch group
pub fn instances_for(
    roles: &RoleSet,
    nodes: &[NodeMetadata],
) -> Result<Vec<Instance>, LaunchError> {
    nodes.iter().map(|node| Instance::from_node(roles, node)).collect()
}

/// A launched cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ClusterParts")]
pub struct Cluster {
    instances: Vec<Instance>,
    configuration: BTreeMap<String, String>,
}

/// Serialized form; deserializing goes through [`Cluster::new`]
#[derive(Deserialize)]
struct ClusterParts {
    instances: Vec<Instance>,
    #[serde(default)]
    configuration: BTreeMap<String, String>,
}

impl From<ClusterParts> for Cluster {
    fn from(parts: ClusterParts) -> Self {
        Cluster::new(parts.instances, parts.configuration)
    }
}

impl Cluster {
    /// Build a cluster; repeated instances are kept once
    pub fn new(instances: Vec<Instance>, configuration: BTreeMap<String, String>) -> Self {
        let mut unique: Vec<Instance> = Vec::with_capacity(instances.len());
        for instance in instances {
            if !unique.contains(&instance) {
                unique.push(instance);
            }
        }
        Self {
            instances: unique,
            configuration,
        }
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Instances carrying `role`
    pub fn instances_in_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Instance> {
        self.instances.iter().filter(move |i| i.roles.contains(role))
    }

    /// Client-facing configuration values
    pub fn configuration(&self) -> &BTreeMap<String, String> {
        &self.configuration
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).map(String::as_str)
    }

    /// Comma-joined `host:port` list of a ZooKeeper ensemble
    pub fn zookeeper_hosts(&self) -> Option<&str> {
        self.get(ZOOKEEPER_HOSTS_KEY)
    }

    /// Render the configuration as a Hadoop-style `*-site.xml` document
    pub fn client_site_xml(&self) -> Result<String, LaunchError> {
        render_client_site(&self.configuration)
    }

    /// Write [`Cluster::client_site_xml`] to `path`, creating parent directories
    pub async fn write_client_site(&self, path: impl AsRef<Path>) -> Result<(), LaunchError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.client_site_xml()?).await?;
        info!("Wrote client configuration to {}", path.display());
        Ok(())
    }
}

fn xml_escape(value: String) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render `<configuration>` with one `<property>` per entry
pub fn render_client_site(properties: &BTreeMap<String, String>) -> Result<String, LaunchError> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_filter("xml", xml_escape);
    env.add_template("client-site", CLIENT_SITE_TEMPLATE)?;

    let rendered = env
        .get_template("client-site")?
        .render(minijinja::context! { properties => properties })?;
    Ok(rendered)
}
