//! Named install steps
//!
//! Orchestrators refer to installers by step, never by URL. The relative
//! paths live here; the host comes from [`InstallSteps`].

use super::{normalize_base_url, ScriptFragment};

/// A standard installer script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStep {
    /// Java runtime
    Java,
    /// Hadoop, configured for master or worker roles
    Hadoop,
    /// ZooKeeper ensemble member
    ZooKeeper,
    /// ZooKeeper quorum membership, run on live nodes
    ZooKeeperPostConfigure,
}

impl InstallStep {
    /// Script path relative to the installer host
    pub const fn path(self) -> &'static str {
        match self {
            InstallStep::Java => "sun/java/install",
            InstallStep::Hadoop => "apache/hadoop/install",
            InstallStep::ZooKeeper => "apache/zookeeper/install",
            InstallStep::ZooKeeperPostConfigure => "apache/zookeeper/post-configure",
        }
    }
}

/// Builds step fragments against one installer host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSteps {
    base_url: String,
}

impl Default for InstallSteps {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InstallSteps {
    /// `None` uses the default installer host
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fragment for `step` with no arguments
    pub fn fragment(&self, step: InstallStep) -> ScriptFragment {
        ScriptFragment::new(step.path()).with_base_url(Some(&self.base_url))
    }

    /// Fragment for `step` with arguments
    pub fn fragment_with<I, S>(&self, step: InstallStep, args: I) -> ScriptFragment
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragment(step).with_args(args)
    }
}
