//! Error types for cloud-launch-rs

use thiserror::Error;

/// Main error type for cluster launch operations
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Detected before any provider call; nothing was launched
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider rejected or partially failed a launch request
    #[error("Provisioning failed during {phase}: {message}")]
    Provisioning { phase: String, message: String },

    /// The second-phase script failed on already-running nodes
    #[error("Post-launch configuration failed: {0}")]
    Configure(String),

    #[error("Teardown failed: {0}")]
    Destroy(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timeout after {millis}ms waiting for {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl LaunchError {
    /// Create a provisioning error for the given launch phase
    pub fn provisioning(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before the provider was contacted
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
