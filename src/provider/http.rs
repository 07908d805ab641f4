//! Compute gateway provider
//!
//! Speaks JSON to a compute gateway that fronts the actual cloud API:
//!
//! - `POST {endpoint}/nodes` with `{tag, count, template}` returns the
//!   launched nodes
//! - `POST {endpoint}/nodes/scripts` with `{tag, script}` runs a script on
//!   tagged nodes
//! - `DELETE {endpoint}/nodes?tag=...` destroys tagged nodes
//!
//! Scripts travel base64-encoded.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{ComputeProvider, NodeMetadata, NodeTemplate, OsFamily};
use crate::script::BootScript;
use crate::LaunchError;

#[derive(Serialize)]
struct LaunchRequest<'a> {
    tag: &'a str,
    count: usize,
    template: TemplateBody<'a>,
}

#[derive(Serialize)]
struct TemplateBody<'a> {
    os_family: OsFamily,
    boot_script: String,
    private_key: &'a str,
    public_key: &'a str,
    inbound_ports: &'a [u16],
}

#[derive(Serialize)]
struct ScriptRequest<'a> {
    tag: &'a str,
    script: String,
}

/// Provider backed by a compute gateway's REST API
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(endpoint: &str) -> Result<Self, LaunchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Gateway base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a non-2xx response into an error message carrying the body
    async fn failure_message(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body.trim())
        }
    }
}

#[async_trait]
impl ComputeProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn launch(
        &self,
        tag: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<NodeMetadata>, LaunchError> {
        let url = format!("{}/nodes", self.base_url);
        debug!("POST {} (tag {}, count {})", url, tag, count);

        let request = LaunchRequest {
            tag,
            count,
            template: TemplateBody {
                os_family: template.os_family,
                boot_script: BASE64.encode(template.boot_script.as_bytes()),
                private_key: &template.private_key,
                public_key: &template.public_key,
                inbound_ports: &template.inbound_ports,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LaunchError::provisioning(tag, e.to_string()))?;

        if !response.status().is_success() {
            return Err(LaunchError::provisioning(
                tag,
                Self::failure_message(response).await,
            ));
        }

        let body = response.text().await?;
        let nodes: Vec<NodeMetadata> = serde_json::from_str(&body)
            .map_err(|e| LaunchError::Provider(format!("malformed launch answer: {}", e)))?;
        info!("Gateway launched {} nodes tagged {}", nodes.len(), tag);
        Ok(nodes)
    }

    async fn run_script_on_tagged(
        &self,
        tag: &str,
        script: &BootScript,
    ) -> Result<(), LaunchError> {
        let url = format!("{}/nodes/scripts", self.base_url);
        debug!("POST {} (tag {})", url, tag);

        let request = ScriptRequest {
            tag,
            script: BASE64.encode(script.as_bytes()),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LaunchError::Configure(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LaunchError::Configure(Self::failure_message(response).await))
        }
    }

    async fn destroy_tagged(&self, tag: &str) -> Result<(), LaunchError> {
        let url = format!("{}/nodes", self.base_url);
        debug!("DELETE {} (tag {})", url, tag);

        let response = self
            .client
            .delete(&url)
            .query(&[("tag", tag)])
            .send()
            .await
            .map_err(|e| LaunchError::Destroy(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LaunchError::Destroy(Self::failure_message(response).await))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = HttpProvider::new("http://gateway.local:8080/").unwrap();
        assert_eq!(provider.base_url(), "http://gateway.local:8080");
        assert_eq!(provider.name(), "http");
    }

    #[test]
    fn test_launch_request_shape() {
        let request = LaunchRequest {
            tag: "c1",
            count: 2,
            template: TemplateBody {
                os_family: OsFamily::Ubuntu,
                boot_script: BASE64.encode("echo hi"),
                private_key: "priv",
                public_key: "pub",
                inbound_ports: &[22, 2181],
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tag"], "c1");
        assert_eq!(json["count"], 2);
        assert_eq!(json["template"]["os_family"], "ubuntu");
        assert_eq!(json["template"]["boot_script"], "ZWNobyBoaQ==");
        assert_eq!(json["template"]["inbound_ports"][1], 2181);
    }
}
