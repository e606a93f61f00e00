use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

use crate::config::HarvestConfig;
use crate::error::{HarvestError, PublishError, Result};
use crate::utils::constants::{HEADER_FIWARE_SERVICE, HEADER_FIWARE_SERVICE_PATH, MIME_JSON};

/// Tenant and service path every request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceScope {
    pub service: String,
    pub service_path: String,
}

impl ServiceScope {
    pub fn new(service: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            service_path: service_path.into(),
        }
    }
}

impl From<&HarvestConfig> for ServiceScope {
    fn from(config: &HarvestConfig) -> Self {
        Self::new(&config.service_name, &config.service_path)
    }
}

/// A context broker accepting bulk update requests.
#[async_trait]
pub trait ContextBroker: Send + Sync {
    /// Send one already-encoded bulk update. All or nothing from the caller's view.
    async fn batch_update(
        &self,
        scope: &ServiceScope,
        payload: String,
    ) -> std::result::Result<(), PublishError>;
}

/// Orion Context Broker over its NGSI v2 HTTP API.
pub struct OrionClient {
    client: Client,
    update_url: String,
}

impl OrionClient {
    pub fn new(update_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            update_url: update_url.into(),
        })
    }

    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        Self::new(config.batch_update_url(), config.request_timeout())
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }
}

#[async_trait]
impl ContextBroker for OrionClient {
    async fn batch_update(
        &self,
        scope: &ServiceScope,
        payload: String,
    ) -> std::result::Result<(), PublishError> {
        let response = self
            .client
            .post(&self.update_url)
            .header(CONTENT_TYPE, MIME_JSON)
            .header(CONTENT_LENGTH, payload.len())
            .header(HEADER_FIWARE_SERVICE, scope.service.as_str())
            .header(HEADER_FIWARE_SERVICE_PATH, scope.service_path.as_str())
            .body(payload)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
