//! Run configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `HARVEST_*` environment variables. The CLI applies its own overrides last.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use validator::Validate;

use crate::error::{HarvestError, Result};
use crate::utils::constants::*;

/// What happens to a station's most recent entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LatestPolicy {
    /// Rename the final entity to the `-latest` id; its timestamped id is not published.
    #[default]
    Replace,
    /// Publish the final reading under both its timestamped id and the `-latest` id.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HarvestConfig {
    #[validate(url)]
    pub broker_url: String,

    #[validate(length(min = 1))]
    pub service_name: String,

    #[validate(length(min = 1))]
    pub service_path: String,

    #[validate(url)]
    pub station_source_url: String,

    #[validate(url)]
    pub observation_source_url: String,

    #[validate(length(min = 1))]
    pub id_prefix: String,

    pub data_source: String,

    pub data_provider: String,

    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub run_deadline_secs: u64,

    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_publishes: usize,

    #[validate(range(max = 10))]
    pub publish_retries: u32,

    #[validate(range(max = 60000))]
    pub retry_backoff_ms: u64,

    pub latest_policy: LatestPolicy,

    pub dry_run: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_path: DEFAULT_SERVICE_PATH.to_string(),
            station_source_url: DEFAULT_STATION_SOURCE_URL.to_string(),
            observation_source_url: DEFAULT_OBSERVATION_SOURCE_URL.to_string(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            data_provider: DEFAULT_DATA_PROVIDER.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            run_deadline_secs: DEFAULT_RUN_DEADLINE_SECS,
            max_concurrent_publishes: DEFAULT_MAX_CONCURRENT_PUBLISHES,
            publish_retries: DEFAULT_PUBLISH_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            latest_policy: LatestPolicy::Replace,
            dry_run: false,
        }
    }
}

impl HarvestConfig {
    /// Load defaults, an optional config file and `HARVEST_*` environment overrides.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: HarvestConfig = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus the rules that span more than one field.
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if !self.service_path.starts_with('/') {
            return Err(HarvestError::Config(format!(
                "service_path must start with '/', got '{}'",
                self.service_path
            )));
        }

        if self.run_deadline_secs < self.request_timeout_secs {
            return Err(HarvestError::Config(format!(
                "run_deadline_secs ({}) is shorter than request_timeout_secs ({})",
                self.run_deadline_secs, self.request_timeout_secs
            )));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Endpoint receiving bulk update requests.
    pub fn batch_update_url(&self) -> String {
        format!("{}{}", self.broker_url.trim_end_matches('/'), BATCH_UPDATE_PATH)
    }
}
