use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::errors::ConfigError;

// Regions in which SQS accepts signed JSON-protocol requests
static VALID_REGIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
        "us-gov-east-1",
        "us-gov-west-1",
        "af-south-1",
        "ap-east-1",
        "ap-south-1",
        "ap-south-2",
        "ap-southeast-1",
        "ap-southeast-2",
        "ap-southeast-3",
        "ap-southeast-4",
        "ap-northeast-1",
        "ap-northeast-2",
        "ap-northeast-3",
        "ca-central-1",
        "ca-west-1",
        "eu-central-1",
        "eu-central-2",
        "eu-west-1",
        "eu-west-2",
        "eu-west-3",
        "eu-south-1",
        "eu-south-2",
        "eu-north-1",
        "il-central-1",
        "me-south-1",
        "me-central-1",
        "sa-east-1",
    ]
    .into_iter()
    .collect()
});

pub fn is_valid_region(region: &str) -> bool {
    VALID_REGIONS.contains(region)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_window_size")]
    pub window_size: u64,
    #[serde(default = "default_window_delay_ms")]
    pub window_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            window_delay_ms: default_window_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub queue_url: String,
}

// Keep the secret out of debug output
impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("queue_url", &self.queue_url)
            .finish()
    }
}

impl AwsConfig {
    /// Host of the regional SQS endpoint, e.g. `sqs.us-east-1.amazonaws.com`.
    pub fn service_host(&self) -> String {
        format!("sqs.{}.amazonaws.com", self.region)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if !is_valid_region(&self.region) {
            return Err(ConfigError::InvalidRegion {
                region: self.region.clone(),
            });
        }
        if self.access_key_id.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                field: "access_key_id".to_string(),
            });
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                field: "secret_access_key".to_string(),
            });
        }
        if self.queue_url.trim().is_empty() {
            return Err(ConfigError::MissingQueueUrl);
        }
        let url = Url::parse(&self.queue_url).map_err(|e| ConfigError::InvalidQueueUrl {
            url: self.queue_url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" {
            return Err(ConfigError::InvalidQueueUrl {
                url: self.queue_url.clone(),
                reason: format!("expected https scheme, got {}", url.scheme()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_chain_name")]
    pub chain_name: String,
    pub rpc_url: String,
    pub contract_address: String,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default)]
    pub scan: ScanConfig,
    pub aws: AwsConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Static checks that must pass before the queue check and the scan may start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aws.validate()?;
        if self.scan.window_size == 0 {
            return Err(ConfigError::InvalidWindowSize {
                size: self.scan.window_size,
            });
        }
        Ok(())
    }
}

/// Kinds of messages understood by queue consumers. Only migrations are
/// currently scanned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Create,
    Trade,
    Migration,
}

fn default_chain_name() -> String {
    "ethereum".to_string()
}

fn default_metrics_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_window_size() -> u64 {
    1000
}

fn default_window_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}
