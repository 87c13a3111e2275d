pub mod signer;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, Method, header};
use opentelemetry::KeyValue;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::models::common::{AwsConfig, DeliveryConfig};
use crate::models::errors::{ConfigError, DeliveryError};
use crate::queue::sqs::signer::{Credentials, SigningParams, amz_date, authorization_header};
use crate::utils::retry::{RetryConfig, retry};
use crate::utils::strip_html;

pub const SERVICE: &str = "sqs";
pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
pub const TARGET_PREFIX: &str = "AmazonSQS";

const X_AMZ_DATE: &str = "x-amz-date";
const X_AMZ_TARGET: &str = "x-amz-target";

/// A fully signed request. Rebuilt for every attempt since the signature is
/// bound to the wall-clock time it was made at.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Sends a signed request and returns the decoded response body.
///
/// An error means a transport failure or an undecodable body. HTTP error
/// statuses that carry a JSON body are returned as responses.
pub trait QueueTransport: Send + Sync {
    fn send(&self, request: SignedRequest) -> impl Future<Output = Result<Value>> + Send;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl QueueTransport for HttpTransport {
    async fn send(&self, request: SignedRequest) -> Result<Value> {
        let response = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .with_context(|| format!("HTTP request to {} failed", request.url))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "Undecodable response (HTTP {}): {}",
                status,
                strip_html(&String::from_utf8_lossy(&bytes))
            )
        })
    }
}

pub struct SqsClient<T> {
    transport: T,
    credentials: Credentials,
    region: String,
    host: String,
    retry_config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
    clock: fn() -> DateTime<Utc>,
}

impl<T: QueueTransport> SqsClient<T> {
    pub fn new(transport: T, aws: &AwsConfig, delivery: &DeliveryConfig) -> Self {
        Self {
            transport,
            credentials: Credentials {
                access_key_id: aws.access_key_id.clone(),
                secret_access_key: aws.secret_access_key.clone(),
            },
            region: aws.region.clone(),
            host: aws.service_host(),
            retry_config: RetryConfig::fixed(delivery.max_attempts, delivery.retry_delay_ms),
            metrics: None,
            clock: Utc::now,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the wall clock each attempt is signed with.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("https://{}/", self.host)
    }

    /// Signs `body` exactly as it will be transmitted.
    pub fn sign_request(&self, target: &str, body: &[u8], timestamp: DateTime<Utc>) -> Result<SignedRequest> {
        let params = SigningParams {
            method: Method::POST.as_str(),
            host: &self.host,
            content_type: CONTENT_TYPE,
            target,
            region: &self.region,
            service: SERVICE,
            payload: body,
            timestamp,
        };
        let authorization = authorization_header(&self.credentials, &params)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        headers.insert(X_AMZ_DATE, HeaderValue::from_str(&amz_date(&timestamp))?);
        headers.insert(X_AMZ_TARGET, HeaderValue::from_str(target)?);
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&authorization).context("Authorization header is not valid ASCII")?,
        );

        Ok(SignedRequest {
            method: Method::POST,
            url: self.endpoint(),
            headers,
            body: body.to_vec(),
        })
    }

    /// POSTs `payload` as the SQS `action` (e.g. `SendMessage`), retrying
    /// transport failures with a fresh signature each time.
    pub async fn deliver<P: Serialize>(&self, action: &str, payload: &P) -> Result<Value, DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        let target = format!("{TARGET_PREFIX}.{action}");

        let body = body.as_slice();
        let target_ref = target.as_str();
        let result = retry(
            || async move {
                if let Some(metrics) = self.metrics.as_deref() {
                    metrics.delivery_attempts.add(
                        1,
                        &[
                            KeyValue::new("chain", metrics.chain_name.clone()),
                            KeyValue::new("target", target_ref.to_string()),
                        ],
                    );
                }

                let request = self.sign_request(target_ref, body, (self.clock)())?;
                debug!(sqs_target = target_ref, url = %request.url, "Sending signed request");
                self.transport.send(request).await
            },
            &self.retry_config,
            target_ref,
        )
        .await;

        result.map_err(|e| DeliveryError::Exhausted {
            target,
            attempts: self.retry_config.max_attempts,
            reason: format!("{e:#}"),
        })
    }

    /// Live check that the queue exists and the credentials are accepted.
    pub async fn check_queue(&self, queue_url: &str) -> Result<(), ConfigError> {
        let payload = json!({
            "QueueUrl": queue_url,
            "AttributeNames": ["QueueArn"],
        });

        let unreachable = |reason: String| ConfigError::QueueUnreachable {
            url: queue_url.to_string(),
            reason,
        };

        let response = self
            .deliver("GetQueueAttributes", &payload)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if let Some(error_type) = service_error(&response) {
            let message = response
                .get("message")
                .or_else(|| response.get("Message"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            warn!(queue_url, error_type, "Queue check rejected: {}", message);
            return Err(unreachable(format!("{error_type}: {message}")));
        }

        Ok(())
    }
}

/// The `__type` of an SQS JSON-protocol error response, if any.
pub fn service_error(response: &Value) -> Option<&str> {
    response.get("__type").and_then(Value::as_str)
}
