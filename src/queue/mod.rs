pub mod sqs;

use std::sync::Arc;

use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::metrics::Metrics;
use crate::models::common::EventType;
use crate::models::datasets::migrations::LogCoordinates;
use crate::queue::sqs::{QueueTransport, SqsClient, service_error};

const SEND_MESSAGE: &str = "SendMessage";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody<'a, D> {
    #[serde(rename = "type")]
    event_type: EventType,
    msg: &'a D,
    tx_hash: &'a str,
    tx_index: u64,
    log_index: u64,
    block_number: u64,
}

/// Body of an SQS `SendMessage` request.
///
/// Group and deduplication ids are both `{txHash}/{txIndex}/{logIndex}`, so
/// re-scanning a range produces messages the queue already knows about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueEnvelope {
    pub queue_url: String,
    pub message_body: String,
    pub message_group_id: String,
    pub message_deduplication_id: String,
}

impl QueueEnvelope {
    pub fn build<D: Serialize>(
        queue_url: &str,
        event_type: EventType,
        data: &D,
        coordinates: &LogCoordinates,
    ) -> Result<Self, serde_json::Error> {
        let body = MessageBody {
            event_type,
            msg: data,
            tx_hash: &coordinates.tx_hash,
            tx_index: coordinates.tx_index,
            log_index: coordinates.log_index,
            block_number: coordinates.block_number,
        };
        let message_id = coordinates.message_id();

        Ok(Self {
            queue_url: queue_url.to_string(),
            message_body: serde_json::to_string(&body)?,
            message_group_id: message_id.clone(),
            message_deduplication_id: message_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Logged and counted, never retried.
    Dropped,
}

pub struct Publisher<T> {
    client: SqsClient<T>,
    queue_url: String,
    metrics: Option<Arc<Metrics>>,
}

impl<T: QueueTransport> Publisher<T> {
    pub fn new(client: SqsClient<T>, queue_url: impl Into<String>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            metrics,
        }
    }

    /// Sends one event to the queue. Failures are logged and reported as
    /// [`PublishOutcome::Dropped`]; this never returns an error.
    pub async fn publish<D: Serialize>(
        &self,
        event_type: EventType,
        data: &D,
        coordinates: &LogCoordinates,
    ) -> PublishOutcome {
        let outcome = match self.try_publish(event_type, data, coordinates).await {
            Ok(()) => {
                info!(
                    status = "success",
                    event_type = ?event_type,
                    message_id = %coordinates.message_id(),
                    block_number = coordinates.block_number,
                    "Published message to queue"
                );
                PublishOutcome::Delivered
            }
            Err(e) => {
                error!(
                    event_type = ?event_type,
                    tx_hash = %coordinates.tx_hash,
                    tx_index = coordinates.tx_index,
                    log_index = coordinates.log_index,
                    block_number = coordinates.block_number,
                    "Failed to publish message: {:#}",
                    e
                );
                PublishOutcome::Dropped
            }
        };

        if let Some(metrics) = &self.metrics {
            let counter = match outcome {
                PublishOutcome::Delivered => &metrics.messages_published,
                PublishOutcome::Dropped => &metrics.messages_dropped,
            };
            counter.add(1, &[KeyValue::new("chain", metrics.chain_name.clone())]);
        }

        outcome
    }

    async fn try_publish<D: Serialize>(
        &self,
        event_type: EventType,
        data: &D,
        coordinates: &LogCoordinates,
    ) -> anyhow::Result<()> {
        let envelope = QueueEnvelope::build(&self.queue_url, event_type, data, coordinates)?;
        let response = self.client.deliver(SEND_MESSAGE, &envelope).await?;

        // The service answered; an error body still means the message was not accepted
        if let Some(error_type) = service_error(&response) {
            warn!(
                error_type,
                message_id = %coordinates.message_id(),
                "Queue rejected message: {}",
                response
            );
            if let Some(metrics) = &self.metrics {
                metrics.messages_rejected.add(
                    1,
                    &[
                        KeyValue::new("chain", metrics.chain_name.clone()),
                        KeyValue::new("error_type", error_type.to_string()),
                    ],
                );
            }
        }

        Ok(())
    }
}
