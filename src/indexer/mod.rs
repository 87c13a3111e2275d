pub mod scanner;
pub mod transformations;

use std::{future::Future, sync::Arc};

use alloy_eips::BlockNumberOrTag;
use alloy_network::Ethereum;
use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_rpc_types_eth::Filter;
use alloy_sol_types::SolEvent;
use anyhow::{Result, anyhow};
use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::models::datasets::migrations::{RawMigrationLog, TokenMigrated};
use crate::utils::retry::{RetryConfig, retry};

/// Read access to the chain, as needed by the scanner.
pub trait LogSource: Send + Sync {
    fn latest_block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// All `TokenMigrated` logs in `[from_block, to_block]`, in chain order.
    fn migration_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<RawMigrationLog>>> + Send;

    /// Block timestamp in seconds since the epoch.
    fn block_timestamp(&self, block_number: u64) -> impl Future<Output = Result<u64>> + Send;
}

fn record_rpc_request(metrics: Option<&Metrics>, method: &'static str) {
    if let Some(metrics) = metrics {
        metrics.rpc_requests.add(
            1,
            &[
                KeyValue::new("chain", metrics.chain_name.clone()),
                KeyValue::new("method", method),
            ],
        );
    }
}

fn record_rpc_result<T, E>(
    metrics: Option<&Metrics>,
    method: &'static str,
    start: std::time::Instant,
    result: &std::result::Result<T, E>,
) {
    if let Some(metrics) = metrics {
        let labels = [
            KeyValue::new("chain", metrics.chain_name.clone()),
            KeyValue::new("method", method),
        ];
        metrics
            .rpc_latency
            .record(start.elapsed().as_secs_f64(), &labels);
        if result.is_err() {
            metrics.rpc_errors.add(1, &labels);
        }
    }
}

pub async fn get_latest_block_number<P>(provider: &P, metrics: Option<&Metrics>) -> Result<u64>
where
    P: Provider<Ethereum>,
{
    let retry_config = RetryConfig::default();
    retry(|| async {
        let start = std::time::Instant::now();
        record_rpc_request(metrics, "get_latest_block_number");

        let result = provider.get_block_number().await;
        record_rpc_result(metrics, "get_latest_block_number", start, &result);

        result.map_err(|e| {
            warn!("Failed to get latest block number. Error details:\n{:#?}", e);
            anyhow!("RPC error: {}", e)
        })
    },
    &retry_config,
    "get_latest_block_number"
    )
    .await
}

/// Single attempt; the scanner retries failed windows itself.
pub async fn get_migration_logs<P>(
    provider: &P,
    contract: Address,
    from_block: u64,
    to_block: u64,
    metrics: Option<&Metrics>,
) -> Result<Vec<RawMigrationLog>>
where
    P: Provider<Ethereum>,
{
    let filter = Filter::new()
        .address(contract)
        .event_signature(TokenMigrated::SIGNATURE_HASH)
        .from_block(from_block)
        .to_block(to_block);

    let start = std::time::Instant::now();
    record_rpc_request(metrics, "get_logs");

    let result = provider.get_logs(&filter).await;
    record_rpc_result(metrics, "get_logs", start, &result);

    let logs = result.map_err(|e| {
        anyhow!(
            "RPC error fetching logs for blocks {}..={}: {}",
            from_block,
            to_block,
            e
        )
    })?;
    debug!(from_block, to_block, count = logs.len(), "Fetched migration logs");

    Ok(logs.iter().map(RawMigrationLog::from).collect())
}

pub async fn get_block_timestamp<P>(
    provider: &P,
    block_number: u64,
    metrics: Option<&Metrics>,
) -> Result<u64>
where
    P: Provider<Ethereum>,
{
    let retry_config = RetryConfig::fixed(3, 500);
    retry(|| async {
        let start = std::time::Instant::now();
        record_rpc_request(metrics, "get_block_by_number");

        let result = provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await;
        record_rpc_result(metrics, "get_block_by_number", start, &result);

        let block = result.map_err(|e| {
            warn!("Failed to get block by number {}. Error details:\n{:#?}", block_number, e);
            anyhow!("RPC error: {}", e)
        })?;

        block
            .map(|block| block.header.timestamp)
            .ok_or_else(|| anyhow!("Provider returned no block {}", block_number))
    },
    &retry_config,
    "get_block_by_number"
    )
    .await
}

/// [`LogSource`] backed by an alloy provider.
pub struct ChainLogSource<P> {
    provider: P,
    contract: Address,
    metrics: Option<Arc<Metrics>>,
}

impl<P> ChainLogSource<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(provider: P, contract: Address, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            provider,
            contract,
            metrics,
        }
    }
}

impl<P> LogSource for ChainLogSource<P>
where
    P: Provider<Ethereum>,
{
    async fn latest_block_number(&self) -> Result<u64> {
        get_latest_block_number(&self.provider, self.metrics.as_deref()).await
    }

    async fn migration_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RawMigrationLog>> {
        get_migration_logs(
            &self.provider,
            self.contract,
            from_block,
            to_block,
            self.metrics.as_deref(),
        )
        .await
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        get_block_timestamp(&self.provider, block_number, self.metrics.as_deref()).await
    }
}
