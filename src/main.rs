use std::{sync::Arc, time::Duration};

use alloy_primitives::Address;
use alloy_provider::ProviderBuilder;
use anyhow::{Context, Result, anyhow};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use migration_indexer::indexer::ChainLogSource;
use migration_indexer::indexer::scanner::{ScanSettings, Scanner};
use migration_indexer::metrics::Metrics;
use migration_indexer::queue::Publisher;
use migration_indexer::queue::sqs::{HttpTransport, SqsClient};
use migration_indexer::utils::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config = match load_config("config.yml") {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(e);
        }
    };

    // Nothing is scanned unless the queue configuration is usable
    if let Err(e) = config.validate() {
        error!(kind = "ConfigError", "Invalid configuration: {}", e);
        return Err(anyhow!(e));
    }
    info!(region = %config.aws.region, queue_url = %config.aws.queue_url, "Configuration validated");

    let contract: Address = config
        .contract_address
        .parse()
        .with_context(|| format!("Invalid contract address {}", config.contract_address))?;

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new(config.chain_name.clone())?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    // Queue client, checked against the live endpoint
    let transport = HttpTransport::new(Duration::from_secs(config.delivery.timeout_secs))?;
    let client = SqsClient::new(transport, &config.aws, &config.delivery).with_metrics(metrics.clone());
    if let Err(e) = client.check_queue(&config.aws.queue_url).await {
        error!(kind = "ConfigError", "Queue check failed: {}", e);
        return Err(anyhow!(e));
    }
    info!(status = "success", endpoint = %client.endpoint(), "Queue is reachable");
    let publisher = Publisher::new(client, config.aws.queue_url.clone(), metrics.clone());

    // Create RPC provider
    let rpc_url: Url = config.rpc_url.parse()?;
    info!("RPC URL: {:?}", config.rpc_url);
    let provider = ProviderBuilder::new().connect_http(rpc_url);
    let source = ChainLogSource::new(provider, contract, metrics.clone());

    let settings = ScanSettings::new(config.start_block, &config.scan);
    let scanner = Scanner::new(source, publisher, settings, metrics);

    println!();
    info!("========================= STARTING INDEXER =========================");

    match scanner.run().await {
        Ok(summary) => {
            info!(
                status = "success",
                last_block = ?summary.last_scanned_block,
                processed = summary.events_processed,
                failed = summary.events_failed,
                "Indexer finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(kind = "ScanError", "Scan aborted: {:#}", e);
            Err(e)
        }
    }
}
