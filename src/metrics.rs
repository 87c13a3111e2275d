use std::sync::Arc;
use tracing::{error, info};

use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, routing::get};
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub chain_name: String,

    // Scan metrics
    pub windows_scanned: Counter<u64>,
    pub window_failures: Counter<u64>,
    pub latest_scanned_block: Gauge<u64>,
    pub chain_tip_block: Gauge<u64>,

    // Event metrics
    pub events_found: Counter<u64>,
    pub events_processed: Counter<u64>,
    pub events_failed: Counter<u64>,

    // Queue metrics
    pub messages_published: Counter<u64>,
    pub messages_rejected: Counter<u64>,
    pub messages_dropped: Counter<u64>,
    pub delivery_attempts: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(chain_name: String) -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("indexer_metrics");

        let windows_scanned = meter
            .u64_counter("indexer_windows_scanned")
            .with_description("Total number of block windows scanned")
            .build();

        let window_failures = meter
            .u64_counter("indexer_window_failures")
            .with_description("Number of window log queries that failed and were retried")
            .build();

        let latest_scanned_block = meter
            .u64_gauge("indexer_latest_scanned_block_number")
            .with_description("Last block of the most recently completed window")
            .build();

        let chain_tip_block = meter
            .u64_gauge("indexer_chain_tip_block_number")
            .with_description("Chain head captured at scan start")
            .build();

        let events_found = meter
            .u64_counter("indexer_events_found")
            .with_description("Migration events returned by log queries")
            .build();

        let events_processed = meter
            .u64_counter("indexer_events_processed")
            .with_description("Migration events transformed and delivered")
            .build();

        let events_failed = meter
            .u64_counter("indexer_events_failed")
            .with_description("Migration events that failed to transform or deliver")
            .build();

        let messages_published = meter
            .u64_counter("indexer_messages_published")
            .with_description("Messages answered by the queue endpoint, rejections included")
            .build();

        let messages_rejected = meter
            .u64_counter("indexer_messages_rejected")
            .with_description("Messages the queue endpoint answered with an error body")
            .build();

        let messages_dropped = meter
            .u64_counter("indexer_messages_dropped")
            .with_description("Messages dropped after delivery attempts were exhausted")
            .build();

        let delivery_attempts = meter
            .u64_counter("indexer_delivery_attempts")
            .with_description("Signed HTTP requests sent to the queue endpoint")
            .build();

        let rpc_requests = meter
            .u64_counter("indexer_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("indexer_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("indexer_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            chain_name,
            windows_scanned,
            window_failures,
            latest_scanned_block,
            chain_tip_block,
            events_found,
            events_processed,
            events_failed,
            messages_published,
            messages_rejected,
            messages_dropped,
            delivery_attempts,
            rpc_requests,
            rpc_errors,
            rpc_latency,
        })
    }

    /// Current values in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("Invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics server to {addr}"))?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> Result<String, StatusCode> {
    encode_registry(&registry).map_err(|e| {
        error!("Failed to encode metrics: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn encode_registry(registry: &prometheus::Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}
