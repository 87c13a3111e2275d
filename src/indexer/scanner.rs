//! Walks a block range in fixed-size windows and forwards every migration
//! event to the queue.
//!
//! The chain head is read once, when the scan starts. Windows are scanned
//! strictly in order and events within a window in the order the node
//! returned them. A failed log query retries the same window forever after
//! a doubled pause: no range is ever skipped, but a node that keeps failing
//! stalls the scan. Per-event failures are counted and never stop a window.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::indexer::LogSource;
use crate::indexer::transformations::migrations::MigrationTransformer;
use crate::metrics::Metrics;
use crate::models::common::{EventType, ScanConfig};
use crate::models::datasets::migrations::RawMigrationLog;
use crate::queue::sqs::QueueTransport;
use crate::queue::{PublishOutcome, Publisher};
use crate::utils::{basis_points, format_basis_points};

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub start_block: u64,
    pub window_size: u64,
    pub window_delay: Duration,
}

impl ScanSettings {
    pub fn new(start_block: u64, scan: &ScanConfig) -> Self {
        Self {
            start_block,
            window_size: scan.window_size,
            window_delay: Duration::from_millis(scan.window_delay_ms),
        }
    }

    /// Pause after a failed window before retrying it.
    pub fn failure_delay(&self) -> Duration {
        self.window_delay * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: u64,
    pub event_count: u64,
    pub processed_count: u64,
    pub failed_count: u64,
}

impl ScanWindow {
    pub fn new(from_block: u64, window_size: u64, chain_head: u64) -> Self {
        Self {
            from_block,
            to_block: from_block.saturating_add(window_size).min(chain_head),
            event_count: 0,
            processed_count: 0,
            failed_count: 0,
        }
    }

    pub fn next_from_block(&self) -> u64 {
        self.to_block + 1
    }

    fn success_bps(&self) -> u64 {
        basis_points(self.processed_count, self.event_count)
    }

    fn failure_bps(&self) -> u64 {
        // Once every event is accounted for, keep the two rates summing to 100%
        if self.event_count > 0 && self.processed_count + self.failed_count == self.event_count {
            10_000 - self.success_bps()
        } else {
            basis_points(self.failed_count, self.event_count)
        }
    }

    /// e.g. `"66.67%"`; `"0.00%"` for an empty window.
    pub fn success_rate(&self) -> String {
        format_basis_points(self.success_bps())
    }

    pub fn failure_rate(&self) -> String {
        format_basis_points(self.failure_bps())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub chain_head: u64,
    pub windows_scanned: u64,
    pub window_failures: u64,
    pub events_found: u64,
    pub events_processed: u64,
    pub events_failed: u64,
    pub last_scanned_block: Option<u64>,
}

impl ScanSummary {
    fn record(&mut self, window: &ScanWindow) {
        self.windows_scanned += 1;
        self.events_found += window.event_count;
        self.events_processed += window.processed_count;
        self.events_failed += window.failed_count;
        self.last_scanned_block = Some(window.to_block);
    }
}

pub struct Scanner<S, T> {
    source: S,
    publisher: Publisher<T>,
    settings: ScanSettings,
    metrics: Option<Arc<Metrics>>,
}

impl<S, T> Scanner<S, T>
where
    S: LogSource,
    T: QueueTransport,
{
    pub fn new(
        source: S,
        publisher: Publisher<T>,
        settings: ScanSettings,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            source,
            publisher,
            settings,
            metrics,
        }
    }

    /// Scans from the configured start block up to the chain head as read at
    /// call time. Only fails if the chain head cannot be read.
    pub async fn run(&self) -> Result<ScanSummary> {
        let chain_head = self
            .source
            .latest_block_number()
            .await
            .context("Failed to fetch chain head")?;

        info!(
            status = "progress",
            start_block = self.settings.start_block,
            chain_head,
            window_size = self.settings.window_size,
            "Starting scan"
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .chain_tip_block
                .record(chain_head, &[KeyValue::new("chain", metrics.chain_name.clone())]);
        }

        let mut summary = ScanSummary {
            chain_head,
            ..Default::default()
        };
        let mut from_block = self.settings.start_block;

        while from_block < chain_head {
            let mut window = ScanWindow::new(from_block, self.settings.window_size, chain_head);

            match self.scan_window(&mut window).await {
                Ok(()) => {
                    self.report_window(&window);
                    summary.record(&window);
                    from_block = window.next_from_block();

                    if from_block < chain_head {
                        sleep(self.settings.window_delay).await;
                    }
                }
                Err(e) => {
                    summary.window_failures += 1;
                    error!(
                        from_block = window.from_block,
                        to_block = window.to_block,
                        "Failed to scan window, retrying in {:?}: {:#}",
                        self.settings.failure_delay(),
                        e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .window_failures
                            .add(1, &[KeyValue::new("chain", metrics.chain_name.clone())]);
                    }
                    sleep(self.settings.failure_delay()).await;
                }
            }
        }

        info!(
            status = "success",
            windows = summary.windows_scanned,
            window_failures = summary.window_failures,
            events = summary.events_found,
            processed = summary.events_processed,
            failed = summary.events_failed,
            "Scan completed up to block {}",
            chain_head
        );

        Ok(summary)
    }

    /// Queries one window and processes its events. Only the log query itself
    /// can fail the window.
    pub async fn scan_window(&self, window: &mut ScanWindow) -> Result<()> {
        info!(
            status = "progress",
            from_block = window.from_block,
            to_block = window.to_block,
            "Scanning window"
        );

        let logs = self
            .source
            .migration_logs(window.from_block, window.to_block)
            .await
            .with_context(|| {
                format!(
                    "Failed to query logs for blocks {}..={}",
                    window.from_block, window.to_block
                )
            })?;
        window.event_count = logs.len() as u64;

        for log in &logs {
            match self.process_event(log).await {
                Ok(PublishOutcome::Delivered) => window.processed_count += 1,
                Ok(PublishOutcome::Dropped) => {
                    window.failed_count += 1;
                    warn!(
                        tx_hash = ?log.tx_hash,
                        block_number = ?log.block_number,
                        "Migration event was not delivered"
                    );
                }
                Err(e) => {
                    window.failed_count += 1;
                    error!(
                        tx_hash = ?log.tx_hash,
                        tx_index = ?log.tx_index,
                        log_index = ?log.log_index,
                        block_number = ?log.block_number,
                        "Failed to process migration event: {:#}",
                        e
                    );
                }
            }
        }

        Ok(())
    }

    async fn process_event(&self, log: &RawMigrationLog) -> Result<PublishOutcome> {
        let coordinates = log.coordinates()?;
        let block_timestamp = self
            .source
            .block_timestamp(coordinates.block_number)
            .await
            .with_context(|| format!("Failed to fetch block {}", coordinates.block_number))?;
        let message = log.transform_migration(block_timestamp)?;

        Ok(self
            .publisher
            .publish(EventType::Migration, &message, &coordinates)
            .await)
    }

    fn report_window(&self, window: &ScanWindow) {
        info!(
            status = "success",
            from_block = window.from_block,
            to_block = window.to_block,
            events = window.event_count,
            processed = window.processed_count,
            failed = window.failed_count,
            success_rate = %window.success_rate(),
            failure_rate = %window.failure_rate(),
            "Window complete"
        );

        if let Some(metrics) = &self.metrics {
            let labels = [KeyValue::new("chain", metrics.chain_name.clone())];
            metrics.windows_scanned.add(1, &labels);
            metrics.events_found.add(window.event_count, &labels);
            metrics.events_processed.add(window.processed_count, &labels);
            metrics.events_failed.add(window.failed_count, &labels);
            metrics.latest_scanned_block.record(window.to_block, &labels);
        }
    }
}
