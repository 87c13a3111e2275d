mod common;

use std::time::Duration;

use serde_json::Value;

use migration_indexer::indexer::scanner::{ScanSettings, ScanWindow, Scanner};
use migration_indexer::models::datasets::migrations::MigrationArgs;
use migration_indexer::queue::Publisher;

use common::{QUEUE_URL, StubLogSource, StubTransport, client, migration_log};

fn settings(start_block: u64, window_size: u64) -> ScanSettings {
    ScanSettings {
        start_block,
        window_size,
        window_delay: Duration::ZERO,
    }
}

fn scanner<'a>(
    source: &'a StubLogSource,
    transport: StubTransport,
    start_block: u64,
    window_size: u64,
) -> Scanner<&'a StubLogSource, StubTransport> {
    let publisher = Publisher::new(client(transport, 3), QUEUE_URL, None);
    Scanner::new(source, publisher, settings(start_block, window_size), None)
}

#[tokio::test]
async fn single_window_is_clamped_to_chain_head() {
    let source = StubLogSource::new(120, vec![]);
    let summary = scanner(&source, StubTransport::succeeding(), 100, 50)
        .run()
        .await
        .unwrap();

    assert_eq!(source.queried(), vec![(100, 120)]);
    assert_eq!(summary.windows_scanned, 1);
    assert_eq!(summary.last_scanned_block, Some(120));
}

#[tokio::test]
async fn windows_advance_past_previous_to_block() {
    let source = StubLogSource::new(500, vec![]);
    scanner(&source, StubTransport::succeeding(), 100, 50)
        .run()
        .await
        .unwrap();

    let queried = source.queried();
    assert_eq!(queried[0], (100, 150));
    assert_eq!(queried[1], (151, 201));
    assert_eq!(queried.last(), Some(&(457, 500)));

    // Strictly increasing, no gaps
    for pair in queried.windows(2) {
        assert_eq!(pair[1].0, pair[0].1 + 1);
    }
}

#[tokio::test]
async fn start_at_chain_head_scans_nothing() {
    let source = StubLogSource::new(100, vec![]);
    let summary = scanner(&source, StubTransport::succeeding(), 100, 50)
        .run()
        .await
        .unwrap();

    assert!(source.queried().is_empty());
    assert_eq!(summary.windows_scanned, 0);
    assert_eq!(summary.last_scanned_block, None);
}

#[tokio::test]
async fn failed_window_is_retried_from_same_block() {
    let source = StubLogSource::new(150, vec![migration_log(120, "0x1", 0)]).failing(1);
    let transport = StubTransport::succeeding();
    let summary = scanner(&source, transport.clone(), 100, 50)
        .run()
        .await
        .unwrap();

    assert_eq!(source.queried(), vec![(100, 150), (100, 150)]);
    assert_eq!(summary.window_failures, 1);
    assert_eq!(summary.windows_scanned, 1);
    assert_eq!(summary.events_processed, 1);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn repeated_window_failures_never_skip_the_range() {
    let source = StubLogSource::new(150, vec![]).failing(5);
    let summary = scanner(&source, StubTransport::succeeding(), 100, 50)
        .run()
        .await
        .unwrap();

    let queried = source.queried();
    assert_eq!(queried.len(), 6);
    assert!(queried.iter().all(|range| *range == (100, 150)));
    assert_eq!(summary.window_failures, 5);
}

#[tokio::test]
async fn failing_event_does_not_block_the_rest_of_the_window() {
    let mut broken = migration_log(110, "0x2", 1);
    broken.args = MigrationArgs::default();

    let source = StubLogSource::new(
        150,
        vec![
            migration_log(105, "0x1", 0),
            broken,
            migration_log(130, "0x3", 2),
        ],
    );
    let transport = StubTransport::succeeding();
    let scanner = scanner(&source, transport.clone(), 100, 50);

    let mut window = ScanWindow::new(100, 50, 150);
    scanner.scan_window(&mut window).await.unwrap();

    assert_eq!(window.event_count, 3);
    assert_eq!(window.processed_count, 2);
    assert_eq!(window.failed_count, 1);
    assert_eq!(window.processed_count + window.failed_count, window.event_count);
    assert_eq!(window.success_rate(), "66.67%");
    assert_eq!(window.failure_rate(), "33.33%");

    // Delivered in query order
    let group_ids: Vec<Value> = transport
        .bodies()
        .into_iter()
        .map(|body| body["MessageGroupId"].clone())
        .collect();
    assert_eq!(group_ids, vec!["0x1/0/0", "0x3/0/2"]);
}

#[tokio::test]
async fn undeliverable_events_are_counted_as_failed() {
    let source = StubLogSource::new(
        150,
        vec![migration_log(105, "0x1", 0), migration_log(106, "0x2", 0)],
    );
    let transport = StubTransport::failing();
    let summary = scanner(&source, transport.clone(), 100, 50)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.events_found, 2);
    assert_eq!(summary.events_processed, 0);
    assert_eq!(summary.events_failed, 2);
    // Three attempts per event
    assert_eq!(transport.requests().len(), 6);
}

#[tokio::test]
async fn counts_add_up_across_windows() {
    let mut broken = migration_log(260, "0x5", 0);
    broken.tx_hash = None;

    let source = StubLogSource::new(
        300,
        vec![
            migration_log(101, "0x1", 0),
            migration_log(149, "0x2", 3),
            migration_log(210, "0x3", 0),
            migration_log(211, "0x4", 1),
            broken,
        ],
    );
    let summary = scanner(&source, StubTransport::succeeding(), 100, 50)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.events_found, 5);
    assert_eq!(summary.events_processed, 4);
    assert_eq!(summary.events_failed, 1);
    assert_eq!(summary.last_scanned_block, Some(300));
}
