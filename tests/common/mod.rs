#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use alloy_primitives::U256;
use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use migration_indexer::indexer::LogSource;
use migration_indexer::models::common::{AwsConfig, DeliveryConfig};
use migration_indexer::models::datasets::migrations::{MigrationArgs, RawMigrationLog};
use migration_indexer::queue::sqs::{QueueTransport, SignedRequest, SqsClient};

pub const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/migrations.fifo";
pub const BLOCK_TIMESTAMP: u64 = 1_700_000_000;
pub const ETHER: u128 = 1_000_000_000_000_000_000;

pub fn aws_config() -> AwsConfig {
    AwsConfig {
        region: "us-east-1".to_string(),
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        queue_url: QUEUE_URL.to_string(),
    }
}

pub fn delivery_config(max_attempts: u32) -> DeliveryConfig {
    DeliveryConfig {
        max_attempts,
        retry_delay_ms: 0,
        timeout_secs: 1,
    }
}

pub fn migration_log(block_number: u64, tx_hash: &str, log_index: u64) -> RawMigrationLog {
    RawMigrationLog {
        block_number: Some(block_number),
        tx_hash: Some(tx_hash.to_string()),
        tx_index: Some(0),
        log_index: Some(log_index),
        args: MigrationArgs {
            token: Some("0xabc".to_string()),
            pair_address: Some("0xdef".to_string()),
            amount_token: Some(U256::from(2 * ETHER)),
            amount_eth: Some(U256::from(ETHER)),
        },
    }
}

/// Serves canned logs and records every window it was asked for.
#[derive(Default)]
pub struct StubLogSource {
    pub chain_head: u64,
    pub logs: Vec<RawMigrationLog>,
    pub failing_queries: AtomicU32,
    pub queried: Mutex<Vec<(u64, u64)>>,
}

impl StubLogSource {
    pub fn new(chain_head: u64, logs: Vec<RawMigrationLog>) -> Self {
        Self {
            chain_head,
            logs,
            ..Default::default()
        }
    }

    /// The next `n` log queries fail.
    pub fn failing(self, n: u32) -> Self {
        self.failing_queries.store(n, Ordering::SeqCst);
        self
    }

    pub fn queried(&self) -> Vec<(u64, u64)> {
        self.queried.lock().unwrap().clone()
    }
}

impl<'a> LogSource for &'a StubLogSource {
    async fn latest_block_number(&self) -> Result<u64> {
        Ok(self.chain_head)
    }

    async fn migration_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RawMigrationLog>> {
        self.queried.lock().unwrap().push((from_block, to_block));

        let remaining = self.failing_queries.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_queries.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("connection reset by peer"));
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| (from_block..=to_block).contains(&block))
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, _block_number: u64) -> Result<u64> {
        Ok(BLOCK_TIMESTAMP)
    }
}

/// Records every request; either answers like SQS or fails at the transport level.
#[derive(Clone, Default)]
pub struct StubTransport {
    pub fail: bool,
    pub requests: Arc<Mutex<Vec<SignedRequest>>>,
}

impl StubTransport {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<SignedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }
}

impl QueueTransport for StubTransport {
    async fn send(&self, request: SignedRequest) -> Result<Value> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(anyhow!("dns error: failed to lookup address information"));
        }
        Ok(json!({ "MessageId": "5fea7756-0ea4-451a-a703-a558b933e274" }))
    }
}

/// Answers every request with an SQS JSON-protocol error body.
#[derive(Clone)]
pub struct RejectingTransport;

impl QueueTransport for RejectingTransport {
    async fn send(&self, _request: SignedRequest) -> Result<Value> {
        Ok(json!({
            "__type": "com.amazonaws.sqs#QueueDoesNotExist",
            "message": "The specified queue does not exist."
        }))
    }
}

pub fn client(transport: StubTransport, max_attempts: u32) -> SqsClient<StubTransport> {
    SqsClient::new(transport, &aws_config(), &delivery_config(max_attempts))
}
