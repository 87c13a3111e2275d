use alloy_primitives::U256;
use alloy_rpc_types_eth::Log;
use alloy_sol_types::sol;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer, ser::Error as _};
use serde_json::value::RawValue;
use tracing::warn;

use crate::models::errors::TransformError;

sol! {
    /// Emitted by the launchpad when a token graduates into a liquidity pool.
    #[derive(Debug, PartialEq, Eq)]
    event TokenMigrated(
        address indexed token,
        address indexed pairAddress,
        uint256 amountToken,
        uint256 amountETH
    );
}

////////////////////////////////////// RPC Data ////////////////////////////////////////
// Decoded event arguments. Any of them may be absent if the log failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationArgs {
    pub token: Option<String>,
    pub pair_address: Option<String>,
    pub amount_token: Option<U256>,
    pub amount_eth: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMigrationLog {
    pub block_number: Option<u64>,
    pub tx_hash: Option<String>,
    pub tx_index: Option<u64>,
    pub log_index: Option<u64>,
    pub args: MigrationArgs,
}

/// On-chain position of a log. Doubles as the queue group/dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCoordinates {
    pub block_number: u64,
    pub tx_hash: String,
    pub tx_index: u64,
    pub log_index: u64,
}

impl LogCoordinates {
    pub fn message_id(&self) -> String {
        format!("{}/{}/{}", self.tx_hash, self.tx_index, self.log_index)
    }
}

impl RawMigrationLog {
    pub fn coordinates(&self) -> Result<LogCoordinates, TransformError> {
        let missing = |field: &str| TransformError::MissingCoordinate {
            field: field.to_string(),
        };

        Ok(LogCoordinates {
            block_number: self.block_number.ok_or_else(|| missing("block_number"))?,
            tx_hash: self.tx_hash.clone().ok_or_else(|| missing("tx_hash"))?,
            tx_index: self.tx_index.ok_or_else(|| missing("tx_index"))?,
            log_index: self.log_index.ok_or_else(|| missing("log_index"))?,
        })
    }
}

impl From<&Log> for RawMigrationLog {
    fn from(log: &Log) -> Self {
        let args = match log.log_decode::<TokenMigrated>() {
            Ok(decoded) => {
                let event = decoded.inner.data;
                MigrationArgs {
                    token: Some(event.token.to_string()),
                    pair_address: Some(event.pairAddress.to_string()),
                    amount_token: Some(event.amountToken),
                    amount_eth: Some(event.amountETH),
                }
            }
            Err(e) => {
                // Left empty so the event fails on its own instead of failing the window
                warn!(
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    "Failed to decode TokenMigrated log: {}",
                    e
                );
                MigrationArgs::default()
            }
        };

        Self {
            block_number: log.block_number,
            tx_hash: log.transaction_hash.map(|hash| hash.to_string()),
            tx_index: log.transaction_index,
            log_index: log.log_index,
            args,
        }
    }
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMessage {
    pub token_address: String,
    pub pool_id: String,
    #[serde(serialize_with = "decimal_as_number")]
    pub amount_token: Decimal,
    #[serde(rename = "amountETH", serialize_with = "decimal_as_number")]
    pub amount_eth: Decimal,
    pub timestamp_millis: u64,
    pub transaction_hash: String,
}

// Written as a bare JSON number with every digit kept, e.g. `123456789.123456789123456789`
fn decimal_as_number<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    let raw = RawValue::from_string(value.normalize().to_string()).map_err(S::Error::custom)?;
    raw.serialize(serializer)
}
