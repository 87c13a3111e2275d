use alloy_primitives::U256;
use rust_decimal::Decimal;

use crate::models::datasets::migrations::{MigrationMessage, RawMigrationLog};
use crate::models::errors::TransformError;

// Both token and native amounts are 18-decimal fixed point
const AMOUNT_DECIMALS: u32 = 18;

pub trait MigrationTransformer {
    fn transform_migration(&self, block_timestamp: u64) -> Result<MigrationMessage, TransformError>;
}

impl MigrationTransformer for RawMigrationLog {
    fn transform_migration(&self, block_timestamp: u64) -> Result<MigrationMessage, TransformError> {
        let missing = |field: &str| TransformError::MissingArgument {
            field: field.to_string(),
        };

        let token = self.args.token.as_ref().ok_or_else(|| missing("token"))?;
        let pair = self
            .args
            .pair_address
            .as_ref()
            .ok_or_else(|| missing("pairAddress"))?;
        let amount_token = self.args.amount_token.ok_or_else(|| missing("amountToken"))?;
        let amount_eth = self.args.amount_eth.ok_or_else(|| missing("amountETH"))?;
        let tx_hash = self
            .tx_hash
            .as_ref()
            .ok_or_else(|| TransformError::MissingCoordinate {
                field: "tx_hash".to_string(),
            })?;

        Ok(MigrationMessage {
            token_address: token.to_uppercase(),
            pool_id: pair.to_uppercase(),
            amount_token: scale_down(amount_token, "amountToken")?,
            amount_eth: scale_down(amount_eth, "amountETH")?,
            timestamp_millis: block_timestamp.saturating_mul(1000),
            transaction_hash: tx_hash.clone(),
        })
    }
}

/// Converts an amount in base units to an exact decimal with 18 fractional
/// digits. Amounts above the 96-bit decimal mantissa (about 7.9e28 base
/// units) are rejected rather than rounded.
pub fn scale_down(amount: U256, field: &str) -> Result<Decimal, TransformError> {
    let conversion_error = |reason: String| TransformError::UnitConversion {
        field: field.to_string(),
        reason,
    };

    let base_units = u128::try_from(amount)
        .ok()
        .and_then(|units| i128::try_from(units).ok())
        .ok_or_else(|| conversion_error(format!("{amount} does not fit in 128 bits")))?;

    Decimal::try_from_i128_with_scale(base_units, AMOUNT_DECIMALS)
        .map(|amount| amount.normalize())
        .map_err(|e| conversion_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::datasets::migrations::MigrationArgs;

    fn raw_log() -> RawMigrationLog {
        RawMigrationLog {
            block_number: Some(42),
            tx_hash: Some("0x1".to_string()),
            tx_index: Some(0),
            log_index: Some(0),
            args: MigrationArgs {
                token: Some("0xabc".to_string()),
                pair_address: Some("0xdef".to_string()),
                amount_token: Some(U256::from(2_000_000_000_000_000_000u128)),
                amount_eth: Some(U256::from(1_000_000_000_000_000_000u128)),
            },
        }
    }

    #[test]
    fn transforms_migration_log() {
        let message = raw_log().transform_migration(1_700_000_000).unwrap();

        assert_eq!(
            message,
            MigrationMessage {
                token_address: "0XABC".to_string(),
                pool_id: "0XDEF".to_string(),
                amount_token: Decimal::from(2),
                amount_eth: Decimal::from(1),
                timestamp_millis: 1_700_000_000_000,
                transaction_hash: "0x1".to_string(),
            }
        );
    }

    #[test]
    fn transform_is_deterministic() {
        let log = raw_log();
        assert_eq!(
            log.transform_migration(1_700_000_000).unwrap(),
            log.transform_migration(1_700_000_000).unwrap()
        );
    }

    #[test]
    fn keeps_fractional_amounts() {
        let mut log = raw_log();
        log.args.amount_eth = Some(U256::from(1_500_000_000_000_000_000u128));
        log.args.amount_token = Some(U256::from(1u64));

        let message = log.transform_migration(0).unwrap();
        assert_eq!(message.amount_eth, Decimal::new(15, 1));
        assert_eq!(message.amount_token, Decimal::new(1, 18));
    }

    #[test]
    fn scales_without_losing_digits() {
        let amount = U256::from(123_456_789_123_456_789_123_456_789u128);
        assert_eq!(
            scale_down(amount, "amountToken").unwrap().to_string(),
            "123456789.123456789123456789"
        );

        // One base unit apart must stay distinguishable
        let one = scale_down(U256::from(1_000_000_000_000_000_000u128), "amountETH").unwrap();
        let one_plus = scale_down(U256::from(1_000_000_000_000_000_001u128), "amountETH").unwrap();
        assert_ne!(one, one_plus);
        assert_eq!(one_plus.to_string(), "1.000000000000000001");
    }

    #[test]
    fn rejects_amounts_beyond_decimal_range() {
        let err = scale_down(U256::MAX, "amountToken").unwrap_err();
        assert!(matches!(err, TransformError::UnitConversion { field, .. } if field == "amountToken"));
    }

    #[test]
    fn serializes_amounts_as_exact_numbers() {
        let mut log = raw_log();
        log.args.amount_token = Some(U256::from(123_456_789_123_456_789_123_456_789u128));

        let json = serde_json::to_string(&log.transform_migration(1_700_000_000).unwrap()).unwrap();
        assert!(json.contains(r#""amountToken":123456789.123456789123456789"#), "{json}");
        assert!(json.contains(r#""amountETH":1,"#), "{json}");
    }

    #[test]
    fn uppercases_mixed_case_addresses() {
        let mut log = raw_log();
        log.args.token = Some("0xAbCdEf".to_string());

        let message = log.transform_migration(0).unwrap();
        assert_eq!(message.token_address, "0XABCDEF");
    }

    #[test]
    fn fails_on_missing_argument() {
        let mut log = raw_log();
        log.args.amount_eth = None;

        let err = log.transform_migration(1_700_000_000).unwrap_err();
        assert!(matches!(err, TransformError::MissingArgument { field } if field == "amountETH"));
    }
}
