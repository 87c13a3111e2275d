use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing AWS region")]
    MissingRegion,
    #[error("Invalid AWS region: {region}")]
    InvalidRegion { region: String },
    #[error("Missing required credential: {field}")]
    MissingCredential { field: String },
    #[error("Missing queue URL")]
    MissingQueueUrl,
    #[error("Invalid queue URL {url}: {reason}")]
    InvalidQueueUrl { url: String, reason: String },
    #[error("Invalid scan window size: {size}")]
    InvalidWindowSize { size: u64 },
    #[error("Queue {url} is unreachable: {reason}")]
    QueueUnreachable { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Missing required event argument: {field}")]
    MissingArgument { field: String },
    #[error("Missing required log coordinate: {field}")]
    MissingCoordinate { field: String },
    #[error("Failed to scale {field} by 10^18: {reason}")]
    UnitConversion { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to serialize request payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Delivery to {target} exhausted after {attempts} attempts: {reason}")]
    Exhausted {
        target: String,
        attempts: u32,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("HMAC rejected a {length}-byte key")]
    InvalidKey { length: usize },
}
