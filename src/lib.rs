pub mod indexer;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod utils;
