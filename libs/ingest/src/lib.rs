pub mod config;
pub mod error;
mod claim;
mod ingestor;
mod sink;
mod stats;

pub use claim::{ClaimLoop, ClaimState, IntervalTicker, Ticker};
pub use config::{FailurePolicy, IngestConfig};
pub use error::IngestError;
pub use ingestor::{BatchIngestor, run};
pub use sink::{AccountSink, BatchSink, FlushSummary, LinkSink};
pub use stats::{IngestStats, IngestStatsSnapshot};
