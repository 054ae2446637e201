//! The sequential crawl core: paced fetching, failure tracking, aggregation.

pub mod aggregator;
pub mod fetcher;
pub mod tracker;

pub use aggregator::{Aggregator, RunOutput, RunSummary};
pub use fetcher::PacedFetcher;
pub use tracker::FailureTracker;
