//! Rate-limited, resumable crawlers for rental listing sources.

pub mod config;
pub mod crawl;
pub mod dedup;
pub mod error;
pub mod models;
pub mod occupancy;
pub mod scrapers;
pub mod table;

pub use error::{Error, FetchError, Result};
