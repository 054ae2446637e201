use crate::error::FetchError;
use crate::models::{Record, WorkUnit};
use async_trait::async_trait;

/// What one request to a site produced
#[derive(Debug, Clone, PartialEq)]
pub enum SiteResponse {
    Records(Vec<Record>),
    /// Well-formed response with nothing in it
    EndOfData,
}

/// Common trait for all listing sources.
///
/// A site performs exactly one logical request per call and maps the raw
/// response into records. Pacing and retries belong to the caller.
#[async_trait]
pub trait Site: Send + Sync {
    /// Get the name of the source, used in logs
    fn source_name(&self) -> &'static str;

    /// Whether an empty response means the source has no further pages
    fn paginated(&self) -> bool {
        false
    }

    async fn request(&self, unit: &WorkUnit) -> Result<SiteResponse, FetchError>;

    /// Switch to a different client identity after the site blocked us
    fn rotate_identity(&self) {}
}
