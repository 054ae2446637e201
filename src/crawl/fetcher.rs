use crate::config::RetryPolicy;
use crate::error::FetchError;
use crate::models::{FailureReason, FetchOutcome, WorkUnit};
use crate::scrapers::{Site, SiteResponse};
use tracing::{debug, warn};

/// Issues one paced request per unit and turns every error into an outcome.
pub struct PacedFetcher<S> {
    site: S,
    policy: RetryPolicy,
}

impl<S: Site> PacedFetcher<S> {
    pub fn new(site: S, policy: RetryPolicy) -> Self {
        Self { site, policy }
    }

    pub fn site(&self) -> &S {
        &self.site
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn into_site(self) -> S {
        self.site
    }

    /// Fetches one unit. Never fails: exhausted retries become `FetchOutcome::Failure`.
    pub async fn fetch(&self, unit: &WorkUnit) -> FetchOutcome {
        let attempts = self.policy.max_retries.max(1);
        let pace = self.policy.delay_for(unit.category.as_deref());
        let mut last_error = FetchError::TransientNetwork("no attempt made".to_string());

        for attempt in 1..=attempts {
            let wait = pace.sample();
            debug!(unit = %unit, wait_ms = wait.as_millis() as u64, "pacing");
            tokio::time::sleep(wait).await;

            match self.site.request(unit).await {
                Ok(SiteResponse::Records(records)) => {
                    if attempt > 1 {
                        debug!(unit = %unit, attempt, "succeeded after retry");
                    }
                    return FetchOutcome::Success(records);
                }
                Ok(SiteResponse::EndOfData) if self.site.paginated() => {
                    return FetchOutcome::EmptySuccess;
                }
                Ok(SiteResponse::EndOfData) => {
                    // Only paginated sources have an end of data; elsewhere it is just an empty result.
                    return FetchOutcome::Success(Vec::new());
                }
                Err(e) => {
                    if e == FetchError::Blocked {
                        self.site.rotate_identity();
                    }
                    if attempt < attempts {
                        let backoff = self.policy.backoff.for_class(e.backoff_class()).sample();
                        warn!(
                            source = self.site.source_name(),
                            unit = %unit,
                            attempt,
                            max_attempts = attempts,
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "⚠️ request failed, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        warn!(
                            source = self.site.source_name(),
                            unit = %unit,
                            attempt,
                            error = %e,
                            "💥 retry budget exhausted"
                        );
                    }
                    last_error = e;
                }
            }
        }

        FetchOutcome::Failure(FailureReason {
            attempts,
            last_error,
        })
    }
}
