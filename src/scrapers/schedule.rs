use crate::config::DelayRange;
use crate::error::FetchError;
use crate::models::{UnitParams, WorkUnit};
use crate::occupancy::{reserved_dates, OccupancyWindow};
use crate::scrapers::browser::SessionToken;
use crate::scrapers::rooms::BASE_URL;
use crate::scrapers::traits::{Site, SiteResponse};
use crate::scrapers::types::{pick, ACCEPT_LANGUAGES, DESKTOP_USER_AGENTS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub const SCHEDULE_PATH: &str = "/app/room/schedule";

/// Booking calendar of a single listing, polled month by month
pub struct ScheduleSite {
    client: Client,
    base_url: String,
    session: SessionToken,
    window: OccupancyWindow,
    month_delay: DelayRange,
    requests: AtomicUsize,
    failed: AtomicUsize,
}

impl ScheduleSite {
    /// The window is fixed for the whole run.
    pub fn new(
        session: SessionToken,
        window: OccupancyWindow,
        month_delay: DelayRange,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            session,
            window,
            month_delay,
            requests: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn window(&self) -> &OccupancyWindow {
        &self.window
    }

    /// (requests sent, requests failed) so far
    pub fn request_stats(&self) -> (usize, usize) {
        (
            self.requests.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    /// Share of month requests that succeeded, in percent
    pub fn request_success_rate(&self) -> f64 {
        let (sent, failed) = self.request_stats();
        if sent == 0 {
            return 0.0;
        }
        sent.saturating_sub(failed) as f64 / sent as f64 * 100.0
    }

    async fn fetch_month(&self, rid: &str, year: i32, month: u32) -> Result<HashSet<NaiveDate>, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let result = self.post_month(rid, year, month).await;
        if result.is_err() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn post_month(&self, rid: &str, year: i32, month: u32) -> Result<HashSet<NaiveDate>, FetchError> {
        let year = year.to_string();
        let month = format!("{:02}", month);
        let form = [("rid", rid), ("year", year.as_str()), ("month", month.as_str())];

        let response = self
            .client
            .post(format!("{}{}", self.base_url, SCHEDULE_PATH))
            .form(&form)
            .header("User-Agent", pick(DESKTOP_USER_AGENTS))
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header("Accept-Language", pick(ACCEPT_LANGUAGES))
            .header("Origin", BASE_URL)
            .header("Referer", format!("{}/room/detail/{}", BASE_URL, rid))
            .header("Cookie", self.session.cookie_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }
        let data: Value = serde_json::from_str(&response.text().await?)?;
        let code = data.get("error_code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            return Err(FetchError::MalformedResponse(format!("api error_code {}", code)));
        }
        Ok(reserved_dates(&data))
    }
}

#[async_trait]
impl Site for ScheduleSite {
    fn source_name(&self) -> &'static str {
        "occupancy"
    }

    async fn request(&self, unit: &WorkUnit) -> Result<SiteResponse, FetchError> {
        let UnitParams::Listing { rid, row } = &unit.params else {
            return Err(FetchError::MalformedResponse(format!(
                "{} is not a listing unit",
                unit
            )));
        };

        let mut reserved = HashSet::new();
        for (i, (year, month)) in self.window.months.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.month_delay.sample()).await;
            }
            reserved.extend(self.fetch_month(rid, *year, *month).await?);
        }

        let record = self.window.annotate(row, &reserved);
        debug!(
            rid = %rid,
            rate = ?record.get("occupancy_rate_percent"),
            "Analyzed booking calendar"
        );
        Ok(SiteResponse::Records(vec![record]))
    }
}
