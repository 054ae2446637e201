use crate::error::FetchError;
use crate::models::{Record, UnitParams, WorkUnit};
use crate::scrapers::traits::{Site, SiteResponse};
use crate::scrapers::types::{pick, ListingQuery, MOBILE_USER_AGENTS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

pub const LISTING_URL: &str = "https://m.land.naver.com/cluster/ajax/articleList";

/// Column holding the number of listings at the same address
pub const SAME_ADDRESS_COUNT: &str = "동일주소매물수";

/// Paginated map-listing API scraper
pub struct NaverSite {
    client: Client,
    url: String,
    query: ListingQuery,
}

impl NaverSite {
    /// Create a new scraper with the default capital-area query
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_query(ListingQuery::default(), timeout)
    }

    /// Create a new scraper with a custom query
    pub fn with_query(query: ListingQuery, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: LISTING_URL.to_string(),
            query,
        })
    }

    /// Point the scraper at a different endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl Site for NaverSite {
    fn source_name(&self) -> &'static str {
        "naver"
    }

    fn paginated(&self) -> bool {
        true
    }

    async fn request(&self, unit: &WorkUnit) -> Result<SiteResponse, FetchError> {
        let UnitParams::Page { page } = unit.params else {
            return Err(FetchError::MalformedResponse(format!(
                "{} is not a page unit",
                unit
            )));
        };

        debug!(page, "Fetching listing page");

        let response = self
            .client
            .get(&self.url)
            .query(&self.query.to_pairs(page))
            .header("User-Agent", pick(MOBILE_USER_AGENTS))
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "ko-KR,ko;q=0.9,en;q=0.8")
            .header("Referer", "https://m.land.naver.com/map")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let text = response.text().await?;
        let data: Value = serde_json::from_str(&text)?;
        parse_listing_page(&data)
    }
}

/// Maps a response body to records, or to end of data when `body` is empty
pub fn parse_listing_page(data: &Value) -> Result<SiteResponse, FetchError> {
    let Some(page) = data.as_object() else {
        return Err(FetchError::MalformedResponse(format!(
            "expected an object, got {}",
            data
        )));
    };
    let items = match page.get("body") {
        None | Some(Value::Null) => return Ok(SiteResponse::EndOfData),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(FetchError::MalformedResponse(format!(
                "body is not a list: {}",
                other
            )))
        }
    };

    if items.is_empty() {
        return Ok(SiteResponse::EndOfData);
    }

    let records: Vec<Record> = items
        .iter()
        .filter_map(Value::as_object)
        .map(extract_listing)
        .collect();
    Ok(SiteResponse::Records(records))
}

fn field(raw: &Map<String, Value>, key: &str, default: &str) -> Value {
    raw.get(key)
        .cloned()
        .unwrap_or_else(|| Value::String(default.to_string()))
}

/// Raw article to the column layout the map viewer reads
pub fn extract_listing(raw: &Map<String, Value>) -> Record {
    let mut record = Record::new();
    record.insert("매물제목".into(), field(raw, "atclNm", "N/A"));
    record.insert("층수정보".into(), field(raw, "flrInfo", "N/A"));
    record.insert("위도".into(), field(raw, "lat", ""));
    record.insert("경도".into(), field(raw, "lng", ""));
    record.insert("보증금".into(), field(raw, "prc", "N/A"));
    record.insert("월세".into(), field(raw, "rentPrc", "N/A"));
    record.insert("매물ID".into(), field(raw, "atclNo", ""));
    record.insert(
        SAME_ADDRESS_COUNT.into(),
        raw.get("sameAddrCnt").cloned().unwrap_or(Value::from(0)),
    );
    record.insert("전용면적".into(), field(raw, "spc2", "N/A"));
    record.insert("주소".into(), field(raw, "cortarNm", "N/A"));
    record.insert("매물유형".into(), field(raw, "rletTpNm", "N/A"));
    record.insert("방향".into(), field(raw, "direction", "N/A"));
    record.insert("건물명".into(), field(raw, "bildNm", "N/A"));
    record.insert("중개사무소명".into(), field(raw, "cpNm", "N/A"));
    record.insert("공인중개사".into(), field(raw, "rltrNm", "N/A"));
    record.insert("특징설명".into(), field(raw, "atclFetrDesc", "N/A"));

    let shared = raw.get("sameAddrCnt").and_then(Value::as_i64).unwrap_or(0) >= 2;
    let same_address = [
        ("동일주소_최대보증금", "sameAddrMaxPrc"),
        ("동일주소_최대월세", "sameAddrMaxPrc2"),
        ("동일주소_최소보증금", "sameAddrMinPrc"),
        ("동일주소_최소월세", "sameAddrMinPrc2"),
    ];
    for (column, key) in same_address {
        let value = if shared {
            field(raw, key, "N/A")
        } else {
            Value::String(String::new())
        };
        record.insert(column.into(), value);
    }

    record
}

/// Listings that share their address with at least one other listing
pub fn count_shared_addresses(records: &[Record]) -> usize {
    records
        .iter()
        .filter(|r| {
            r.get(SAME_ADDRESS_COUNT)
                .and_then(Value::as_i64)
                .unwrap_or(0)
                >= 2
        })
        .count()
}
