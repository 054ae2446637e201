use crate::config::RetryPolicy;
use crate::dedup::dedup_records;
use crate::error::FetchError;
use crate::models::{flatten, Record, UnitParams, WorkUnit};
use crate::scrapers::traits::{Site, SiteResponse};
use crate::scrapers::types::{pick, ACCEPT_LANGUAGES, DESKTOP_USER_AGENTS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const BASE_URL: &str = "https://33m2.co.kr";
pub const SEARCH_PATH: &str = "/app/room/search";

/// Most rooms the search endpoint returns for one keyword
pub const ITEM_CAP: usize = 1000;

/// Whole-country bounding box sent with every keyword search
const BOUNDS: [(&str, &str); 4] = [
    ("north_east_lng", "131.900000"),
    ("north_east_lat", "43.000000"),
    ("south_west_lng", "124.610058"),
    ("south_west_lat", "32.000000"),
];

/// Keyword search on the room-rental platform
pub struct RoomSearchSite {
    client: Client,
    base_url: String,
    subdivisions: BTreeMap<String, Vec<String>>,
    pacing: RetryPolicy,
    identity: AtomicUsize,
}

impl RoomSearchSite {
    /// `pacing` supplies the pause between subdivision searches of one area
    pub fn new(
        subdivisions: BTreeMap<String, Vec<String>>,
        pacing: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            subdivisions,
            pacing,
            identity: AtomicUsize::new(rand::random::<usize>() % DESKTOP_USER_AGENTS.len()),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn user_agent(&self) -> &'static str {
        DESKTOP_USER_AGENTS[self.identity.load(Ordering::Relaxed) % DESKTOP_USER_AGENTS.len()]
    }

    async fn search(&self, keyword: &str) -> Result<Vec<Map<String, Value>>, FetchError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("keyword", keyword),
            ("by_location", "true"),
            ("itemcount", "1000"),
        ];
        form.extend(BOUNDS);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, SEARCH_PATH))
            .form(&form)
            .header("User-Agent", self.user_agent())
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header("Accept-Language", pick(ACCEPT_LANGUAGES))
            .header("Origin", BASE_URL)
            .header("Referer", format!("{}/webpc/search/map", BASE_URL))
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }
        let data: Value = serde_json::from_str(&response.text().await?)?;
        let rooms = parse_search_result(&data)?;
        debug!(keyword, count = rooms.len(), "Search returned rooms");
        Ok(rooms)
    }
}

#[async_trait]
impl Site for RoomSearchSite {
    fn source_name(&self) -> &'static str {
        "rooms"
    }

    async fn request(&self, unit: &WorkUnit) -> Result<SiteResponse, FetchError> {
        let UnitParams::Area { keyword, region } = &unit.params else {
            return Err(FetchError::MalformedResponse(format!(
                "{} is not an area unit",
                unit
            )));
        };

        let rooms = self.search(keyword).await?;
        if rooms.len() < ITEM_CAP {
            let records = rooms
                .iter()
                .map(|room| normalize_room(room, keyword, region))
                .collect();
            return Ok(SiteResponse::Records(records));
        }

        let Some(subdivisions) = self.subdivisions.get(keyword.as_str()) else {
            warn!(keyword = %keyword, "⚠️ hit the item cap and has no subdivisions, keeping capped result");
            let records = rooms
                .iter()
                .map(|room| normalize_room(room, keyword, region))
                .collect();
            let (unique, _) = dedup_records(records, "rid");
            return Ok(SiteResponse::Records(unique));
        };

        info!(keyword = %keyword, parts = subdivisions.len(), "🔄 hit the item cap, searching subdivisions");
        let pause = self.pacing.delay_for(unit.category.as_deref());
        let mut records = Vec::new();
        for subdivision in subdivisions {
            tokio::time::sleep(pause.sample()).await;
            let sub_keyword = format!("{} {}", keyword, subdivision);
            let rooms = self.search(&sub_keyword).await?;
            if rooms.len() >= ITEM_CAP {
                warn!(keyword = %sub_keyword, "subdivision also hit the item cap");
            }
            records.extend(
                rooms
                    .iter()
                    .map(|room| normalize_room(room, &sub_keyword, region)),
            );
        }

        let (unique, removed) = dedup_records(records, "rid");
        info!(keyword = %keyword, rooms = unique.len(), duplicates = removed, "✅ subdivisions merged");
        Ok(SiteResponse::Records(unique))
    }

    fn rotate_identity(&self) {
        let next = self.identity.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            user_agent = DESKTOP_USER_AGENTS[next % DESKTOP_USER_AGENTS.len()],
            "Rotated client identity"
        );
    }
}

/// Pulls the room list out of a search response
pub fn parse_search_result(data: &Value) -> Result<Vec<Map<String, Value>>, FetchError> {
    let code = data.get("error_code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        return Err(FetchError::MalformedResponse(format!("api error_code {}", code)));
    }
    match data.get("list") {
        Some(Value::Array(items)) => Ok(items.iter().filter_map(Value::as_object).cloned().collect()),
        _ => Err(FetchError::MalformedResponse("response has no room list".to_string())),
    }
}

/// Flattened room plus crawl metadata
pub fn normalize_room(room: &Map<String, Value>, keyword: &str, region: &str) -> Record {
    let now = Local::now();
    let mut record = flatten(room);
    record.insert(
        "crawl_datetime".into(),
        Value::String(now.format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    record.insert("crawl_timestamp".into(), Value::from(now.timestamp()));
    record.insert("search_keyword".into(), Value::String(keyword.to_string()));
    record.insert("region_name".into(), Value::String(region.to_string()));
    record
}

/// Room counts per `region_name`, largest first
pub fn records_per_region(records: &[Record]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        let region = record
            .get("region_name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        *counts.entry(region.to_string()).or_default() += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_error_code_is_malformed() {
        let err = parse_search_result(&json!({"error_code": 7})).unwrap_err();
        assert_eq!(err, FetchError::MalformedResponse("api error_code 7".into()));
        assert!(parse_search_result(&json!({"error_code": 0})).is_err());
    }

    #[test]
    fn room_list_is_extracted() {
        let rooms = parse_search_result(&json!({
            "error_code": 0,
            "list": [{"rid": 1}, {"rid": 2}, "junk"]
        }))
        .unwrap();
        assert_eq!(rooms.len(), 2);
    }

    #[test]
    fn normalized_room_carries_keyword_and_region() {
        let room = json!({"rid": 31, "room_name": "역삼 스테이", "addr": {"province": "서울"}});
        let record = normalize_room(room.as_object().unwrap(), "강남구 역삼동", "서울특별시");

        assert_eq!(record["addr.province"], json!("서울"));
        assert_eq!(record["search_keyword"], json!("강남구 역삼동"));
        assert_eq!(record["region_name"], json!("서울특별시"));
        assert!(record["crawl_timestamp"].is_i64());
    }

    #[test]
    fn region_counts_sorted_descending() {
        let records: Vec<Record> = [
            json!({"region_name": "경기도"}),
            json!({"region_name": "서울특별시"}),
            json!({"region_name": "서울특별시"}),
            json!({}),
        ]
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let counts = records_per_region(&records);

        assert_eq!(counts[0], ("서울특별시".to_string(), 2));
        assert_eq!(counts.len(), 3);
    }
}
