use crate::error::{Error, Result};
use crate::models::WorkUnit;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Mobile browsers the map API expects to talk to
pub const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_7_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 11; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.164 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; SM-A505F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.210 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 13_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.1.2 Mobile/15E148 Safari/604.1",
];

/// Desktop browsers used against the room platform
pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.6; rv:138.0) Gecko/20100101 Firefox/138.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36 Edg/135.0.0.0",
];

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "ko-KR,ko;q=0.9,en;q=0.8",
    "ko,en-US;q=0.9,en;q=0.8",
    "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7",
];

/// Random entry of a header pool
pub fn pick(pool: &[&'static str]) -> &'static str {
    pool.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

/// Fixed query of the map listing API: monthly-rent apartments, officetels and
/// one-rooms inside the capital-area bounding box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingQuery {
    /// Property types, colon separated
    pub property_types: String,
    /// Trade type (`B2` is monthly rent)
    pub trade_type: String,
    pub zoom: u8,
    pub lat: String,
    pub lon: String,
    pub bottom: String,
    pub left: String,
    pub top: String,
    pub right: String,
    /// Deposit cap in units of 10,000 KRW
    pub max_deposit: u32,
    /// Exclusive-area cap in m²
    pub max_area: u32,
    pub sort: String,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            property_types: "APT:OPST:OR".to_string(),
            trade_type: "B2".to_string(),
            zoom: 12,
            lat: "37.545181".to_string(),
            lon: "127.022949".to_string(),
            bottom: "36.8".to_string(),
            left: "126.60".to_string(),
            top: "38.3".to_string(),
            right: "127.35".to_string(),
            max_deposit: 1000,
            max_area: 99,
            sort: "rank".to_string(),
        }
    }
}

impl ListingQuery {
    pub fn to_pairs(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("itemId", String::new()),
            ("mapKey", String::new()),
            ("lgeo", String::new()),
            ("showR0", String::new()),
            ("rletTpCd", self.property_types.clone()),
            ("tradTpCd", self.trade_type.clone()),
            ("z", self.zoom.to_string()),
            ("lat", self.lat.clone()),
            ("lon", self.lon.clone()),
            ("btm", self.bottom.clone()),
            ("lft", self.left.clone()),
            ("top", self.top.clone()),
            ("rgt", self.right.clone()),
            ("wprcMax", self.max_deposit.to_string()),
            ("spcMax", self.max_area.to_string()),
            ("sort", self.sort.clone()),
            ("page", page.to_string()),
        ]
    }
}

/// A top-level region and the area keywords searched inside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// Delay band key, see `RetryPolicy::category_delays`
    #[serde(default)]
    pub category: Option<String>,
    pub areas: Vec<String>,
}

/// Region × area keyword tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaTable {
    pub regions: Vec<Region>,
    /// Finer keywords for areas whose search hits the item cap
    #[serde(default)]
    pub subdivisions: BTreeMap<String, Vec<String>>,
}

impl AreaTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let table: AreaTable = toml::from_str(&text)?;
        if table.regions.iter().all(|r| r.areas.is_empty()) {
            return Err(Error::Config(format!("{} lists no areas", path.display())));
        }
        Ok(table)
    }

    /// One unit per area, regions in file order.
    pub fn units(&self) -> Vec<WorkUnit> {
        self.regions
            .iter()
            .flat_map(|region| {
                region
                    .areas
                    .iter()
                    .map(move |area| (region, area.as_str()))
            })
            .enumerate()
            .map(|(index, (region, area))| {
                WorkUnit::area(index, &region.name, area, region.category.clone())
            })
            .collect()
    }

    pub fn area_count(&self) -> usize {
        self.regions.iter().map(|r| r.areas.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitParams;

    const TABLE: &str = r#"
        [[regions]]
        name = "서울특별시"
        category = "seoul"
        areas = ["강남구", "마포구"]

        [[regions]]
        name = "경기도"
        areas = ["수원시"]

        [subdivisions]
        "강남구" = ["역삼동", "삼성동"]
    "#;

    #[test]
    fn units_follow_region_order() {
        let table: AreaTable = toml::from_str(TABLE).unwrap();
        let units = table.units();

        assert_eq!(table.area_count(), 3);
        let ids: Vec<_> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["서울특별시 강남구", "서울특별시 마포구", "경기도 수원시"]);
        assert_eq!(units[2].index, 2);
        assert_eq!(units[0].category.as_deref(), Some("seoul"));
        assert_eq!(units[2].category, None);
        assert_eq!(
            units[1].params,
            UnitParams::Area {
                keyword: "마포구".into(),
                region: "서울특별시".into()
            }
        );
        assert_eq!(table.subdivisions["강남구"], ["역삼동", "삼성동"]);
    }

    #[test]
    fn shipped_area_table_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/areas.toml");
        let table = AreaTable::load(&path).unwrap();
        assert_eq!(table.regions.len(), 3);
        assert_eq!(table.area_count(), 66);
    }

    #[test]
    fn listing_query_ends_with_page() {
        let pairs = ListingQuery::default().to_pairs(7);
        assert_eq!(pairs.last().unwrap(), &("page", "7".to_string()));
        assert!(pairs.contains(&("tradTpCd", "B2".to_string())));
    }
}
