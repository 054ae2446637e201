mod common;

use common::{instant_policy, run_options};
use rental_scout::config::FlushBy;
use rental_scout::crawl::{Aggregator, PacedFetcher};
use rental_scout::scrapers::types::AreaTable;
use rental_scout::scrapers::RoomSearchSite;
use rental_scout::table::CsvSink;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AREAS: &str = r#"
    [[regions]]
    name = "seoul"
    category = "seoul"
    areas = ["gangnam", "mapo"]

    [subdivisions]
    mapo = ["hapjeong", "mangwon"]
"#;

fn rooms(rids: impl IntoIterator<Item = u64>) -> serde_json::Value {
    let list: Vec<_> = rids
        .into_iter()
        .map(|rid| json!({"rid": rid, "room_name": format!("room {rid}"), "addr": {"lat": 37.5}}))
        .collect();
    json!({"error_code": 0, "list": list})
}

async fn mount_search(server: &MockServer, keyword: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/app/room/search"))
        .and(body_string_contains(format!("keyword={}&", keyword)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn blocked_search_is_retried_and_capped_area_is_subdivided() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/room/search"))
        .and(body_string_contains("keyword=gangnam&"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_search(&server, "gangnam", rooms([1, 2])).await;
    mount_search(&server, "mapo", rooms(0..1000)).await;
    mount_search(&server, "mapo+hapjeong", rooms([5000, 5001, 5002])).await;
    mount_search(&server, "mapo+mangwon", rooms([5002, 5003])).await;

    let table: AreaTable = toml::from_str(AREAS).unwrap();
    let site = RoomSearchSite::new(table.subdivisions.clone(), instant_policy(), Duration::from_secs(5))
        .unwrap()
        .with_base_url(server.uri());
    let dir = tempfile::tempdir().unwrap();
    let mut aggregator = Aggregator::new(
        PacedFetcher::new(site, instant_policy()),
        CsvSink::new(dir.path(), "33m2_rooms"),
        run_options(10, FlushBy::Processed),
    );

    let out = aggregator.run(table.units(), 0).await.unwrap();

    assert_eq!(out.summary.failures_recorded, 0);
    assert_eq!(out.summary.records, 2 + 4);

    let mapo: Vec<_> = out
        .records
        .iter()
        .filter(|r| r["region_name"] == json!("seoul"))
        .skip(2)
        .map(|r| (r["rid"].clone(), r["search_keyword"].clone()))
        .collect();
    assert_eq!(
        mapo,
        [
            (json!(5000), json!("mapo hapjeong")),
            (json!(5001), json!("mapo hapjeong")),
            (json!(5002), json!("mapo hapjeong")),
            (json!(5003), json!("mapo mangwon")),
        ]
    );
    assert_eq!(out.records[0]["addr.lat"], json!(37.5));
}

#[tokio::test]
async fn api_error_code_fails_the_area() {
    let server = MockServer::start().await;
    mount_search(&server, "gangnam", json!({"error_code": 500, "message": "busy"})).await;
    mount_search(&server, "mapo", rooms([9])).await;

    let table: AreaTable = toml::from_str(AREAS).unwrap();
    let site = RoomSearchSite::new(table.subdivisions.clone(), instant_policy(), Duration::from_secs(5))
        .unwrap()
        .with_base_url(server.uri());
    let dir = tempfile::tempdir().unwrap();
    let mut aggregator = Aggregator::new(
        PacedFetcher::new(site, instant_policy()),
        CsvSink::new(dir.path(), "33m2_rooms"),
        run_options(10, FlushBy::Processed),
    );

    let out = aggregator.run(table.units(), 0).await.unwrap();

    assert_eq!(out.summary.records, 1);
    let unresolved: Vec<_> = out.summary.unresolved.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(unresolved, ["seoul gangnam"]);
}

#[tokio::test]
async fn capped_area_without_subdivisions_keeps_unique_rooms() {
    let server = MockServer::start().await;
    // 1000 rows, two of them repeats
    mount_search(&server, "seocho", rooms((0..998).chain([0, 1]))).await;

    let table: AreaTable = toml::from_str(
        r#"
        [[regions]]
        name = "seoul"
        areas = ["seocho"]
        "#,
    )
    .unwrap();
    let site = RoomSearchSite::new(table.subdivisions.clone(), instant_policy(), Duration::from_secs(5))
        .unwrap()
        .with_base_url(server.uri());
    let dir = tempfile::tempdir().unwrap();
    let mut aggregator = Aggregator::new(
        PacedFetcher::new(site, instant_policy()),
        CsvSink::new(dir.path(), "33m2_rooms"),
        run_options(10, FlushBy::Processed),
    );

    let out = aggregator.run(table.units(), 0).await.unwrap();

    assert_eq!(out.summary.failures_recorded, 0);
    assert_eq!(out.summary.records, 998);
    assert!(out.records.iter().all(|r| r["search_keyword"] == json!("seocho")));
}
