mod common;

use common::{files_ending, instant_policy, run_options};
use rental_scout::config::FlushBy;
use rental_scout::crawl::{Aggregator, PacedFetcher};
use rental_scout::models::WorkUnit;
use rental_scout::scrapers::NaverSite;
use rental_scout::table::{read_table, CsvSink};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn article(no: &str, title: &str) -> serde_json::Value {
    json!({
        "atclNo": no,
        "atclNm": title,
        "prc": 500,
        "rentPrc": 45,
        "lat": 37.55,
        "lng": 126.92,
        "sameAddrCnt": 1
    })
}

async fn mount_page(server: &MockServer, page: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/articleList"))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn crawl_stops_at_empty_page_and_writes_checkpoint_and_final() {
    let server = MockServer::start().await;
    mount_page(&server, "1", json!({"body": [article("1", "합정 오피스텔"), article("2", "망원 원룸")]})).await;
    mount_page(&server, "2", json!({"body": [article("3", "연남 아파트")]})).await;
    mount_page(&server, "3", json!({"body": []})).await;

    let dir = tempfile::tempdir().unwrap();
    let site = NaverSite::new(Duration::from_secs(5))
        .unwrap()
        .with_url(format!("{}/articleList", server.uri()));
    let mut aggregator = Aggregator::new(
        PacedFetcher::new(site, instant_policy()),
        CsvSink::new(dir.path(), "naver_properties"),
        run_options(2, FlushBy::Index),
    );

    let out = aggregator.run((1..).map(WorkUnit::page), 0).await.unwrap();

    assert_eq!(out.summary.units_attempted, 3);
    assert_eq!(out.summary.records, 3);
    assert!(out.summary.unresolved.is_empty());

    let checkpoints = files_ending(dir.path(), "_temp_2.csv");
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(read_table(&checkpoints[0]).unwrap().rows.len(), 3);

    let finals = files_ending(dir.path(), "_final.csv");
    assert_eq!(finals, vec![out.summary.final_path.clone()]);
    let table = read_table(&finals[0]).unwrap();
    assert_eq!(table.header[0], "매물제목");
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.rows[2]["매물ID"], json!("3"));
    assert_eq!(table.rows[2]["동일주소_최대보증금"], json!(""));
}

#[tokio::test]
async fn failing_page_is_retried_after_the_main_pass() {
    let server = MockServer::start().await;
    mount_page(&server, "1", json!({"body": [article("1", "a")]})).await;
    // Page 2 rate-limits the three in-call attempts, then recovers.
    Mock::given(method("GET"))
        .and(path("/articleList"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_page(&server, "2", json!({"body": [article("2", "b")]})).await;
    mount_page(&server, "3", json!({"body": []})).await;

    let dir = tempfile::tempdir().unwrap();
    let site = NaverSite::new(Duration::from_secs(5))
        .unwrap()
        .with_url(format!("{}/articleList", server.uri()));
    let mut aggregator = Aggregator::new(
        PacedFetcher::new(site, instant_policy()),
        CsvSink::new(dir.path(), "naver_properties"),
        run_options(0, FlushBy::Index),
    );

    let out = aggregator.run((1..).map(WorkUnit::page), 0).await.unwrap();

    assert_eq!(out.summary.failures_recorded, 1);
    assert_eq!(out.summary.recovered, 1);
    assert_eq!(out.summary.records, 2);
    let ids: Vec<_> = out.records.iter().map(|r| r["매물ID"].clone()).collect();
    assert_eq!(ids, [json!("1"), json!("2")]);
}

#[tokio::test]
async fn non_object_reply_is_a_failure_not_the_end() {
    let server = MockServer::start().await;
    mount_page(&server, "1", json!({"body": [article("1", "a")]})).await;
    Mock::given(method("GET"))
        .and(path("/articleList"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["rate limited"])))
        .expect(6)
        .mount(&server)
        .await;
    mount_page(&server, "3", json!({"body": [article("3", "c")]})).await;
    mount_page(&server, "4", json!({"body": []})).await;

    let dir = tempfile::tempdir().unwrap();
    let site = NaverSite::new(Duration::from_secs(5))
        .unwrap()
        .with_url(format!("{}/articleList", server.uri()));
    let mut aggregator = Aggregator::new(
        PacedFetcher::new(site, instant_policy()),
        CsvSink::new(dir.path(), "naver_properties"),
        run_options(0, FlushBy::Index),
    );

    let out = aggregator.run((1..).map(WorkUnit::page), 0).await.unwrap();

    assert_eq!(out.summary.units_attempted, 4);
    assert_eq!(out.summary.records, 2);
    assert_eq!(out.summary.failures_recorded, 1);
    let unresolved: Vec<_> = out.summary.unresolved.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(unresolved, ["page 2"]);
}
