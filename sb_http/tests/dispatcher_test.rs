use std::time::Duration;
use std::time::Instant;

use sb_http::Dispatcher;
use sb_http::ErrorKind;
use sb_http::RequestDescriptor;
use sb_http::RetryPolicy;
use sb_ratelimit::BucketKey;
use sb_ratelimit::QuotaWindow;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

const SUMMONER_PATH: &str = "/lol/summoner/v4/summoners/by-puuid/abc";

fn dispatcher(server: &MockServer) -> Dispatcher {
    Dispatcher::builder("RGAPI-integration")
        .endpoint_override(server.uri())
        .retry_policy(RetryPolicy { backoff_ms: 10, ..Default::default() })
        .build()
        .unwrap()
}

fn summoner() -> RequestDescriptor {
    RequestDescriptor::platform("summoner-v4.by-puuid", SUMMONER_PATH).label("Summoner abc")
}

#[tokio::test]
async fn test_fetches_json_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SUMMONER_PATH))
        .and(header("x-riot-token", "RGAPI-integration"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "puuid": "abc", "summonerLevel": 412 }))
                .insert_header("x-app-rate-limit", "20:1,100:120")
                .insert_header("x-app-rate-limit-count", "1:1,1:120")
                .insert_header("x-method-rate-limit", "1600:60")
                .insert_header("x-method-rate-limit-count", "1:60"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server);
    let value = dispatcher.submit(summoner()).await.unwrap();

    assert_eq!(value["summonerLevel"], 412);
    let app = dispatcher.tracker().snapshot(&BucketKey::app("na1"));
    assert_eq!(app.windows, vec![QuotaWindow::from_secs(20, 1), QuotaWindow::from_secs(100, 120)]);
    let method = dispatcher.tracker().snapshot(&BucketKey::method("na1", "summoner-v4.by-puuid"));
    assert_eq!(method.windows, vec![QuotaWindow::from_secs(1600, 60)]);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path(SUMMONER_PATH)).respond_with(ResponseTemplate::new(503)).expect(3).mount(&server).await;

    let err = dispatcher(&server).submit(summoner()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(err.attempts(), 3);
}

#[tokio::test]
async fn test_not_found_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path(SUMMONER_PATH)).respond_with(ResponseTemplate::new(404)).expect(1).mount(&server).await;

    let err = dispatcher(&server).submit(summoner()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_throttled_call_waits_for_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SUMMONER_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1").insert_header("x-rate-limit-type", "method"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SUMMONER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "puuid": "abc" })))
        .expect(1)
        .mount(&server)
        .await;

    let start = Instant::now();
    let value = dispatcher(&server).submit(summoner()).await.unwrap();

    assert_eq!(value["puuid"], "abc");
    assert!(start.elapsed() >= Duration::from_secs(1));
}
