//! Weather timeline client against a mock timeline endpoint.

use opcall::retry::ExponentialRetryPolicy;
use opcall::weather::WeatherApi;
use opcall::{Client, Error};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> WeatherApi {
    WeatherApi::from_builder(
        "secret",
        &format!("{}/timeline", server.uri()),
        Client::builder().retry_policy(ExponentialRetryPolicy::new(
            2,
            Duration::from_millis(1),
            2,
        )),
    )
    .unwrap()
}

#[tokio::test]
async fn test_window_uses_single_timeline_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/timeline/38.9697,-77.385/100/7300"))
        .and(query_param("key", "secret"))
        .and(query_param("include", "current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"days": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let data = api(&mock_server)
        .get_weather_timeline("38.9697,-77.385", 100, Some(7300), false)
        .await
        .unwrap();

    assert_eq!(data, json!({"days": []}));
}

#[tokio::test]
async fn test_hourly_calls_once_per_hour_bin() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/timeline/20001/\d+$"))
        .and(query_param("key", "secret"))
        .respond_with(|req: &wiremock::Request| {
            let ts = req.url.path().rsplit('/').next().unwrap_or_default().to_string();
            ResponseTemplate::new(200).set_body_json(json!({"ts": ts}))
        })
        .expect(3)
        .mount(&mock_server)
        .await;

    let data = api(&mock_server)
        .get_weather_timeline("20001", 0, Some(7200), true)
        .await
        .unwrap();

    assert_eq!(
        data,
        json!([{"ts": "0"}, {"ts": "3600"}, {"ts": "7200"}])
    );
}

#[tokio::test]
async fn test_point_in_time_ignores_hourly() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/timeline/20001/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let data = api(&mock_server)
        .get_weather_timeline("20001", 42, None, true)
        .await
        .unwrap();

    assert_eq!(data["temp"], 1);
}

#[tokio::test]
async fn test_hourly_stops_at_first_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/timeline/20001/0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/timeline/20001/3600"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = api(&mock_server)
        .get_weather_timeline("20001", 0, Some(7200), true)
        .await;

    match result {
        Err(Error::ServerError { status, .. }) => assert_eq!(status.as_u16(), 400),
        other => panic!("Expected ServerError, got {:?}", other),
    }
}
