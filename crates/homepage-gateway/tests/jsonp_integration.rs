//! Integration tests for the JSONP bridge using wiremock.

mod common;

use std::time::Duration;

use common::{gateway_for, JsonpResponder};
use homepage_gateway::jsonp::with_callback_param;
use homepage_gateway::{CallbackToken, GatewayError, JsonpBridge, JsonpError};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bridge() -> JsonpBridge {
    JsonpBridge::new(reqwest::Client::new())
}

fn url_for(server: &MockServer, route: &str, token: &CallbackToken) -> String {
    with_callback_param(&format!("{}{}", server.uri(), route), "callback", token)
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_fetch_resolves_with_payload_and_cleans_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsonp"))
        .respond_with(JsonpResponder::new(json!({"status": 0, "items": [1, 2, 3]})))
        .mount(&mock_server)
        .await;

    let bridge = bridge();
    let token = CallbackToken::generate();
    let payload = bridge
        .fetch(&url_for(&mock_server, "/jsonp", &token), &token)
        .await
        .unwrap();

    assert_eq!(payload, json!({"status": 0, "items": [1, 2, 3]}));
    assert!(!bridge.is_pending(&token));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_load_failure_cleans_up_and_bridge_is_reusable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(JsonpResponder::new(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let bridge = bridge();

    let failed = CallbackToken::generate();
    let result = bridge
        .fetch(&url_for(&mock_server, "/down", &failed), &failed)
        .await;
    match result {
        Err(JsonpError::LoadFailed { reason, .. }) => assert!(reason.contains("503")),
        other => panic!("expected load failure, got {:?}", other),
    }
    assert_eq!(bridge.pending_count(), 0);

    // Same token again: nothing leaked, so no collision
    let payload = bridge
        .fetch(&url_for(&mock_server, "/up", &failed), &failed)
        .await
        .unwrap();
    assert_eq!(payload, json!({"ok": true}));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_load_failure() {
    let bridge = bridge();
    let token = CallbackToken::generate();

    // Port 9 (discard) on localhost is not listening in test environments
    let result = bridge
        .fetch("http://127.0.0.1:9/jsonp?callback=x", &token)
        .await;

    assert!(matches!(result, Err(JsonpError::LoadFailed { .. })));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_script_calling_other_name_is_not_invoked() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsonp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("someoneElse({\"a\":1})", "application/javascript"),
        )
        .mount(&mock_server)
        .await;

    let bridge = bridge();
    let token = CallbackToken::generate();
    let result = bridge
        .fetch(&url_for(&mock_server, "/jsonp", &token), &token)
        .await;

    assert!(matches!(result, Err(JsonpError::CallbackNotInvoked(name)) if name == token.as_str()));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_malformed_script_rejects() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsonp"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not javascript at all"))
        .mount(&mock_server)
        .await;

    let bridge = bridge();
    let token = CallbackToken::generate();
    let result = bridge
        .fetch(&url_for(&mock_server, "/jsonp", &token), &token)
        .await;

    assert!(matches!(result, Err(JsonpError::MalformedScript(_))));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_concurrent_fetches_do_not_cross() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            JsonpResponder::new(json!({"which": "a"})).delay(Duration::from_millis(50)),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(JsonpResponder::new(json!({"which": "b"})))
        .mount(&mock_server)
        .await;

    let bridge = bridge();
    let url_a = format!("{}/a", mock_server.uri());
    let url_b = format!("{}/b", mock_server.uri());

    let (a, b) = tokio::join!(
        bridge.fetch_with_callback_param(&url_a),
        bridge.fetch_with_callback_param(&url_b),
    );

    assert_eq!(a.unwrap()["which"], "a");
    assert_eq!(b.unwrap()["which"], "b");
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_cancelled_fetch_unregisters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(JsonpResponder::new(json!({})).delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let bridge = bridge();
    let token = CallbackToken::generate();
    let url = url_for(&mock_server, "/slow", &token);

    let timed_out = tokio::time::timeout(Duration::from_millis(100), bridge.fetch(&url, &token)).await;

    assert!(timed_out.is_err());
    assert!(!bridge.is_pending(&token));
}

#[tokio::test]
async fn test_fetch_with_callback_param_rejects_bad_url() {
    let result = bridge().fetch_with_callback_param("not a url").await;
    assert!(matches!(result, Err(GatewayError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_tx_adcode_goes_through_bridge() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/location/v1/ip"))
        .and(query_param("key", "TXKEY"))
        .and(query_param("output", "jsonp"))
        .respond_with(JsonpResponder::new(json!({
            "status": 0,
            "result": {"ip": "1.2.3.4", "ad_info": {"adcode": 440300, "city": "深圳市"}}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server);
    let location = gateway.get_tx_adcode("TXKEY").await.unwrap();

    assert_eq!(location["result"]["ad_info"]["adcode"], 440300);
    assert_eq!(gateway.bridge().pending_count(), 0);
}

#[tokio::test]
async fn test_tx_weather_passes_adcode_and_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/weather/v1/"))
        .and(query_param("key", "TXKEY"))
        .and(query_param("adcode", "440300"))
        .and(query_param("type", "now"))
        .and(query_param("output", "jsonp"))
        .respond_with(JsonpResponder::new(json!({
            "status": 0,
            "result": {"realtime": [{"infos": {"weather": "晴", "temperature": 28}}]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server);
    let weather = gateway.get_tx_weather("TXKEY", "440300").await.unwrap();

    assert_eq!(weather["result"]["realtime"][0]["infos"]["weather"], "晴");
}

#[tokio::test]
async fn test_tx_load_failure_surfaces_as_jsonp_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/location/v1/ip"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server);
    let result = gateway.get_tx_adcode("TXKEY").await;

    let err = result.unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("JSONP request failed"));
    assert_eq!(gateway.bridge().pending_count(), 0);
}
