//! Integration tests for the platform client
//!
//! These tests use wiremock to stand in for the platform's backend and
//! check request parameters, credential headers and error classification.

use mp_archiver::api::{ApiError, MpClient, WechatApi};
use mp_archiver::config::ApiConfig;
use mp_archiver::session::Credential;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> MpClient {
    let config = ApiConfig {
        base_url: server.uri(),
        request_timeout_secs: 5,
        ..ApiConfig::default()
    };
    MpClient::new(&config).expect("client should build")
}

fn credential() -> Credential {
    Credential::from_cookie_header("tok-123", "slave_sid=s1; data_ticket=t1")
}

#[tokio::test]
async fn test_search_sends_token_and_cookies() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .and(query_param("action", "search_biz"))
        .and(query_param("query", "Daily Tech"))
        .and(query_param("token", "tok-123"))
        .and(query_param("f", "json"))
        .and(header("cookie", "data_ticket=t1; slave_sid=s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0, "err_msg": "ok"},
            "list": [
                {"fakeid": "MzA1", "nickname": "Daily Tech", "alias": "dailytech"},
                {"fakeid": "MzB2", "nickname": "Daily Tech Weekly"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let candidates = client_for(&server)
        .search_accounts(&credential(), "Daily Tech")
        .await
        .unwrap();

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].external_id, "MzA1");
    assert_eq!(candidates[0].alias, "dailytech");
    assert_eq!(candidates[1].signature, "");
}

#[tokio::test]
async fn test_list_articles_pages_by_offset() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("action", "list_ex"))
        .and(query_param("fakeid", "MzA1"))
        .and(query_param("begin", "10"))
        .and(query_param("count", "5"))
        .and(query_param("type", "9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0},
            "app_msg_list": [
                {"aid": "1", "title": "Newest", "link": "https://mp.weixin.qq.com/s/1", "update_time": 1700000300, "digest": "d1"},
                {"aid": "2", "title": "Older", "link": "https://mp.weixin.qq.com/s/2", "update_time": 1700000100}
            ],
            "app_msg_cnt": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    let articles = client_for(&server)
        .list_articles(&credential(), "MzA1", 2, 5)
        .await
        .unwrap();

    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "Newest");
    assert_eq!(articles[0].publish_time.timestamp(), 1_700_000_300);
    assert_eq!(articles[0].digest, "d1");
    assert_eq!(articles[1].url, "https://mp.weixin.qq.com/s/2");
}

#[tokio::test]
async fn test_missing_article_list_is_an_empty_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0, "err_msg": "ok"}
        })))
        .mount(&server)
        .await;

    let articles = client_for(&server)
        .list_articles(&credential(), "MzA1", 0, 5)
        .await
        .unwrap();
    assert!(articles.is_empty());
}

#[tokio::test]
async fn test_frequency_control_is_throttled() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 200013, "err_msg": "freq control"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_articles(&credential(), "MzA1", 0, 5)
        .await
        .unwrap_err();
    assert!(err.is_throttled());
}

#[tokio::test]
async fn test_http_429_is_throttled() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .search_accounts(&credential(), "x")
        .await
        .unwrap_err();
    assert!(err.is_throttled());
}

#[tokio::test]
async fn test_server_error_is_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_articles(&credential(), "MzA1", 0, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 503, .. }));
}

#[tokio::test]
async fn test_invalid_session_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 200003, "err_msg": "invalid session"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .search_accounts(&credential(), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::SessionInvalid(_)));

    assert!(!client.probe_session(&credential()).await.unwrap());
}

#[tokio::test]
async fn test_probe_accepts_valid_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .and(query_param("count", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0},
            "list": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client_for(&server).probe_session(&credential()).await.unwrap());
}

#[tokio::test]
async fn test_garbled_json_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_articles(&credential(), "MzA1", 0, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_article_body_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/s/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><div id="js_content"><p>Hello</p><p>world</p></div></body></html>"#,
        ))
        .mount(&server)
        .await;

    let body = client_for(&server)
        .get_article_body(&credential(), &format!("{}/s/abc", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "Hello\nworld");
}
