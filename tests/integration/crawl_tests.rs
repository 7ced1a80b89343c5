//! End-to-end tests for batch crawling
//!
//! A wiremock server plays the platform. Walks run through the real HTTP
//! client, gate and SQLite storage, so these tests use real time with a
//! short gate interval.

use mp_archiver::api::MpClient;
use mp_archiver::config::Config;
use mp_archiver::output::export_articles_csv;
use mp_archiver::crawler::{shared_storage, BatchCoordinator, SharedStorage};
use mp_archiver::session::{CredentialStore, SessionManager, StaticLogin};
use mp_archiver::state::{Outcome, StopReason};
use mp_archiver::storage::{ArticleQuery, RunStatus, SqliteStorage, Storage, PLATFORM_WECHAT};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.request_timeout_secs = 5;
    config.gate.min_interval_ms = 10;
    config.gate.max_interval_ms = 100;
    config.gate.max_throttle_retries = 2;
    config.crawl.days = 0;
    config.crawl.max_pages = 5;
    config.crawl.page_size = 5;
    config.crawl.include_content = true;
    config
}

async fn mount_search(server: &MockServer, name: &str, fakeid: Option<&str>, times: u64) {
    let list = match fakeid {
        Some(id) => json!([{"fakeid": id, "nickname": name}]),
        None => json!([]),
    };
    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .and(query_param("query", name))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0},
            "list": list
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts a working account "Alpha" with two articles on its only page
async fn mount_alpha(server: &MockServer, runs: u64) {
    let uri = server.uri();
    mount_search(server, "Alpha", Some("fa"), 1).await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("fakeid", "fa"))
        .and(query_param("begin", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0},
            "app_msg_list": [
                {"aid": "1", "title": "First", "link": format!("{}/s/a1", uri), "update_time": 1700003600},
                {"aid": "2", "title": "Second", "link": format!("{}/s/a2", uri), "update_time": 1700000000}
            ]
        })))
        .expect(runs)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("fakeid", "fa"))
        .and(query_param("begin", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 0},
            "app_msg_list": []
        })))
        .expect(runs)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/s/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><div id="js_content"><p>Body of the first article</p></div></html>"#,
        ))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/s/a2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(server)
        .await;
}

/// Mounts an account "Beta" whose history endpoint always fails
async fn mount_beta(server: &MockServer) {
    mount_search(server, "Beta", Some("fb"), 1).await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/appmsg"))
        .and(query_param("fakeid", "fb"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

fn coordinator(server: &MockServer, storage: SharedStorage, credential_dir: &TempDir) -> BatchCoordinator {
    let config = test_config(server);
    let store = CredentialStore::new(credential_dir.path().join("session.json"), config.session.ttl());
    let credential = store
        .save(&mp_archiver::session::Credential::from_cookie_header("tok", "slave_sid=s1"))
        .and_then(|_| store.load_valid())
        .unwrap();

    let api = Arc::new(MpClient::new(&config.api).unwrap());
    BatchCoordinator::new(api, storage, credential, &config)
}

fn accounts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_batch_isolates_failing_accounts() {
    let server = MockServer::start().await;
    mount_alpha(&server, 1).await;
    mount_beta(&server).await;
    mount_search(&server, "Gamma", None, 1).await;

    let dir = TempDir::new().unwrap();
    let storage = shared_storage(SqliteStorage::new(&dir.path().join("archive.db")).unwrap());
    let coordinator = coordinator(&server, storage.clone(), &dir);

    let progress = coordinator
        .run(&accounts(&["Alpha", "Beta", "Gamma"]), 2)
        .await
        .unwrap();

    assert!(progress.is_complete());
    assert_eq!(progress.accounts_with(Outcome::Success), vec!["Alpha"]);
    assert_eq!(progress.accounts_with(Outcome::Aborted), vec!["Beta", "Gamma"]);

    let alpha = &progress.per_account_status["Alpha"].report;
    assert_eq!(alpha.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(alpha.pages_fetched, 2);
    assert_eq!(alpha.articles_stored, 2);
    assert_eq!(alpha.content_failures.len(), 1);
    assert!(alpha.content_failures[0].url.ends_with("/s/a2"));

    let beta = progress.per_account_status["Beta"].error_message().unwrap();
    assert!(beta.contains("page 0"), "{}", beta);
    let gamma = progress.per_account_status["Gamma"].error_message().unwrap();
    assert!(gamma.contains("Gamma"), "{}", gamma);

    let guard = storage.lock().unwrap();
    let account = guard.get_account(PLATFORM_WECHAT, "Alpha").unwrap().unwrap();
    assert_eq!(account.external_id, "fa");

    let articles = guard
        .query_articles(&ArticleQuery {
            account_id: Some(account.id),
            ..ArticleQuery::default()
        })
        .unwrap();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "First");
    assert_eq!(articles[0].content.as_deref(), Some("Body of the first article"));
    assert_eq!(articles[1].content, None);
    assert_eq!(articles[1].details["partial"], json!(true));

    let run = guard.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(guard.get_run_outcomes(run.id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_second_batch_skips_stored_articles() {
    let server = MockServer::start().await;
    // Search and bodies are expected once; both pages are listed twice
    mount_alpha(&server, 2).await;

    let dir = TempDir::new().unwrap();
    let storage = shared_storage(SqliteStorage::new(&dir.path().join("archive.db")).unwrap());
    let coordinator = coordinator(&server, storage.clone(), &dir);
    let names = accounts(&["Alpha"]);

    let first = coordinator.run(&names, 1).await.unwrap();
    assert_eq!(first.total_articles_stored(), 2);

    let second = coordinator.run(&names, 1).await.unwrap();
    let report = &second.per_account_status["Alpha"].report;
    assert!(report.is_success());
    assert_eq!(report.articles_stored, 0);
    assert_eq!(report.articles_skipped, 2);
    assert!(report.content_failures.is_empty());

    let guard = storage.lock().unwrap();
    assert_eq!(guard.count_articles(None).unwrap(), 2);
    assert!(guard.load_checkpoint(PLATFORM_WECHAT, "Alpha").unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_session_interrupts_batch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/searchbiz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base_resp": {"ret": 200003, "err_msg": "invalid session"}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = shared_storage(SqliteStorage::new_in_memory().unwrap());
    let coordinator = coordinator(&server, storage.clone(), &dir);

    let progress = coordinator
        .run(&accounts(&["Alpha", "Beta", "Gamma"]), 1)
        .await
        .unwrap();

    assert!(progress.is_complete());
    assert!(progress.accounts_with(Outcome::Success).is_empty());
    let first = progress.per_account_status["Alpha"].error_message().unwrap();
    assert!(first.contains("Session expired"), "{}", first);

    let guard = storage.lock().unwrap();
    let run = guard.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_session_manager_feeds_the_batch() {
    let server = MockServer::start().await;
    mount_alpha(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server);
    let store = CredentialStore::new(dir.path().join("session.json"), config.session.ttl());
    let manager = SessionManager::new(store, StaticLogin::new("tok", "slave_sid=s1; data_ticket=t1"));

    let credential = manager.ensure_session().await.unwrap();
    assert!(manager.store().path().exists());

    let storage = shared_storage(SqliteStorage::new_in_memory().unwrap());
    let api = Arc::new(MpClient::new(&config.api).unwrap());
    let coordinator = BatchCoordinator::new(api, storage, credential, &config);

    let progress = coordinator.run(&accounts(&["Alpha"]), 1).await.unwrap();
    assert_eq!(progress.total_articles_stored(), 2);
}

#[tokio::test]
async fn test_crawled_articles_export_to_csv() {
    let server = MockServer::start().await;
    mount_alpha(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("archive.db");
    let storage = shared_storage(SqliteStorage::new(&db_path).unwrap());
    let coordinator = coordinator(&server, storage, &dir);
    coordinator.run(&accounts(&["Alpha"]), 1).await.unwrap();

    // A second connection sees what the batch wrote
    let reader = SqliteStorage::new(&db_path).unwrap();
    let articles = reader.query_articles(&ArticleQuery::default()).unwrap();
    let names: HashMap<i64, String> = reader
        .list_accounts(None)
        .unwrap()
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let csv_path = dir.path().join("out").join("alpha.csv");
    assert_eq!(export_articles_csv(&csv_path, &articles, &names).unwrap(), 2);

    let text = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "account,title,publish_time,url,summary,content");
    assert!(lines[1].starts_with("Alpha,First,2023-11-14 23:13:20,"));
    assert!(lines[1].ends_with(",Body of the first article"));
    assert!(lines[2].starts_with("Alpha,Second,2023-11-14 22:13:20,"));
}
