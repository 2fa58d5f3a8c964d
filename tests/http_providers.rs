// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Provider clients against a local HTTP server.

use std::{collections::BTreeSet, time::Duration};

use serde_json::json;
use sprint_retro::{
    DocumentClient, DocumentSettings, Error, FieldResolver, HttpRequest, RemoteDocument, ReqwestTransport,
    ResilientClient, RetryConfig, TrackerClient
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param}
};

fn client(max_attempts: u32) -> ResilientClient {
    ResilientClient::new(
        ReqwestTransport::new(Duration::from_secs(5)).expect("http client"),
        RetryConfig {
            max_attempts,
            initial_delay_ms: 5,
            backoff_factor: 2.0,
            max_delay_ms: 20
        }
    )
}

#[tokio::test]
async fn rate_limited_requests_succeed_on_third_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isLast": true, "values": []})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(4)
        .execute(HttpRequest::get(format!("{}/rest/agile/1.0/board", server.uri())))
        .await
        .expect("third attempt succeeds");
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn persistent_outage_reports_attempt_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let error = client(3)
        .execute(HttpRequest::get(format!("{}/rest/api/2/field", server.uri())))
        .await
        .expect_err("outage");
    match error {
        Error::Transport {
            attempts,
            last_status,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status, Some(503));
        }
        other => panic!("unexpected error: {other:?}")
    }
}

#[tokio::test]
async fn field_catalogue_is_fetched_once_per_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/field"))
        .and(header("Authorization", "Bearer tracker-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "customfield_10016", "name": "Story Points", "schema": {"type": "number"}},
            {"id": "customfield_10014", "name": "Epic Link", "schema": {"type": "any"}},
            {"id": "customfield_10020", "name": "Sprint", "schema": {"type": "array"}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = TrackerClient::new(&server.uri(), "tracker-token", client(1));
    let mut resolver = FieldResolver::new(Default::default());
    let names: BTreeSet<String> = ["Story Points", "Sprint"].into_iter().map(str::to_owned).collect();

    let first = resolver.resolve(&tracker, &names).await.expect("resolved");
    let second = resolver.resolve(&tracker, &names).await.expect("cached");
    assert_eq!(first.id("Story Points").expect("present"), "customfield_10016");
    assert_eq!(second.id("Sprint").expect("present"), "customfield_10020");

    let missing: BTreeSet<String> = ["Team"].into_iter().map(str::to_owned).collect();
    match resolver.resolve(&tracker, &missing).await {
        Err(Error::FieldNotFound {
            name
        }) => assert_eq!(name, "Team"),
        other => panic!("unexpected result: {other:?}")
    }
    assert_eq!(resolver.fetch_count(), 1);
}

#[tokio::test]
async fn document_update_conflict_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/wiki/rest/api/content/900"))
        .and(body_partial_json(json!({"version": {"number": 8}})))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "Version mismatch"})))
        .expect(1)
        .mount(&server)
        .await;

    let docs = DocumentClient::new(
        DocumentSettings {
            base_url:     format!("{}/wiki", server.uri()),
            space_key:    "ENG".to_owned(),
            parent_id:    None,
            labels:       Vec::new(),
            title_prefix: "Sprint Retro".to_owned()
        },
        "docs-token",
        client(2)
    );
    let page = RemoteDocument {
        id:          "900".to_owned(),
        title:       "Sprint Retro - GVRE-12".to_owned(),
        version:     7,
        attachments: Default::default()
    };
    let error = docs.update(&page, "<p/>").await.expect_err("conflict");
    assert!(matches!(error, Error::PublishConflict { version: 7, .. }));
}

#[tokio::test]
async fn missing_page_lookup_returns_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("spaceKey", "ENG"))
        .and(query_param("title", "Sprint Retro - GVRE-12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let docs = DocumentClient::new(
        DocumentSettings {
            base_url:     format!("{}/wiki", server.uri()),
            space_key:    "ENG".to_owned(),
            parent_id:    None,
            labels:       Vec::new(),
            title_prefix: "Sprint Retro".to_owned()
        },
        "docs-token",
        client(1)
    );
    assert_eq!(docs.find_by_title("Sprint Retro - GVRE-12").await.expect("lookup"), None);
}
