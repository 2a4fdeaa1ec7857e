mod common;

use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

use common::{app_with, get_json, memory_store, store_with, FailingBackend, ManualClock};

#[tokio::test]
async fn tcp_check_returns_id_nodes_and_results() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, &format!("/check-tcp?host=127.0.0.1:{}", port)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], 1);

    let request_id = body["request_id"].as_str().unwrap();
    assert_eq!(request_id.len(), 12);
    assert_eq!(
        body["permanent_link"],
        format!("http://netcheck.test/check-report/{}", request_id)
    );

    let nodes = body["nodes"].as_object().unwrap();
    let results = body["results"].as_object().unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(
        nodes.keys().collect::<Vec<_>>(),
        results.keys().collect::<Vec<_>>()
    );
    assert_eq!(
        body["nodes"]["us1.node.test"],
        json!(["us", "USA", "Los Angeles", "5.253.30.82", "AS18978"])
    );
    for outcomes in results.values() {
        assert_eq!(outcomes[0]["type"], "tcp");
        assert_eq!(outcomes[0]["address"], "127.0.0.1");
    }

    // The stored copy matches what was returned
    let (status, stored) = get_json(&app, &format!("/check-result/{}", request_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored, body["results"]);

    let (status, extended) =
        get_json(&app, &format!("/check-result-extended/{}", request_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(extended["command"], "tcp");
    assert_eq!(extended["host"], format!("127.0.0.1:{}", port));
    assert_eq!(extended["results"], body["results"]);
    assert!(extended["created"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn node_selection_limits_fan_out() {
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, "/check-ping?host=127.0.0.1&node=us1,de1").await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<_> = body["results"].as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["de1.node.test", "us1.node.test"]);
    assert_eq!(body["results"]["us1.node.test"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"]["us1.node.test"][0]["status"], "OK");

    let (status, body) = get_json(&app, "/check-ping?host=127.0.0.1&max_nodes=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn dns_check_of_a_only_name_has_empty_aaaa() {
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, "/check-dns?host=a-only.test&node=de1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"]["de1.node.test"],
        json!([{"type": "dns_forward", "a": ["192.0.2.1"], "aaaa": [], "ttl": 300}])
    );
}

#[tokio::test]
async fn dns_check_of_nonexistent_name_is_a_resolution_failure() {
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, "/check-dns?host=does-not-exist.test&node=de1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"]["de1.node.test"],
        json!([{
            "type": "error",
            "error": "resolution_failure",
            "message": "domain does-not-exist.test does not exist"
        }])
    );
}

#[tokio::test]
async fn unresolvable_target_is_an_outcome_not_an_error() {
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, "/check-tcp?host=nothing-here.invalid:80&node=us1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"]["us1.node.test"],
        json!([{
            "type": "error",
            "error": "resolution_failure",
            "message": "Unable to resolve hostname"
        }])
    );
}

#[tokio::test]
async fn missing_host_is_rejected() {
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, "/check-http").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 400);

    let (status, _) = get_json(&app, "/check-http?host=%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_nodes_are_rejected() {
    let app = app_with(memory_store());
    let (status, _) = get_json(&app, "/check-ping?host=127.0.0.1&node=zz9").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_expired_results_are_not_found() {
    let clock = ManualClock::new();
    let app = app_with(store_with(
        Arc::new(netcheck::store::MemoryBackend::new()),
        clock.clone(),
    ));

    let (status, _) = get_json(&app, "/check-result/000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get_json(&app, "/check-ping?host=127.0.0.1&node=us1").await;
    let request_id = body["request_id"].as_str().unwrap().to_string();

    clock.advance(chrono::Duration::hours(25));
    let (status, _) = get_json(&app, &format!("/check-result/{}", request_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_json(&app, &format!("/check-result-extended/{}", request_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn storage_failure_surfaces_as_server_error() {
    let app = app_with(store_with(Arc::new(FailingBackend), ManualClock::new()));

    let (status, body) = get_json(&app, "/check-ping?host=127.0.0.1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("backend unavailable"));

    let (status, _) = get_json(&app, "/check-result/000000000000").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn node_listing_and_health() {
    let app = app_with(memory_store());

    let (status, body) = get_json(&app, "/nodes/hosts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["nodes"]["de1.node.test"],
        json!({"ip": "46.4.143.48", "asn": "AS24940", "location": ["de", "Germany", "Frankfurt"]})
    );

    let (_, ips) = get_json(&app, "/nodes/ips").await;
    assert_eq!(ips, body);

    let (status, health) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health, json!({"status": "healthy"}));
}
