//! Integration tests: intent routes, list/report/export, clear gating, retry.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use custos_api::server::{self, AppState};
use custos_recorder::RetryQueue;
use custos_store::{
    InMemoryAlertStore, InMemoryAuditStore, InMemoryRemoteSink, InMemoryRetryStore,
};
use custos_types::{AlertStore, AuditStore, RemoteSink, RetryStore};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    sink: Arc<InMemoryRemoteSink>,
}

fn test_app() -> TestApp {
    let local: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
    let sink = Arc::new(InMemoryRemoteSink::new());
    let retry_store: Arc<dyn RetryStore> = Arc::new(InMemoryRetryStore::new());
    let alerts: Arc<dyn AlertStore> = Arc::new(InMemoryAlertStore::new());
    let retry = Arc::new(RetryQueue::new(
        retry_store,
        Arc::clone(&sink) as Arc<dyn RemoteSink>,
    ));
    let state = Arc::new(AppState {
        local,
        sink: Arc::clone(&sink) as Arc<dyn RemoteSink>,
        retry,
        alerts,
        codec: None,
    });
    TestApp {
        app: server::router(state),
        sink,
    }
}

fn post_json(uri: &str, role: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", "u-1")
        .header("x-user-email", "teacher@school.test")
        .header("x-user-role", role)
        .header("x-organization-id", "org-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(res: axum::response::Response) -> serde_json::Value {
    let body = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn data_access_then_list() {
    let t = test_app();
    let body = json!({
        "action": "create",
        "resource_type": "children",
        "resource_id": "c-1",
        "resource_name": "Sam P."
    });
    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/data-access", "educator", &body))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let j = json_body(res).await;
    assert_eq!(j["code"], 200);
    let entry_id = j["data"]["entry_id"].as_str().unwrap().to_string();

    let res = t.app.clone().oneshot(get("/audit/list")).await.unwrap();
    let j = json_body(res).await;
    let entries = j["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], entry_id);
    assert_eq!(entries[0]["action"], "DATA_CREATE");
    assert_eq!(entries[0]["risk_level"], "low");
    assert_eq!(entries[0]["compliance_flags"][0], "FERPA_EDUCATIONAL_RECORD");
    assert_eq!(entries[0]["ferpa_record_accessed"], true);
    assert_eq!(entries[0]["actor"]["user_id"], "u-1");
}

#[tokio::test]
async fn missing_identity_headers_record_as_anonymous() {
    let t = test_app();
    let body = json!({ "action": "read", "resource_type": "classrooms" });
    let req = Request::builder()
        .method("POST")
        .uri("/audit/data-access")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = t.app.clone().oneshot(get("/audit/list")).await.unwrap();
    let j = json_body(res).await;
    assert_eq!(j["data"][0]["actor"]["user_id"], "anonymous");
}

#[tokio::test]
async fn denied_phi_access_is_critical_and_alerts() {
    let t = test_app();
    let body = json!({
        "resource_type": "phi_data",
        "resource_id": "p-1",
        "phi_type": "medical",
        "access_granted": false
    });
    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/phi-access", "educator", &body))
        .await
        .unwrap();
    let j = json_body(res).await;
    let entry_id = j["data"]["entry_id"].as_str().unwrap().to_string();

    let res = t.app.clone().oneshot(get("/audit/list")).await.unwrap();
    let j = json_body(res).await;
    assert_eq!(j["data"][0]["action"], "PHI_ACCESS_DENIED");
    assert_eq!(j["data"][0]["risk_level"], "critical");
    assert_eq!(j["data"][0]["success"], false);

    let res = t.app.clone().oneshot(get("/audit/alerts")).await.unwrap();
    let j = json_body(res).await;
    let alerts = j["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["entry_id"], entry_id);
    assert_eq!(alerts[0]["severity"], "critical");
    assert_eq!(alerts[0]["status"], "open");
}

#[tokio::test]
async fn correction_links_back_to_the_original() {
    let t = test_app();
    let body = json!({ "action": "update", "resource_type": "behavior_logs", "resource_id": "b-1" });
    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/data-access", "educator", &body))
        .await
        .unwrap();
    let j = json_body(res).await;
    let original_id = j["data"]["entry_id"].as_str().unwrap().to_string();

    let correction = json!({
        "original_entry_id": original_id,
        "resource_type": "behavior_logs",
        "reason": "wrong incident date"
    });
    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/correction", "educator", &correction))
        .await
        .unwrap();
    let j = json_body(res).await;
    assert_eq!(j["code"], 200);

    let res = t.app.clone().oneshot(get("/audit/list")).await.unwrap();
    let j = json_body(res).await;
    let entries = j["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "AUDIT_CORRECTION");
    assert_eq!(entries[0]["corrects"], original_id.as_str());
    assert_eq!(entries[1]["id"], original_id.as_str());
}

#[tokio::test]
async fn report_aggregates_recorded_events() {
    let t = test_app();
    let ferpa = json!({
        "child_id": "c-2",
        "child_name": "Riley K.",
        "action": "read",
        "parent_requested": true
    });
    t.app
        .clone()
        .oneshot(post_json("/audit/ferpa-access", "educator", &ferpa))
        .await
        .unwrap();
    let auth = json!({ "action": "failed_login", "success": false });
    t.app
        .clone()
        .oneshot(post_json("/audit/auth-event", "educator", &auth))
        .await
        .unwrap();
    let export = json!({
        "export_type": "behavior_logs",
        "record_count": 12,
        "includes_phi": true,
        "includes_ferpa": false,
        "format": "csv"
    });
    t.app
        .clone()
        .oneshot(post_json("/audit/data-export", "admin", &export))
        .await
        .unwrap();

    let res = t.app.clone().oneshot(get("/audit/report")).await.unwrap();
    let j = json_body(res).await;
    assert_eq!(j["code"], 200);
    let summary = &j["data"]["summary"];
    assert_eq!(summary["total_events"], 3);
    assert_eq!(summary["ferpa_events"], 1);
    assert_eq!(summary["hipaa_events"], 1);
    // FERPA read (high), failed login, PHI export (critical).
    assert_eq!(summary["security_events"], 3);
    assert_eq!(summary["failed_access"], 1);
    assert_eq!(summary["data_exports"], 1);
}

#[tokio::test]
async fn export_formats_and_validation() {
    let t = test_app();
    let body = json!({ "action": "read", "resource_type": "children" });
    t.app
        .clone()
        .oneshot(post_json("/audit/data-access", "educator", &body))
        .await
        .unwrap();

    let res = t
        .app
        .clone()
        .oneshot(get("/audit/export?format=csv"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/csv");
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    assert!(csv.starts_with("Timestamp,User,Action"));
    assert_eq!(csv.trim_end().lines().count(), 2);

    let res = t
        .app
        .clone()
        .oneshot(get("/audit/export?format=json"))
        .await
        .unwrap();
    assert_eq!(res.headers()["content-type"], "application/json");

    let res = t
        .app
        .clone()
        .oneshot(get("/audit/export?format=xml"))
        .await
        .unwrap();
    let j = json_body(res).await;
    assert_eq!(j["code"], 400);
}

#[tokio::test]
async fn clear_requires_admin_role() {
    let t = test_app();
    let body = json!({ "action": "read", "resource_type": "children" });
    t.app
        .clone()
        .oneshot(post_json("/audit/data-access", "educator", &body))
        .await
        .unwrap();

    let clear = json!({ "reason": "test run" });
    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/clear", "educator", &clear))
        .await
        .unwrap();
    let j = json_body(res).await;
    assert_eq!(j["code"], 403);

    // Entry is still listable after the rejected clear.
    let res = t.app.clone().oneshot(get("/audit/list")).await.unwrap();
    let j = json_body(res).await;
    assert_eq!(j["data"].as_array().unwrap().len(), 1);

    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/clear", "admin", &clear))
        .await
        .unwrap();
    let j = json_body(res).await;
    assert_eq!(j["code"], 200);
    // Existing entry plus the clear's own audit record.
    assert_eq!(j["data"]["archived"], 2);

    let res = t.app.clone().oneshot(get("/audit/list")).await.unwrap();
    let j = json_body(res).await;
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn retry_endpoint_redelivers_after_sink_recovers() {
    let t = test_app();
    t.sink.set_failing(true);
    let body = json!({ "action": "read", "resource_type": "children" });
    t.app
        .clone()
        .oneshot(post_json("/audit/data-access", "educator", &body))
        .await
        .unwrap();

    // The remote leg is spawned; wait for the failed send to land in the
    // retry queue, visible as a non-empty retry pass.
    let mut queued = 0;
    for _ in 0..100 {
        let res = t
            .app
            .clone()
            .oneshot(post_json("/audit/retry", "admin", &json!({})))
            .await
            .unwrap();
        let j = json_body(res).await;
        queued = j["data"]["still_queued"].as_u64().unwrap();
        if queued == 1 {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    assert_eq!(queued, 1);

    t.sink.set_failing(false);
    let res = t
        .app
        .clone()
        .oneshot(post_json("/audit/retry", "admin", &json!({})))
        .await
        .unwrap();
    let j = json_body(res).await;
    assert_eq!(j["data"]["attempted"], 1);
    assert_eq!(j["data"]["delivered"], 1);
    assert_eq!(j["data"]["still_queued"], 0);
    assert_eq!(t.sink.delivered_count().await, 1);
}

#[tokio::test]
async fn health_reports_store_state() {
    let t = test_app();
    let res = t.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let j = json_body(res).await;
    assert_eq!(j["status"], "ok");
    assert_eq!(j["buffered_entries"], 0);
    assert_eq!(j["pending_retries"], 0);

    let body = json!({ "action": "read", "resource_type": "children" });
    t.app
        .clone()
        .oneshot(post_json("/audit/data-access", "educator", &body))
        .await
        .unwrap();
    let res = t.app.clone().oneshot(get("/health")).await.unwrap();
    let j = json_body(res).await;
    assert_eq!(j["buffered_entries"], 1);
}
