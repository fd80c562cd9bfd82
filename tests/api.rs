use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::Utc;
use points_ledger::store::{FailPoint, MemoryStore};
use points_ledger::types::{AccountOpening, AccountStatus, UserRecord};
use points_ledger::{AppState, Ledger, TracingNotifier, init_router};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn setup() -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new());
    store
        .seed_user(UserRecord {
            id: 10,
            name: "Ada".into(),
            referral_code: None,
            points: 500,
            actions_completed: 2,
            referral_count: 0,
        })
        .await;
    store
        .seed_user(UserRecord {
            id: 20,
            name: "Grace".into(),
            referral_code: Some("REF1".into()),
            points: 0,
            actions_completed: 0,
            referral_count: 0,
        })
        .await;
    let now = Utc::now();
    store
        .seed_account(AccountOpening {
            id: 1,
            name: "Ada".into(),
            account_type: "fixed-deposit".into(),
            status: AccountStatus::Pending,
            points: 0,
            user_id: Some(10),
            referral_code: Some("REF1".into()),
            created_at: now,
            updated_at: now,
        })
        .await;

    let ledger = Ledger::new(store.clone(), Arc::new(TracingNotifier));
    let app = init_router(AppState {
        ledger: Arc::new(ledger),
    });
    (store, app)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn health_is_ok() {
    let (_, app) = setup().await;
    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn toggle_approves_and_reports_balances() {
    let (_, app) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/accounts/1/toggle",
        Some(json!({ "expected_status": "Pending" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "account status toggled");
    assert_eq!(body["data"]["account"]["status"], "Approved");
    assert_eq!(body["data"]["points_change"], 200);
    assert_eq!(body["data"]["owner"]["points"], 700);
    assert_eq!(body["data"]["referrer"]["points"], 50);
    assert!(body["meta"]["request_id"].is_string());

    let (status, body) = send(&app, "GET", "/users/20", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["points"], 50);
    assert_eq!(body["data"]["referral_count"], 1);
}

#[tokio::test]
async fn stale_toggle_is_a_conflict() {
    let (_, app) = setup().await;
    let expected = json!({ "expected_status": "Pending" });

    send(&app, "POST", "/accounts/1/toggle", Some(expected.clone())).await;
    let (status, body) = send(&app, "POST", "/accounts/1/toggle", Some(expected)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATUS_CONFLICT");

    let (_, body) = send(&app, "GET", "/users/10", None).await;
    assert_eq!(body["data"]["points"], 700);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let (_, app) = setup().await;

    let (status, body) = send(&app, "DELETE", "/accounts/42", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ACCOUNT_NOT_FOUND");
    assert_eq!(body["error"], "Customer not found.");
}

#[tokio::test]
async fn delete_reverses_approval() {
    let (store, app) = setup().await;
    send(
        &app,
        "POST",
        "/accounts/1/toggle",
        Some(json!({ "expected_status": "Pending" })),
    )
    .await;

    let (status, body) = send(&app, "DELETE", "/accounts/1", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["owner"]["points"], 500);
    assert_eq!(body["data"]["referrer"]["points"], 0);
    assert!(store.account(1).await.is_none());

    let (_, body) = send(&app, "GET", "/users/10/activities", None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn store_failure_is_internal_error() {
    let (store, app) = setup().await;
    store.set_fail_on(Some(FailPoint::UpdateUser)).await;

    let (status, body) = send(
        &app,
        "POST",
        "/accounts/1/toggle",
        Some(json!({ "expected_status": "Pending" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DB_FAILURE");
    assert_eq!(body["error"], "internal server error");
}

#[tokio::test]
async fn open_and_list_accounts() {
    let (_, app) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/accounts",
        Some(json!({
            "name": "Linus",
            "account_type": "savings",
            "user_id": 10,
            "referral_code": null
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "Pending");

    let (status, body) = send(&app, "GET", "/accounts?page=1&per_page=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn open_account_for_unknown_user_is_not_found() {
    let (_, app) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/accounts",
        Some(json!({ "name": "Linus", "account_type": "savings", "user_id": 404 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "USER_NOT_FOUND");
}
