//! The `/api` proxy without a configured backend.

use axum::http::StatusCode;
use serde_json::json;
use union_bakery_integration_tests::TestApp;

#[tokio::test]
async fn test_unknown_endpoint_is_404() {
    let app = TestApp::new();
    let response = app.post_json("/api/admin/users", json!({})).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["success"], false);
}

#[tokio::test]
async fn test_unconfigured_backend_is_500() {
    let app = TestApp::new();
    let response = app
        .post_json(
            "/api/login",
            json!({ "email": "sari@example.com", "password": "x" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json()["message"],
        "API base URL is not configured."
    );
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let app = TestApp::new();
    let response = app.post_json("/api/all-products", json!({})).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_logout_clears_auth() {
    let app = TestApp::new();
    app.log_in("sari@example.com").await;
    assert_eq!(app.get("/account").await.status, StatusCode::OK);

    let response = app.post_json("/api/logout", json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["ok"], true);
    assert_eq!(app.get("/account").await.status, StatusCode::SEE_OTHER);
}
