//! Login, account access and logout through the storefront router.

use axum::http::StatusCode;
use union_bakery_integration_tests::{PASSWORD, TestApp};

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();
    let live = app.get("/health").await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, "ok");

    // No pool attached in tests
    assert_eq!(app.get("/health/ready").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_account_requires_login() {
    let app = TestApp::new();
    let response = app.get("/account").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/auth/login?ref=%2Faccount"));
}

#[tokio::test]
async fn test_login_then_profile() {
    let app = TestApp::new();

    let login = app.log_in("sari@example.com").await;
    assert_eq!(login.status, StatusCode::SEE_OTHER);
    assert_eq!(login.location(), Some("/home"));

    let account = app.get("/account").await;
    assert_eq!(account.status, StatusCode::OK);
    assert!(account.body.contains("Sari Wijaya"));
    assert!(account.body.contains("sari@example.com"));
    assert_eq!(app.backend.calls("customer"), 1);
}

#[tokio::test]
async fn test_bad_password_rerenders_with_message() {
    let app = TestApp::new();
    let response = app
        .post_form(
            "/auth/login",
            &[("email", "sari@example.com"), ("password", "wrong")],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Invalid email or password"));
    assert!(response.body.contains("sari@example.com"));
}

#[tokio::test]
async fn test_invalid_email_never_reaches_backend() {
    let app = TestApp::new();
    let response = app
        .post_form(
            "/auth/login",
            &[("email", "not-an-email"), ("password", PASSWORD)],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.backend.calls("login"), 0);
}

#[tokio::test]
async fn test_login_ignores_offsite_return_path() {
    let app = TestApp::new();
    let response = app
        .post_form(
            "/auth/login",
            &[
                ("email", "sari@example.com"),
                ("password", PASSWORD),
                ("ref", "https://evil.example/steal"),
            ],
        )
        .await;
    assert_eq!(response.location(), Some("/home"));
}

#[tokio::test]
async fn test_register_without_token_sends_to_login() {
    let app = TestApp::new();
    let response = app
        .post_form(
            "/auth/register",
            &[
                ("firstName", "Sari"),
                ("lastName", "Wijaya"),
                ("email", "sari@example.com"),
                ("password", PASSWORD),
                ("ref", "/cart"),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(
        response.location(),
        Some("/auth/login?registered=1&ref=%2Fcart")
    );

    let login = app.get("/auth/login?registered=1&ref=%2Fcart").await;
    assert!(login.body.contains("Account created"));
}

#[tokio::test]
async fn test_logout_forgets_token() {
    let app = TestApp::new();
    app.log_in("sari@example.com").await;
    assert_eq!(app.get("/account").await.status, StatusCode::OK);

    let logout = app.post_form("/auth/logout", &[]).await;
    assert_eq!(logout.location(), Some("/home"));
    assert_eq!(app.get("/account").await.status, StatusCode::SEE_OTHER);
}
