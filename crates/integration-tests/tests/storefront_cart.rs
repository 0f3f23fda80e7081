//! Cart mutations and the events they announce.

use axum::http::StatusCode;
use union_bakery_integration_tests::TestApp;

#[tokio::test]
async fn test_add_to_empty_cart_creates_cart() {
    let app = TestApp::new();
    let response = app.add_cake().await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Added to cart"));
    assert_eq!(app.backend.calls("create_cart"), 1);
    assert_eq!(app.backend.calls("add_cart_line"), 0);

    let trigger = response.hx_trigger().unwrap();
    assert!(trigger.get("cart-changed").is_some());
    // No measurements were sent, so the animation is skipped
    assert_eq!(trigger["cart:added"]["kind"], "immediate");

    let count = app.get("/cart/count").await;
    assert!(count.body.contains(">1</span>"));
}

#[tokio::test]
async fn test_second_add_reuses_cart() {
    let app = TestApp::new();
    app.add_cake().await;
    app.add_cake().await;
    assert_eq!(app.backend.calls("create_cart"), 1);
    assert_eq!(app.backend.calls("add_cart_line"), 1);

    let count = app.get("/cart/count").await;
    assert!(count.body.contains(">2</span>"));
}

#[tokio::test]
async fn test_add_with_measurements_plans_flight() {
    let app = TestApp::new();
    let response = app
        .post_form(
            "/cart/add",
            &[
                ("variant_id", "v-20cm"),
                ("start_left", "100"),
                ("start_top", "500"),
                ("start_width", "120"),
                ("start_height", "40"),
                ("anchor_left", "900"),
                ("anchor_top", "20"),
                ("anchor_width", "32"),
                ("anchor_height", "32"),
            ],
        )
        .await;
    let trigger = response.hx_trigger().unwrap();
    assert_eq!(trigger["cart:added"]["kind"], "arc");
    assert_eq!(trigger["cart:added"]["frames"].as_array().unwrap().len(), 30);
}

#[tokio::test]
async fn test_too_long_wording_is_rejected_locally() {
    let app = TestApp::new();
    let wording = "x".repeat(51);
    let response = app
        .post_form(
            "/cart/add",
            &[("variant_id", "v-20cm"), ("cake_wording", &wording)],
        )
        .await;
    assert!(response.body.contains("50 characters or fewer"));
    assert!(response.hx_trigger().is_none());
    assert_eq!(app.backend.calls("create_cart"), 0);
}

#[tokio::test]
async fn test_cart_page_shows_line_wording() {
    let app = TestApp::new();
    app.add_cake().await;
    let cart = app.get("/cart").await;
    assert_eq!(cart.status, StatusCode::OK);
    assert!(cart.body.contains("Red Velvet"));
    assert!(cart.body.contains("Happy Birthday Ana"));
    assert!(cart.body.contains("with cake wording"));
}

#[tokio::test]
async fn test_remove_last_line_empties_cart() {
    let app = TestApp::new();
    app.add_cake().await;

    let response = app.post_form("/cart/remove", &[("line_id", "line-2")]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Your cart is empty"));
    assert!(response.hx_trigger().unwrap().get("cart-changed").is_some());
}

#[tokio::test]
async fn test_update_quantity() {
    let app = TestApp::new();
    app.add_cake().await;

    let response = app
        .post_form("/cart/update", &[("line_id", "line-2"), ("quantity", "3")])
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Subtotal (3 items)"));
}
