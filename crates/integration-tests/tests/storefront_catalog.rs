//! Product listing, product pages and the product list cache.

use axum::http::StatusCode;
use union_bakery_integration_tests::TestApp;

#[tokio::test]
async fn test_shop_lists_products_with_badges() {
    let app = TestApp::new();
    let response = app.get("/shop/all").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Red Velvet"));
    assert!(response.body.contains("/product/red-velvet"));
    assert!(response.body.contains("Lemon Drizzle"));
    assert!(response.body.contains("Best Seller"));
}

#[tokio::test]
async fn test_product_list_is_cached() {
    let app = TestApp::new();
    app.get("/shop/all").await;
    app.get("/shop/all").await;
    app.get("/home").await;
    assert_eq!(app.backend.calls("all_products"), 1);
}

#[tokio::test]
async fn test_product_page_shows_variant_and_limits() {
    let app = TestApp::new();
    let response = app.get("/product/red-velvet").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Buttermilk sponge"));
    assert!(response.body.contains("v-20cm"));
    assert!(response.body.contains("IDR 350"));
    assert!(response.body.contains("maxlength=\"50\""));
}

#[tokio::test]
async fn test_unknown_product_is_404() {
    let app = TestApp::new();
    let response = app.get("/product/no-such-cake").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.contains("find that cake"));
}
