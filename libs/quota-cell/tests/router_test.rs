use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use quota_cell::router::quota_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn create_test_app(config: AppConfig) -> Router {
    quota_routes(Arc::new(config))
}

#[tokio::test]
async fn every_route_requires_authentication() {
    let config = TestConfig::default().to_app_config();

    let protected_endpoints = vec![
        ("GET", "/me"),
        ("GET", "/check"),
        ("GET", "/plans"),
        ("POST", "/upgrade"),
    ];

    for (method, uri) in protected_endpoints {
        let app = create_test_app(config.clone());

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "Failed for {} {}",
            method,
            uri
        );
    }
}

#[tokio::test]
async fn plan_catalog_reads_through_the_full_stack() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config.clone());

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));

    let request = Request::builder()
        .method("GET")
        .uri("/plans")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let plans = json_response["plans"].as_array().unwrap();
    assert_eq!(plans.len(), 3);
    assert!(plans.iter().any(|p| p["tier"] == "premium"));
}
