use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

fn create_test_app(config: AppConfig) -> Router {
    appointment_routes(Arc::new(config))
}

#[tokio::test]
async fn every_route_requires_authentication() {
    let config = TestConfig::default().to_app_config();
    let id = Uuid::new_v4();

    let protected_endpoints = vec![
        ("POST", "/".to_string()),
        ("GET", "/my".to_string()),
        ("GET", format!("/provider/{}", id)),
        ("GET", format!("/{}", id)),
        ("PATCH", format!("/{}/status", id)),
        ("PATCH", format!("/{}/cancel", id)),
    ];

    for (method, uri) in protected_endpoints {
        let app = create_test_app(config.clone());

        let request = Request::builder()
            .method(method)
            .uri(&uri)
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
async fn garbage_tokens_are_rejected() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config);

    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .header("authorization", "Bearer invalid.token.here")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config.clone());

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_expired_token(&patient, &config.supabase_jwt_secret);

    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_invalid_signature_token(&patient);

    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patient_lists_appointments_through_the_full_stack() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::appointment_row(
                &patient.id,
                &provider_id.to_string(),
                "2027-06-01T09:00:00Z",
                30,
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let mut ids = [Uuid::parse_str(&patient.id).unwrap(), provider_id];
    ids.sort_unstable();
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("in.({},{})", ids[0], ids[1])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::user_row(&patient.id, "patient", true),
            MockStoreResponses::user_row(&provider_id.to_string(), "provider", true),
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config);
    let request = Request::builder()
        .method("GET")
        .uri("/my")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json_response["appointments"].as_array().unwrap().len(), 1);
    assert_eq!(
        json_response["appointments"][0]["appointment"]["status"],
        "scheduled"
    );
    assert_eq!(
        json_response["appointments"][0]["provider"]["id"],
        provider_id.to_string()
    );
}

#[tokio::test]
async fn providers_cannot_book_through_the_booking_route() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config.clone());

    let provider = TestUser::provider("provider@example.com");
    let token = JwtTestUtils::create_test_token(&provider, &config.supabase_jwt_secret, Some(24));

    let body = json!({
        "provider_id": Uuid::new_v4(),
        "start_time": "2027-06-01T09:00:00Z",
        "reason": "Persistent lower back pain",
    });

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
