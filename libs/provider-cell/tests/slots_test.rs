use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_cell::handlers::get_provider_slots;
use provider_cell::models::SlotQuery;
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

fn config_for(mock_server: &MockServer) -> Arc<AppConfig> {
    Arc::new(TestConfig::with_store_url(&mock_server.uri()).to_app_config())
}

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

// 2025-06-02 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

async fn mount_profile(mock_server: &MockServer, provider_id: &Uuid, availability: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::provider_profile_row(&provider_id.to_string(), availability)
        ])))
        .mount(mock_server)
        .await;
}

async fn mount_appointments(mock_server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

async fn fetch_slots(
    config: Arc<AppConfig>,
    provider_id: Uuid,
    date: NaiveDate,
    granularity: Option<i32>,
    token: &str,
) -> Result<Value, AppError> {
    get_provider_slots(
        State(config),
        Path(provider_id),
        Query(SlotQuery { date, granularity }),
        auth_header(token),
    )
    .await
    .map(|json| json.0)
}

fn slot_starts(response: &Value) -> Vec<String> {
    response["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["start_time"].as_str().unwrap().to_string())
        .collect()
}

fn slot_availability(response: &Value) -> Vec<(String, bool)> {
    response["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["start_time"].as_str().unwrap().to_string(),
                s["available"].as_bool().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn free_day_yields_every_step_at_default_granularity() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([MockStoreResponses::availability_window("monday", "10:00", "12:00", true)]),
    )
    .await;
    mount_appointments(&mock_server, json!([])).await;

    let response = fetch_slots(config, provider_id, monday(), None, &token)
        .await
        .expect("slot listing should succeed");

    assert_eq!(slot_starts(&response), vec!["10:00", "10:30", "11:00", "11:30"]);
    let slots = response["slots"].as_array().unwrap();
    assert!(slots.iter().all(|s| s["available"] == true));
    assert!(slots.iter().all(|s| s["duration_minutes"] == 30));
}

#[tokio::test]
async fn booked_start_blocks_the_surrounding_conflict_window() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([MockStoreResponses::availability_window("monday", "10:00", "12:00", true)]),
    )
    .await;
    // Existing appointment at 10:30 blocks every candidate within 30 minutes
    // of its start, on both sides.
    mount_appointments(
        &mock_server,
        json!([{ "start_time": "2025-06-02T10:30:00Z" }]),
    )
    .await;

    let response = fetch_slots(config, provider_id, monday(), None, &token)
        .await
        .expect("slot listing should succeed");

    assert_eq!(
        slot_availability(&response),
        vec![
            ("10:00".to_string(), false),
            ("10:30".to_string(), false),
            ("11:00".to_string(), true),
            ("11:30".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn weekday_without_windows_yields_empty_list() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([MockStoreResponses::availability_window("tuesday", "10:00", "12:00", true)]),
    )
    .await;

    let response = fetch_slots(config, provider_id, monday(), None, &token)
        .await
        .expect("slot listing should succeed");

    assert!(response["slots"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_windows_are_skipped() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([MockStoreResponses::availability_window("monday", "10:00", "12:00", false)]),
    )
    .await;

    let response = fetch_slots(config, provider_id, monday(), None, &token)
        .await
        .expect("slot listing should succeed");

    assert!(response["slots"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_appointments_are_filtered_out_of_occupancy() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([MockStoreResponses::availability_window("monday", "10:00", "11:00", true)]),
    )
    .await;
    // The occupancy fetch must carry status=neq.cancelled; the mock only
    // matches when it does.
    mount_appointments(&mock_server, json!([])).await;

    let response = fetch_slots(config, provider_id, monday(), None, &token)
        .await
        .expect("slot listing should succeed");

    let slots = response["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert!(slots.iter().all(|s| s["available"] == true));
}

#[tokio::test]
async fn custom_granularity_steps_until_window_end_exclusive() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([MockStoreResponses::availability_window("monday", "10:00", "12:00", true)]),
    )
    .await;
    mount_appointments(&mock_server, json!([])).await;

    let response = fetch_slots(config, provider_id, monday(), Some(45), &token)
        .await
        .expect("slot listing should succeed");

    // Starts are enumerated strictly below 12:00; the 11:30 slot may run past
    // the window end.
    assert_eq!(slot_starts(&response), vec!["10:00", "10:45", "11:30"]);
    let slots = response["slots"].as_array().unwrap();
    assert!(slots.iter().all(|s| s["duration_minutes"] == 45));
}

#[tokio::test]
async fn multiple_windows_expand_in_order() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));
    let provider_id = Uuid::new_v4();

    mount_profile(
        &mock_server,
        &provider_id,
        json!([
            MockStoreResponses::availability_window("monday", "10:00", "11:00", true),
            MockStoreResponses::availability_window("monday", "14:00", "15:00", true),
            MockStoreResponses::availability_window("wednesday", "09:00", "17:00", true),
        ]),
    )
    .await;
    mount_appointments(&mock_server, json!([])).await;

    let response = fetch_slots(config, provider_id, monday(), None, &token)
        .await
        .expect("slot listing should succeed");

    assert_eq!(
        slot_starts(&response),
        vec!["10:00", "10:30", "14:00", "14:30"]
    );
}

#[tokio::test]
async fn out_of_range_granularity_is_rejected() {
    let config = Arc::new(TestConfig::default().to_app_config());

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.supabase_jwt_secret, Some(24));

    for bad in [0, -30, 241] {
        let result = fetch_slots(config.clone(), Uuid::new_v4(), monday(), Some(bad), &token).await;
        match result.unwrap_err() {
            AppError::ValidationError(msg) => assert!(msg.contains("granularity")),
            other => panic!("Expected ValidationError for {}, got {:?}", bad, other),
        }
    }
}
