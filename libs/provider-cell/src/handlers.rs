use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Permission, Requester, User};
use shared_models::error::AppError;

use crate::models::{ProviderError, SetAvailabilityRequest, SlotQuery};
use crate::services::{AvailabilityService, SlotService};

#[axum::debug_handler]
pub async fn get_provider_availability(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let availability_service = AvailabilityService::new(&state);
    let windows = availability_service
        .get_availability(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "windows": windows,
    })))
}

#[axum::debug_handler]
pub async fn set_provider_availability(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Providers manage their own schedule; operators may manage any.
    let requester = Requester::from_user(&user)?;
    let owns_schedule =
        requester.can(Permission::ManageAvailability) && requester.id == provider_id;
    if !owns_schedule && !requester.is_operator() {
        return Err(AppError::Forbidden(
            "Not authorized to manage this provider's availability".to_string(),
        ));
    }

    let availability_service = AvailabilityService::new(&state);
    let windows = availability_service
        .set_availability(provider_id, request.windows, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "windows": windows,
    })))
}

#[axum::debug_handler]
pub async fn get_provider_slots(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let slot_service = SlotService::new(&state);
    let slots = slot_service
        .generate_slots(provider_id, query.date, query.granularity, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "date": query.date,
        "slots": slots,
    })))
}

fn map_provider_error(err: ProviderError) -> AppError {
    match err {
        ProviderError::ProfileNotFound => {
            AppError::NotFound("Provider profile not found".to_string())
        }
        ProviderError::InvalidWindow(_) | ProviderError::InvalidGranularity(_) => {
            AppError::ValidationError(err.to_string())
        }
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}
