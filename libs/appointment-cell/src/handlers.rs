use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Permission, Requester, User};
use shared_models::error::AppError;

use crate::models::{AppointmentError, BookAppointmentRequest, UpdateStatusRequest};
use crate::services::BookingService;

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let requester = Requester::from_user(&user)?;
    if !requester.can(Permission::BookAppointment) {
        return Err(AppError::Forbidden(
            "This role cannot book appointments".to_string(),
        ));
    }

    let booking_service = BookingService::new(&state);
    let resolved = booking_service
        .book_appointment(&requester, request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(resolved)))
}

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Operators have no appointments of their own; they read per provider.
    let requester = Requester::from_user(&user)?;
    if !requester.can(Permission::ViewOwnAppointments) {
        return Err(AppError::Forbidden(
            "This role has no own appointment list".to_string(),
        ));
    }

    let booking_service = BookingService::new(&state);
    let appointments = booking_service
        .list_own(&requester, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn get_provider_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let requester = Requester::from_user(&user)?;

    let booking_service = BookingService::new(&state);
    let appointments = booking_service
        .list_for_provider(&requester, provider_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let requester = Requester::from_user(&user)?;

    let booking_service = BookingService::new(&state);
    let resolved = booking_service
        .get_appointment(&requester, appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(resolved)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let requester = Requester::from_user(&user)?;
    if !requester.can(Permission::UpdateAppointmentStatus) {
        return Err(AppError::Forbidden(
            "This role cannot update appointment status".to_string(),
        ));
    }

    let booking_service = BookingService::new(&state);
    let resolved = booking_service
        .update_status(
            &requester,
            appointment_id,
            request.status,
            request.notes,
            token,
        )
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(resolved)))
}

/// Patient-reachable cancellation. No permission gate; the row-level check
/// admits exactly the two parties of the appointment.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let requester = Requester::from_user(&user)?;

    let booking_service = BookingService::new(&state);
    let resolved = booking_service
        .cancel_appointment(&requester, appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(resolved)))
}

fn map_appointment_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::ProviderNotFound => AppError::NotFound("Provider not found".to_string()),
        AppointmentError::InvalidProvider => AppError::BadRequest(err.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::InvalidTransition { .. } => AppError::BadRequest(err.to_string()),
        AppointmentError::Unauthorized => {
            AppError::Forbidden("Not authorized for this appointment".to_string())
        }
        AppointmentError::SlotTaken => AppError::SlotUnavailable(err.to_string()),
        AppointmentError::QuotaExceeded => AppError::QuotaExceeded(err.to_string()),
        AppointmentError::QuotaConfiguration(msg) => AppError::Internal(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}
