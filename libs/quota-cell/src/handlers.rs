use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{Permission, Requester, User};
use shared_models::error::AppError;

use crate::models::{CheckQuotaQuery, PlanInfo, PlanTier, QuotaError, UpgradeRequest};
use crate::services::QuotaService;

#[axum::debug_handler]
pub async fn get_my_quota(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let requester = Requester::from_user(&user)?;
    if !requester.can(Permission::ViewQuota) {
        return Err(AppError::Forbidden(
            "No booking quota exists for this role".to_string(),
        ));
    }

    let quota_service = QuotaService::new(&state);
    let record = quota_service
        .get_active_record(requester.id, token)
        .await
        .map_err(map_quota_error)?;

    let plan = PlanInfo::for_tier(record.tier);
    Ok(Json(json!({
        "quota": record,
        "plan": plan,
    })))
}

#[axum::debug_handler]
pub async fn check_quota(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<CheckQuotaQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let requester = Requester::from_user(&user)?;
    let target = query.requester_id.unwrap_or(requester.id);

    // Checking someone else's quota is an operator capability.
    if target == requester.id {
        if !requester.can(Permission::ViewQuota) && !requester.can(Permission::ManageQuotas) {
            return Err(AppError::Forbidden(
                "No booking quota exists for this role".to_string(),
            ));
        }
    } else if !requester.can(Permission::ManageQuotas) {
        return Err(AppError::Forbidden(
            "Not authorized to check another requester's quota".to_string(),
        ));
    }

    let quota_service = QuotaService::new(&state);
    let check = quota_service
        .check_limit(target, token)
        .await
        .map_err(map_quota_error)?;

    Ok(Json(json!(check)))
}

#[axum::debug_handler]
pub async fn list_plans() -> Json<Value> {
    let plans: Vec<PlanInfo> = PlanTier::ALL.iter().map(|t| PlanInfo::for_tier(*t)).collect();
    Json(json!({ "plans": plans }))
}

#[axum::debug_handler]
pub async fn upgrade_plan(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpgradeRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let requester = Requester::from_user(&user)?;
    if !requester.can(Permission::UpgradePlan) {
        return Err(AppError::Forbidden(
            "This role may not change booking plans".to_string(),
        ));
    }

    let quota_service = QuotaService::new(&state);
    let record = quota_service
        .replace_active_quota(requester.id, request.tier, token)
        .await
        .map_err(map_quota_error)?;

    let plan = PlanInfo::for_tier(record.tier);
    Ok(Json(json!({
        "quota": record,
        "plan": plan,
    })))
}

fn map_quota_error(err: QuotaError) -> AppError {
    match err {
        // A requester without an active record is a provisioning fault, not a
        // client error.
        QuotaError::NoActiveRecord => AppError::Internal(err.to_string()),
        QuotaError::Exceeded => AppError::QuotaExceeded(err.to_string()),
        QuotaError::UpgradeInProgress => AppError::SlotUnavailable(err.to_string()),
        QuotaError::DatabaseError(msg) => AppError::Database(msg),
    }
}
