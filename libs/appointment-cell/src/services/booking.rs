use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use quota_cell::models::QuotaError;
use quota_cell::QuotaService;
use shared_config::AppConfig;
use shared_database::{AdvisoryLocks, SupabaseClient};
use shared_models::auth::{Requester, Role};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, PartyRef,
    ResolvedAppointment,
};
use crate::services::conflict::ConflictService;
use crate::services::directory::DirectoryService;
use crate::services::lifecycle::LifecycleService;

pub const DEFAULT_APPOINTMENT_MINUTES: i32 = 30;

/// Booking and appointment reads/updates, orchestrating the conflict,
/// quota, directory and lifecycle services.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    conflict: ConflictService,
    directory: DirectoryService,
    lifecycle: LifecycleService,
    quota: Arc<QuotaService>,
    locks: Arc<AdvisoryLocks>,
}

/// Validated booking input, handed to the detached critical section.
struct BookingAttempt {
    patient_id: Uuid,
    provider_id: Uuid,
    start_time: DateTime<Utc>,
    duration_minutes: i32,
    reason: String,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        let conflict = ConflictService::new(Arc::clone(&supabase));
        let directory = DirectoryService::new(Arc::clone(&supabase));
        let locks = Arc::new(AdvisoryLocks::new(Arc::clone(&supabase)));
        let quota = Arc::new(QuotaService::new(config));

        Self {
            conflict,
            directory,
            lifecycle: LifecycleService::new(),
            quota,
            locks,
            supabase,
        }
    }

    /// Books an appointment for the requesting patient.
    ///
    /// Cheap rejections run first (field validation, provider lookup, quota
    /// pre-check, optimistic conflict check); only a request that survives
    /// them enters the per-provider critical section, which re-checks
    /// occupancy before the insert.
    pub async fn book_appointment(
        &self,
        requester: &Requester,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<ResolvedAppointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with provider {}",
            requester.id, request.provider_id
        );

        // Step 1: field validation
        let duration_minutes = request
            .duration_minutes
            .unwrap_or(DEFAULT_APPOINTMENT_MINUTES);
        let reason = request.reason.trim().to_string();
        self.lifecycle
            .validate_booking(request.start_time, duration_minutes, &reason, Utc::now())?;

        // Step 2: the target must be an active provider
        let provider = self
            .directory
            .resolve_user(request.provider_id, auth_token)
            .await?
            .ok_or(AppointmentError::ProviderNotFound)?;
        if provider.role != Role::Provider.as_str() || !provider.is_active {
            warn!(
                "Booking rejected: user {} is not an active provider",
                request.provider_id
            );
            return Err(AppointmentError::InvalidProvider);
        }

        // Step 3: quota pre-check, so an exhausted patient never holds the lock
        let limit = self
            .quota
            .check_limit(requester.id, auth_token)
            .await
            .map_err(quota_fault)?;
        if !limit.can_book {
            info!("Booking rejected: quota exhausted for patient {}", requester.id);
            return Err(AppointmentError::QuotaExceeded);
        }

        // Step 4: optimistic conflict check outside the lock
        if self
            .conflict
            .has_conflict(
                request.provider_id,
                request.start_time,
                duration_minutes,
                auth_token,
            )
            .await?
        {
            return Err(AppointmentError::SlotTaken);
        }

        // Step 5: insert + consume inside the per-provider critical section.
        // Runs detached so a dropped request future cannot abandon the lock
        // between acquire and release.
        let attempt = BookingAttempt {
            patient_id: requester.id,
            provider_id: request.provider_id,
            start_time: request.start_time,
            duration_minutes,
            reason,
        };
        let supabase = Arc::clone(&self.supabase);
        let quota = Arc::clone(&self.quota);
        let locks = Arc::clone(&self.locks);
        let token = auth_token.to_string();

        let appointment = tokio::spawn(book_under_lock(supabase, quota, locks, attempt, token))
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Booking task failed: {}", e)))??;

        // Step 6: join party details for the response
        self.resolve_parties(appointment, auth_token).await
    }

    /// Appointments belonging to the requester. Patients read newest-first,
    /// providers read their calendar in chronological order.
    pub async fn list_own(
        &self,
        requester: &Requester,
        auth_token: &str,
    ) -> Result<Vec<ResolvedAppointment>, AppointmentError> {
        let path = match requester.role {
            Role::Patient => format!(
                "/rest/v1/appointments?patient_id=eq.{}&order=start_time.desc",
                requester.id
            ),
            Role::Provider => format!(
                "/rest/v1/appointments?provider_id=eq.{}&order=start_time.asc",
                requester.id
            ),
            Role::Operator => return Err(AppointmentError::Unauthorized),
        };

        let appointments = self.fetch_list(&path, auth_token).await?;
        self.resolve_parties_batch(appointments, auth_token).await
    }

    /// A provider's calendar, readable by that provider or an operator.
    pub async fn list_for_provider(
        &self,
        requester: &Requester,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ResolvedAppointment>, AppointmentError> {
        if requester.id != provider_id && !requester.is_operator() {
            return Err(AppointmentError::Unauthorized);
        }

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&order=start_time.asc",
            provider_id
        );
        let appointments = self.fetch_list(&path, auth_token).await?;
        self.resolve_parties_batch(appointments, auth_token).await
    }

    pub async fn get_appointment(
        &self,
        requester: &Requester,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<ResolvedAppointment, AppointmentError> {
        let appointment = self.fetch_by_id(appointment_id, auth_token).await?;

        if !self.lifecycle.can_view(requester, &appointment) {
            return Err(AppointmentError::Unauthorized);
        }

        self.resolve_parties(appointment, auth_token).await
    }

    /// Moves an appointment to `target`. Order is fixed: load, authorize,
    /// validate the graph, then write. Strangers are turned away before the
    /// graph check so the response does not depend on the row's status.
    pub async fn update_status(
        &self,
        requester: &Requester,
        appointment_id: Uuid,
        target: AppointmentStatus,
        notes: Option<String>,
        auth_token: &str,
    ) -> Result<ResolvedAppointment, AppointmentError> {
        debug!(
            "Status update requested for appointment {} -> {}",
            appointment_id, target
        );

        self.lifecycle.validate_notes(notes.as_deref())?;

        let current = self.fetch_by_id(appointment_id, auth_token).await?;
        self.lifecycle
            .authorize_transition(requester, &current, target)?;
        self.lifecycle.validate_transition(current.status, target)?;

        let mut update = serde_json::Map::new();
        update.insert("status".to_string(), json!(target.as_str()));
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(notes) = notes {
            update.insert("notes".to_string(), json!(notes));
        }

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update)),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(AppointmentError::DatabaseError(
                "Status update returned no rows".to_string(),
            ));
        };

        let updated: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Malformed appointment row: {}", e)))?;

        info!(
            "Appointment {} moved {} -> {}",
            appointment_id, current.status, target
        );
        self.resolve_parties(updated, auth_token).await
    }

    /// Cancellation is a plain transition into `cancelled`; cancelling an
    /// already-cancelled or completed appointment fails graph validation.
    pub async fn cancel_appointment(
        &self,
        requester: &Requester,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<ResolvedAppointment, AppointmentError> {
        self.update_status(
            requester,
            appointment_id,
            AppointmentStatus::Cancelled,
            None,
            auth_token,
        )
        .await
    }

    async fn fetch_by_id(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(AppointmentError::NotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Malformed appointment row: {}", e)))
    }

    async fn fetch_list(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Malformed appointment row: {}", e)))
    }

    async fn resolve_parties(
        &self,
        appointment: Appointment,
        auth_token: &str,
    ) -> Result<ResolvedAppointment, AppointmentError> {
        let mut resolved = self
            .resolve_parties_batch(vec![appointment], auth_token)
            .await?;
        resolved.pop().ok_or_else(|| {
            AppointmentError::DatabaseError("Party resolution dropped an appointment".to_string())
        })
    }

    /// One directory round-trip for the whole page. A party missing from the
    /// directory resolves to `None` rather than failing the read.
    async fn resolve_parties_batch(
        &self,
        appointments: Vec<Appointment>,
        auth_token: &str,
    ) -> Result<Vec<ResolvedAppointment>, AppointmentError> {
        let mut ids: Vec<Uuid> = appointments
            .iter()
            .flat_map(|a| [a.patient_id, a.provider_id])
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let directory = self.directory.resolve_many(&ids, auth_token).await?;

        Ok(appointments
            .into_iter()
            .map(|appointment| {
                let patient = directory
                    .get(&appointment.patient_id)
                    .cloned()
                    .map(PartyRef::from);
                let provider = directory
                    .get(&appointment.provider_id)
                    .cloned()
                    .map(PartyRef::from);
                ResolvedAppointment {
                    appointment,
                    patient,
                    provider,
                }
            })
            .collect())
    }
}

/// Critical section of a booking: serialize on the provider's lock key,
/// re-check occupancy, insert, consume quota.
async fn book_under_lock(
    supabase: Arc<SupabaseClient>,
    quota: Arc<QuotaService>,
    locks: Arc<AdvisoryLocks>,
    attempt: BookingAttempt,
    auth_token: String,
) -> Result<Appointment, AppointmentError> {
    let lock_key = format!("booking_{}", attempt.provider_id);

    let acquired = locks
        .acquire(&lock_key)
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
    if !acquired {
        warn!("Booking lock contended: {}", lock_key);
        return Err(AppointmentError::SlotTaken);
    }

    let outcome = booking_unit(&supabase, &quota, &attempt, &auth_token).await;
    locks.release_quietly(&lock_key).await;
    outcome
}

async fn booking_unit(
    supabase: &Arc<SupabaseClient>,
    quota: &QuotaService,
    attempt: &BookingAttempt,
    auth_token: &str,
) -> Result<Appointment, AppointmentError> {
    // The pre-lock conflict check may be stale; this one is authoritative.
    let conflict = ConflictService::new(Arc::clone(supabase));
    if conflict
        .has_conflict(
            attempt.provider_id,
            attempt.start_time,
            attempt.duration_minutes,
            auth_token,
        )
        .await?
    {
        return Err(AppointmentError::SlotTaken);
    }

    let now = Utc::now();
    let insert = json!({
        "patient_id": attempt.patient_id,
        "provider_id": attempt.provider_id,
        "start_time": attempt.start_time.to_rfc3339(),
        "duration_minutes": attempt.duration_minutes,
        "status": AppointmentStatus::Scheduled.as_str(),
        "reason": attempt.reason,
        "created_at": now.to_rfc3339(),
        "updated_at": now.to_rfc3339(),
    });

    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));

    let result: Vec<Value> = supabase
        .request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(insert),
            Some(headers),
        )
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    let Some(row) = result.into_iter().next() else {
        return Err(AppointmentError::DatabaseError(
            "Appointment insert returned no rows".to_string(),
        ));
    };

    let appointment: Appointment = serde_json::from_value(row)
        .map_err(|e| AppointmentError::DatabaseError(format!("Malformed appointment row: {}", e)))?;

    // The insert is the commit point. If consume fails afterwards the booking
    // must not stand; undo the row before surfacing the quota error.
    if let Err(e) = quota.consume(attempt.patient_id, auth_token).await {
        warn!(
            "Quota consume failed after insert of appointment {}; rolling back",
            appointment.id
        );
        rollback_insert(supabase, appointment.id, auth_token).await;
        return Err(quota_fault(e));
    }

    info!(
        "Appointment {} booked for patient {} with provider {}",
        appointment.id, attempt.patient_id, attempt.provider_id
    );
    Ok(appointment)
}

async fn rollback_insert(supabase: &SupabaseClient, appointment_id: Uuid, auth_token: &str) {
    let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
    if let Err(e) = supabase
        .execute(Method::DELETE, &path, Some(auth_token), None)
        .await
    {
        error!(
            "Failed to roll back appointment {} after quota failure: {}",
            appointment_id, e
        );
    }
}

fn quota_fault(error: QuotaError) -> AppointmentError {
    match error {
        QuotaError::Exceeded => AppointmentError::QuotaExceeded,
        QuotaError::NoActiveRecord => AppointmentError::QuotaConfiguration(
            "No active quota record for requester".to_string(),
        ),
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}
