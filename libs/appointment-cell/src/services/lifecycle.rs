use chrono::{DateTime, Utc};
use shared_models::auth::Requester;
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

pub const MIN_APPOINTMENT_MINUTES: i32 = 15;
pub const MAX_APPOINTMENT_MINUTES: i32 = 120;

pub const MIN_REASON_CHARS: usize = 5;
pub const MAX_REASON_CHARS: usize = 500;
pub const MAX_NOTES_CHARS: usize = 1000;

/// Status graph and per-transition authorization. Stateless; the booking
/// service owns all store access and calls in here before every write.
pub struct LifecycleService;

impl LifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Statuses reachable from `current` in a single step. `no_show` is a
    /// seeded terminal: rows carry it from imports, but no transition
    /// produces it.
    pub fn valid_transitions(&self, current: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current {
            AppointmentStatus::Scheduled => {
                &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled]
            }
            AppointmentStatus::Confirmed => {
                &[AppointmentStatus::Completed, AppointmentStatus::Cancelled]
            }
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn validate_transition(
        &self,
        current: AppointmentStatus,
        target: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, target);

        if !self.valid_transitions(current).contains(&target) {
            warn!("Rejected status transition {} -> {}", current, target);
            return Err(AppointmentError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        Ok(())
    }

    /// Who may move this appointment into `target`. Cancellation belongs to
    /// the two parties only; every other target belongs to the owning
    /// provider or an operator. Checked before graph validation so strangers
    /// get the same answer regardless of the row's current status.
    pub fn authorize_transition(
        &self,
        requester: &Requester,
        appointment: &Appointment,
        target: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        let allowed = match target {
            AppointmentStatus::Cancelled => {
                requester.id == appointment.patient_id || requester.id == appointment.provider_id
            }
            _ => requester.id == appointment.provider_id || requester.is_operator(),
        };

        if !allowed {
            warn!(
                "Requester {} denied transition of appointment {} to {}",
                requester.id, appointment.id, target
            );
            return Err(AppointmentError::Unauthorized);
        }

        Ok(())
    }

    pub fn can_view(&self, requester: &Requester, appointment: &Appointment) -> bool {
        requester.id == appointment.patient_id
            || requester.id == appointment.provider_id
            || requester.is_operator()
    }

    /// Field checks for a booking request. `reason` must already be trimmed.
    pub fn validate_booking(
        &self,
        start_time: DateTime<Utc>,
        duration_minutes: i32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&duration_minutes) {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment duration must be between {} and {} minutes",
                MIN_APPOINTMENT_MINUTES, MAX_APPOINTMENT_MINUTES
            )));
        }

        let reason_chars = reason.chars().count();
        if reason_chars < MIN_REASON_CHARS || reason_chars > MAX_REASON_CHARS {
            return Err(AppointmentError::ValidationError(format!(
                "Reason must be between {} and {} characters",
                MIN_REASON_CHARS, MAX_REASON_CHARS
            )));
        }

        if start_time <= now {
            return Err(AppointmentError::ValidationError(
                "Appointment start time must be in the future".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_notes(&self, notes: Option<&str>) -> Result<(), AppointmentError> {
        if let Some(notes) = notes {
            if notes.chars().count() > MAX_NOTES_CHARS {
                return Err(AppointmentError::ValidationError(format!(
                    "Notes must be at most {} characters",
                    MAX_NOTES_CHARS
                )));
            }
        }
        Ok(())
    }
}

impl Default for LifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
