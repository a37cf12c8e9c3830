use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `appointments`. `patient_id`, `provider_id` and `start_time`
/// are immutable after creation; status updates only ever patch status,
/// notes and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directory details for one party of an appointment.
#[derive(Debug, Clone, Serialize)]
pub struct PartyRef {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// An appointment with both parties resolved against the user directory.
/// A missing directory row yields `None`, never an error; the appointment
/// row itself stays the authority.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAppointment {
    pub appointment: Appointment,
    pub patient: Option<PartyRef>,
    pub provider: Option<PartyRef>,
}

/// Start time of an existing appointment, as fetched for conflict checks.
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingStart {
    pub start_time: DateTime<Utc>,
}

// ==============================================================================
// USER DIRECTORY
// ==============================================================================

/// One row of the `users` directory table.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub is_active: bool,
}

impl From<DirectoryUser> for PartyRef {
    fn from(user: DirectoryUser) -> Self {
        PartyRef {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
        }
    }
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Requested user is not an active provider")]
    InvalidProvider,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not authorized for this appointment")]
    Unauthorized,

    #[error("Requested slot is not available")]
    SlotTaken,

    #[error("Booking quota exhausted")]
    QuotaExceeded,

    #[error("Quota configuration fault: {0}")]
    QuotaConfiguration(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
