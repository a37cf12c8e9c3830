use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// PROVIDER PROFILE AND AVAILABILITY
// ==============================================================================

/// Provider profile row. The weekly schedule lives in the `availability`
/// JSON column and is always replaced wholesale, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub specialty: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recurring weekly window. `day` is a lowercase weekday name and the
/// times are wall-clock `HH:MM` strings; both are validated before any write,
/// so rows written through the API are always well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetAvailabilityRequest {
    pub windows: Vec<AvailabilityWindow>,
}

// ==============================================================================
// SLOTS
// ==============================================================================

/// A concrete bookable (or taken) slot on a single date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    pub duration_minutes: i32,
    pub available: bool,
}

/// Start time of an existing appointment, as fetched for occupancy marking.
#[derive(Debug, Clone, Deserialize)]
pub struct BookedStart {
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub granularity: Option<i32>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider profile not found")]
    ProfileNotFound,

    #[error("Invalid availability window: {0}")]
    InvalidWindow(String),

    #[error("Slot granularity must be between 1 and 240 minutes, got {0}")]
    InvalidGranularity(i32),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
