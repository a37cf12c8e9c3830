use chrono::{Datelike, Duration, NaiveDate};
use reqwest::Method;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::scheduling::{format_hhmm, parse_hhmm, DayOfWeek};
use shared_models::within_conflict_window;

use crate::models::{BookedStart, ProviderError, Slot};
use crate::services::AvailabilityService;

pub const DEFAULT_SLOT_GRANULARITY_MINUTES: i32 = 30;
const MAX_SLOT_GRANULARITY_MINUTES: i32 = 240;

/// Expands a provider's weekly windows into concrete slots for one date.
pub struct SlotService {
    supabase: SupabaseClient,
    availability: AvailabilityService,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability: AvailabilityService::new(config),
        }
    }

    /// Candidate slots start at every granularity step from window start
    /// (inclusive) up to window end (exclusive). A candidate is marked
    /// unavailable when its start falls inside the booking conflict window of
    /// any non-cancelled appointment that day, so the listing and the booking
    /// path agree on what is free.
    pub async fn generate_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        granularity_minutes: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<Slot>, ProviderError> {
        let granularity = granularity_minutes.unwrap_or(DEFAULT_SLOT_GRANULARITY_MINUTES);
        if granularity <= 0 || granularity > MAX_SLOT_GRANULARITY_MINUTES {
            return Err(ProviderError::InvalidGranularity(granularity));
        }

        let windows = self
            .availability
            .get_availability(provider_id, auth_token)
            .await?;

        let day = DayOfWeek::from_weekday(date.weekday());
        let todays: Vec<_> = windows
            .iter()
            .filter(|w| w.enabled && w.day == day.as_str())
            .collect();
        if todays.is_empty() {
            return Ok(Vec::new());
        }

        let booked = self
            .booked_starts_for_date(provider_id, date, auth_token)
            .await?;

        let mut slots = Vec::new();
        for window in todays {
            // Rows written through the API are validated; anything else is
            // skipped rather than failing the whole listing.
            let (Some(start), Some(end)) = (parse_hhmm(&window.start_time), parse_hhmm(&window.end_time)) else {
                tracing::warn!(
                    provider_id = %provider_id,
                    day = %window.day,
                    "Skipping availability window with malformed times"
                );
                continue;
            };

            let mut current = date.and_time(start).and_utc();
            let window_end = date.and_time(end).and_utc();

            while current < window_end {
                let taken = booked
                    .iter()
                    .any(|b| within_conflict_window(current, granularity, b.start_time));

                slots.push(Slot {
                    provider_id,
                    date,
                    start_time: format_hhmm(current.time()),
                    duration_minutes: granularity,
                    available: !taken,
                });

                current += Duration::minutes(granularity as i64);
            }
        }

        Ok(slots)
    }

    async fn booked_starts_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedStart>, ProviderError> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&start_time=gte.{}&start_time=lt.{}&status=neq.cancelled&select=start_time&order=start_time.asc",
            provider_id,
            day_start.to_rfc3339(),
            day_end.to_rfc3339()
        );

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))
    }
}
