use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::scheduling::within_conflict_window;

use crate::models::{AppointmentError, ExistingStart};

/// Occupancy checks against the appointments table. Shares its window rule
/// with slot listing, so a start the listing showed as open is the same
/// start booking will accept.
pub struct ConflictService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// True when `proposed_start` falls inside the conflict window of any
    /// non-cancelled appointment of this provider. The fetch is bounded to
    /// starts the window rule could possibly match.
    pub async fn has_conflict(
        &self,
        provider_id: Uuid,
        proposed_start: DateTime<Utc>,
        duration_minutes: i32,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!(
            "Checking occupancy for provider {} at {} ({} min)",
            provider_id, proposed_start, duration_minutes
        );

        let pad = Duration::minutes(duration_minutes as i64);
        let from = (proposed_start - pad).to_rfc3339();
        let to = (proposed_start + pad).to_rfc3339();

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&start_time=gte.{}&start_time=lte.{}&status=neq.cancelled&select=start_time",
            provider_id,
            urlencoding::encode(&from),
            urlencoding::encode(&to)
        );

        let existing: Vec<ExistingStart> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let conflict = existing
            .iter()
            .any(|row| within_conflict_window(proposed_start, duration_minutes, row.start_time));

        if conflict {
            warn!(
                "Provider {} already occupied around {}",
                provider_id, proposed_start
            );
        }

        Ok(conflict)
    }
}
