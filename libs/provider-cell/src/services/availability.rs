use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::scheduling::{parse_hhmm, DayOfWeek};

use crate::models::{AvailabilityWindow, ProviderError, ProviderProfile};

/// Reads and replaces a provider's recurring weekly schedule.
pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_availability(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, ProviderError> {
        let profile = self.get_profile(provider_id, auth_token).await?;
        Ok(profile.availability)
    }

    /// Replaces the full window set. Windows are validated before any store
    /// access, so a malformed request never touches the profile row.
    pub async fn set_availability(
        &self,
        provider_id: Uuid,
        windows: Vec<AvailabilityWindow>,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, ProviderError> {
        validate_windows(&windows)?;

        let update = json!({
            "availability": windows,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let path = format!("/rest/v1/provider_profiles?provider_id=eq.{}", provider_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        // PostgREST returns the updated rows; none means the profile row
        // does not exist.
        let Some(row) = result.into_iter().next() else {
            return Err(ProviderError::ProfileNotFound);
        };

        let profile: ProviderProfile = serde_json::from_value(row)
            .map_err(|e| ProviderError::DatabaseError(format!("Malformed provider profile: {}", e)))?;
        Ok(profile.availability)
    }

    pub(crate) async fn get_profile(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        let path = format!("/rest/v1/provider_profiles?provider_id=eq.{}", provider_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProviderError::ProfileNotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| ProviderError::DatabaseError(format!("Malformed provider profile: {}", e)))
    }
}

pub(crate) fn validate_windows(windows: &[AvailabilityWindow]) -> Result<(), ProviderError> {
    for window in windows {
        if DayOfWeek::parse(&window.day).is_none() {
            return Err(ProviderError::InvalidWindow(format!(
                "unknown day '{}'",
                window.day
            )));
        }

        let start = parse_hhmm(&window.start_time).ok_or_else(|| {
            ProviderError::InvalidWindow(format!(
                "start time '{}' is not HH:MM",
                window.start_time
            ))
        })?;
        let end = parse_hhmm(&window.end_time).ok_or_else(|| {
            ProviderError::InvalidWindow(format!("end time '{}' is not HH:MM", window.end_time))
        })?;

        if start >= end {
            return Err(ProviderError::InvalidWindow(format!(
                "start time {} must be before end time {}",
                window.start_time, window.end_time
            )));
        }
    }
    Ok(())
}
