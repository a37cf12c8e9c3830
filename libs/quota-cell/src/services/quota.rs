use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{AdvisoryLocks, SupabaseClient};

use crate::models::{LimitCheck, PlanTier, QuotaError, QuotaRecord, UNLIMITED_QUOTA};

/// Enforces per-requester booking quotas against `quota_records`.
pub struct QuotaService {
    supabase: Arc<SupabaseClient>,
    locks: AdvisoryLocks,
}

impl QuotaService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let locks = AdvisoryLocks::new(supabase.clone());
        Self { supabase, locks }
    }

    pub async fn get_active_record(
        &self,
        requester_id: Uuid,
        auth_token: &str,
    ) -> Result<QuotaRecord, QuotaError> {
        let path = format!(
            "/rest/v1/quota_records?requester_id=eq.{}&active=eq.true&order=created_at.desc&limit=1",
            requester_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| QuotaError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(QuotaError::NoActiveRecord);
        };

        serde_json::from_value(row)
            .map_err(|e| QuotaError::DatabaseError(format!("Malformed quota record: {}", e)))
    }

    /// Non-consuming check. Booking calls this before the conflict check so a
    /// doomed request never burns quota.
    pub async fn check_limit(
        &self,
        requester_id: Uuid,
        auth_token: &str,
    ) -> Result<LimitCheck, QuotaError> {
        let record = self.get_active_record(requester_id, auth_token).await?;
        Ok(LimitCheck::from_record(&record))
    }

    /// Guarded increment of used_count, called exactly once per persisted
    /// booking. The PATCH matches the previously observed used_count, so two
    /// racers for the last unit cannot both get through; an empty reply means
    /// the guard failed and quota is treated as exhausted.
    pub async fn consume(
        &self,
        requester_id: Uuid,
        auth_token: &str,
    ) -> Result<QuotaRecord, QuotaError> {
        let record = self.get_active_record(requester_id, auth_token).await?;

        if record.period_limit != UNLIMITED_QUOTA && record.used_count >= record.period_limit {
            return Err(QuotaError::Exceeded);
        }

        let path = format!(
            "/rest/v1/quota_records?requester_id=eq.{}&active=eq.true&used_count=eq.{}",
            requester_id, record.used_count
        );
        let update = json!({
            "used_count": record.used_count + 1,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| QuotaError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(QuotaError::Exceeded);
        };

        serde_json::from_value(row)
            .map_err(|e| QuotaError::DatabaseError(format!("Malformed quota record: {}", e)))
    }

    /// Deactivates the current active record and starts a fresh one under
    /// `new_tier`, serialized per requester via an advisory lock so two
    /// concurrent upgrades cannot leave two active records.
    pub async fn replace_active_quota(
        &self,
        requester_id: Uuid,
        new_tier: PlanTier,
        auth_token: &str,
    ) -> Result<QuotaRecord, QuotaError> {
        let lock_key = format!("quota_{}", requester_id);
        let acquired = self
            .locks
            .acquire(&lock_key)
            .await
            .map_err(|e| QuotaError::DatabaseError(e.to_string()))?;
        if !acquired {
            return Err(QuotaError::UpgradeInProgress);
        }

        let outcome = self
            .replace_under_lock(requester_id, new_tier, auth_token)
            .await;
        self.locks.release_quietly(&lock_key).await;
        outcome
    }

    async fn replace_under_lock(
        &self,
        requester_id: Uuid,
        new_tier: PlanTier,
        auth_token: &str,
    ) -> Result<QuotaRecord, QuotaError> {
        let now = Utc::now();

        let deactivate_path = format!(
            "/rest/v1/quota_records?requester_id=eq.{}&active=eq.true",
            requester_id
        );
        let deactivate = json!({
            "active": false,
            "period_end": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });
        self.supabase
            .execute(Method::PATCH, &deactivate_path, Some(auth_token), Some(deactivate))
            .await
            .map_err(|e| QuotaError::DatabaseError(e.to_string()))?;

        let insert = json!({
            "requester_id": requester_id,
            "tier": new_tier,
            "period_limit": new_tier.period_limit(),
            "used_count": 0,
            "period_start": now.to_rfc3339(),
            "active": true,
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/quota_records",
                Some(auth_token),
                Some(insert),
                Some(headers),
            )
            .await
            .map_err(|e| QuotaError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(QuotaError::DatabaseError(
                "Quota insert returned no rows".to_string(),
            ));
        };

        serde_json::from_value(row)
            .map_err(|e| QuotaError::DatabaseError(format!("Malformed quota record: {}", e)))
    }
}
