use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::supabase::SupabaseClient;

pub const LOCK_TTL_SECONDS: i64 = 30;

/// Store-backed advisory locks.
///
/// A lock is a row in `scheduling_locks` keyed by a unique `lock_key`: the
/// first insert wins, a duplicate insert loses. Rows carry a TTL so a crashed
/// holder cannot wedge its key; an expired row may be reclaimed by the next
/// contender. Used to serialize booking per provider and quota replacement
/// per requester.
pub struct AdvisoryLocks {
    supabase: Arc<SupabaseClient>,
    ttl_seconds: i64,
}

impl AdvisoryLocks {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            ttl_seconds: LOCK_TTL_SECONDS,
        }
    }

    /// Returns true when the caller owns `lock_key` until `release` or expiry.
    /// False means another holder is active; callers surface that as
    /// contention, never as a retry loop.
    pub async fn acquire(&self, lock_key: &str) -> Result<bool> {
        if self.try_insert(lock_key).await {
            return Ok(true);
        }

        // Key is taken. A row past its TTL belongs to a dead holder and may
        // be reclaimed exactly once; a live row means honest contention.
        if self.reclaim_if_expired(lock_key).await? {
            return Ok(self.try_insert(lock_key).await);
        }

        Ok(false)
    }

    pub async fn release(&self, lock_key: &str) -> Result<()> {
        self.supabase
            .execute(
                Method::DELETE,
                &format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key),
                None,
                None,
            )
            .await?;

        debug!("Advisory lock released: {}", lock_key);
        Ok(())
    }

    /// Best-effort release for failure paths where the primary error must not
    /// be masked by a secondary one.
    pub async fn release_quietly(&self, lock_key: &str) {
        if let Err(e) = self.release(lock_key).await {
            warn!("Failed to release advisory lock {}: {}", lock_key, e);
        }
    }

    async fn try_insert(&self, lock_key: &str) -> bool {
        let lock_data = json!({
            "lock_key": lock_key,
            "locked_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.ttl_seconds)).to_rfc3339(),
            "process_id": format!("scheduler_{}", Uuid::new_v4()),
        });

        match self
            .supabase
            .execute(
                Method::POST,
                "/rest/v1/scheduling_locks",
                None,
                Some(lock_data),
            )
            .await
        {
            Ok(()) => {
                debug!("Advisory lock acquired: {}", lock_key);
                true
            }
            Err(_) => false,
        }
    }

    async fn reclaim_if_expired(&self, lock_key: &str) -> Result<bool> {
        let response: Value = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/scheduling_locks?lock_key=eq.{}&select=*", lock_key),
                None,
                None,
            )
            .await?;

        let expires_at = response
            .as_array()
            .and_then(|locks| locks.first())
            .and_then(|lock| lock.get("expires_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok());

        match expires_at {
            Some(expires_at) if expires_at.with_timezone(&Utc) < Utc::now() => {
                info!("Reclaiming expired advisory lock: {}", lock_key);
                self.release(lock_key).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
            // Row vanished between the failed insert and this read; the next
            // insert attempt settles ownership.
            None => Ok(true),
        }
    }
}
