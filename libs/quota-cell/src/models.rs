use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel period_limit for plans with no booking cap.
pub const UNLIMITED_QUOTA: i32 = -1;

// ==============================================================================
// PLAN CATALOG
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Premium,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Basic, PlanTier::Premium];

    pub fn period_limit(&self) -> i32 {
        match self {
            PlanTier::Free => 2,
            PlanTier::Basic => 5,
            PlanTier::Premium => UNLIMITED_QUOTA,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Free => "Free",
            PlanTier::Basic => "Basic",
            PlanTier::Premium => "Premium",
        }
    }

    pub fn monthly_price_cents(&self) -> i64 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Basic => 1999,
            PlanTier::Premium => 4999,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry for one tier, as served by the plans endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub tier: PlanTier,
    pub display_name: &'static str,
    pub period_limit: i32,
    pub monthly_price_cents: i64,
}

impl PlanInfo {
    pub fn for_tier(tier: PlanTier) -> Self {
        Self {
            tier,
            display_name: tier.display_name(),
            period_limit: tier.period_limit(),
            monthly_price_cents: tier.monthly_price_cents(),
        }
    }
}

// ==============================================================================
// QUOTA RECORDS
// ==============================================================================

/// One row of `quota_records`. At most one record per requester is active;
/// superseded records are deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub tier: PlanTier,
    pub period_limit: i32,
    pub used_count: i32,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a non-consuming limit check.
#[derive(Debug, Clone, Serialize)]
pub struct LimitCheck {
    pub can_book: bool,
    pub remaining: i32,
    pub tier: PlanTier,
}

impl LimitCheck {
    pub fn from_record(record: &QuotaRecord) -> Self {
        if record.period_limit == UNLIMITED_QUOTA {
            return Self {
                can_book: true,
                remaining: UNLIMITED_QUOTA,
                tier: record.tier,
            };
        }

        let remaining = (record.period_limit - record.used_count).max(0);
        Self {
            can_book: remaining > 0,
            remaining,
            tier: record.tier,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeRequest {
    pub tier: PlanTier,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckQuotaQuery {
    pub requester_id: Option<Uuid>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum QuotaError {
    #[error("No active quota record for requester")]
    NoActiveRecord,

    #[error("Booking quota exhausted")]
    Exceeded,

    #[error("A plan change for this requester is already in progress")]
    UpgradeInProgress,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tier: PlanTier, used_count: i32) -> QuotaRecord {
        QuotaRecord {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            tier,
            period_limit: tier.period_limit(),
            used_count,
            period_start: Utc::now(),
            period_end: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tier_catalog_limits() {
        assert_eq!(PlanTier::Free.period_limit(), 2);
        assert_eq!(PlanTier::Basic.period_limit(), 5);
        assert_eq!(PlanTier::Premium.period_limit(), UNLIMITED_QUOTA);
        assert_eq!(PlanTier::Free.monthly_price_cents(), 0);
    }

    #[test]
    fn limit_check_counts_down() {
        let check = LimitCheck::from_record(&record(PlanTier::Basic, 3));
        assert!(check.can_book);
        assert_eq!(check.remaining, 2);
        assert_eq!(check.tier, PlanTier::Basic);
    }

    #[test]
    fn limit_check_blocks_at_cap() {
        let check = LimitCheck::from_record(&record(PlanTier::Free, 2));
        assert!(!check.can_book);
        assert_eq!(check.remaining, 0);
    }

    #[test]
    fn unlimited_plan_never_blocks() {
        let check = LimitCheck::from_record(&record(PlanTier::Premium, 10_000));
        assert!(check.can_book);
        assert_eq!(check.remaining, UNLIMITED_QUOTA);
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_value(PlanTier::Premium).unwrap(), "premium");
        let parsed: PlanTier = serde_json::from_value(serde_json::json!("basic")).unwrap();
        assert_eq!(parsed, PlanTier::Basic);
    }
}
