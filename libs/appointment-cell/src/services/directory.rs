use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, DirectoryUser};

/// Read-only lookups against the `users` directory table.
pub struct DirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl DirectoryService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn resolve_user(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<DirectoryUser>, AppointmentError> {
        let path = format!("/rest/v1/users?id=eq.{}", user_id);

        let rows: Vec<DirectoryUser> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    /// Batch lookup via a single `in.(...)` filter. Ids missing from the
    /// directory are simply absent from the map.
    pub async fn resolve_many(
        &self,
        user_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, DirectoryUser>, AppointmentError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Resolving {} directory users", user_ids.len());

        let joined = user_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/rest/v1/users?id=in.({})", joined);

        let rows: Vec<DirectoryUser> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(|user| (user.id, user)).collect())
    }
}
