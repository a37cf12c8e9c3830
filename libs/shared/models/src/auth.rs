use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Provider,
    Operator,
}

impl Role {
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "patient" => Some(Role::Patient),
            "provider" => Some(Role::Provider),
            "operator" => Some(Role::Operator),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Provider => "provider",
            Role::Operator => "operator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    BookAppointment,
    ViewOwnAppointments,
    ViewQuota,
    UpgradePlan,
    ManageAvailability,
    UpdateAppointmentStatus,
    ManageAppointments,
    ManageQuotas,
    ViewAllData,
}

/// Role capabilities as a pure lookup. No global state; callers hold the
/// returned slice for the lifetime of the request.
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Patient => &[
            Permission::BookAppointment,
            Permission::ViewOwnAppointments,
            Permission::ViewQuota,
            Permission::UpgradePlan,
        ],
        Role::Provider => &[
            Permission::ManageAvailability,
            Permission::ViewOwnAppointments,
            Permission::UpdateAppointmentStatus,
        ],
        Role::Operator => &[
            Permission::ManageAppointments,
            Permission::UpdateAppointmentStatus,
            Permission::ManageQuotas,
            Permission::ViewAllData,
        ],
    }
}

/// Authenticated caller as the cells see it: a uuid plus a parsed role.
/// Built once per request from the middleware-provided `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: Uuid,
    pub role: Role,
}

impl Requester {
    pub fn from_user(user: &User) -> Result<Requester, AppError> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))?;

        let role = user
            .role
            .as_deref()
            .and_then(Role::parse)
            .ok_or_else(|| AppError::Auth("User has no recognized role".to_string()))?;

        Ok(Requester { id, role })
    }

    pub fn can(&self, permission: Permission) -> bool {
        permissions_for(self.role).contains(&permission)
    }

    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: Option<&str>) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            email: Some("user@example.com".to_string()),
            role: role.map(|r| r.to_string()),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn patients_can_book_but_not_manage_availability() {
        let requester = Requester {
            id: Uuid::new_v4(),
            role: Role::Patient,
        };
        assert!(requester.can(Permission::BookAppointment));
        assert!(requester.can(Permission::ViewQuota));
        assert!(!requester.can(Permission::ManageAvailability));
        assert!(!requester.can(Permission::UpdateAppointmentStatus));
    }

    #[test]
    fn providers_manage_availability_but_cannot_book() {
        let requester = Requester {
            id: Uuid::new_v4(),
            role: Role::Provider,
        };
        assert!(requester.can(Permission::ManageAvailability));
        assert!(requester.can(Permission::UpdateAppointmentStatus));
        assert!(!requester.can(Permission::BookAppointment));
    }

    #[test]
    fn operators_manage_but_do_not_book() {
        let requester = Requester {
            id: Uuid::new_v4(),
            role: Role::Operator,
        };
        assert!(requester.can(Permission::ManageAppointments));
        assert!(requester.can(Permission::ManageQuotas));
        assert!(!requester.can(Permission::BookAppointment));
    }

    #[test]
    fn requester_from_user_requires_known_role() {
        let user = user_with_role(Some("patient"));
        let requester = Requester::from_user(&user).unwrap();
        assert_eq!(requester.role, Role::Patient);

        assert!(Requester::from_user(&user_with_role(Some("superuser"))).is_err());
        assert!(Requester::from_user(&user_with_role(None)).is_err());
    }

    #[test]
    fn requester_from_user_requires_uuid_subject() {
        let mut user = user_with_role(Some("provider"));
        user.id = "not-a-uuid".to_string();
        assert!(Requester::from_user(&user).is_err());
    }
}
