//! Caller identity and permission checks.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user id in the `x-user-id` header and this module resolves it against the
//! `users` table.

pub mod rbac;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{entities::user, errors::ServiceError, AppState};

pub use rbac::{Permission, Role};

pub const USER_ID_HEADER: &str = "x-user-id";

/// The acting user for a call into the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
    pub unit: Option<String>,
    pub department: Option<String>,
}

impl CurrentUser {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self {
            id,
            role,
            unit: None,
            department: None,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    /// Fails with `PermissionDenied` unless the role grants `permission`
    pub fn require(&self, permission: Permission) -> Result<(), ServiceError> {
        if self.can(permission) {
            return Ok(());
        }
        warn!(user_id = %self.id, role = %self.role, %permission, "permission denied");
        Err(ServiceError::PermissionDenied(format!(
            "role '{}' lacks the '{}' permission",
            self.role, permission
        )))
    }
}

impl From<&user::Model> for CurrentUser {
    fn from(model: &user::Model) -> Self {
        Self {
            id: model.id,
            role: model.role,
            unit: model.unit.clone(),
            department: model.department.clone(),
        }
    }
}

impl From<user::Model> for CurrentUser {
    fn from(model: user::Model) -> Self {
        Self::from(&model)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| ServiceError::Unauthorized("malformed user id".to_string()))?;

        let model = user::Entity::find_by_id(id)
            .one(&*state.db)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized(format!("unknown user {}", id)))?;

        Ok(CurrentUser::from(model))
    }
}
