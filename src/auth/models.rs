use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// User roles for RBAC in DocMan.
///
/// The order of variants matters: it defines the privilege hierarchy.
/// `Viewer` is the least privileged, `Superadmin` is the most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read access to documents the user is related to.
    Viewer = 0,
    /// May create documents and edit the ones they author or own.
    Editor = 1,
    /// Sees and manages every document, user and catalog entry.
    Admin = 2,
    /// Admin plus user deletion and cache maintenance.
    Superadmin = 3,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Editor => write!(f, "editor"),
            Role::Admin => write!(f, "admin"),
            Role::Superadmin => write!(f, "superadmin"),
        }
    }
}

impl Role {
    /// Parse a role from a string (case-insensitive).
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Some(Role::Viewer),
            "editor" => Some(Role::Editor),
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::Superadmin),
            _ => None,
        }
    }

    /// Returns `true` if `self` has at least the required role.
    pub fn has_role(&self, required: Role) -> bool {
        *self >= required
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// The user behind an authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: ObjectId,
    pub email: String,
    pub role: Role,
    /// Id of the bearer token the request was made with.
    pub token_id: String,
}

impl AuthenticatedUser {
    /// Fail with an authorization error unless the user holds `required`.
    pub fn require(&self, required: Role) -> Result<(), AppError> {
        if self.role.has_role(required) {
            Ok(())
        } else {
            tracing::warn!(
                user = %self.user_id,
                role = %self.role,
                required = %required,
                "Role check failed"
            );
            Err(AppError::Authorization(format!(
                "This action requires the {required} role"
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
