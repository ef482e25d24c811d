use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::error::DomainError;
use crate::permissions::{PermissionSet, effective_permissions, is_admin_role, normalize_permissions};

/// Implicit workflow role held by every authenticated user.
pub const BASE_WORKFLOW_ROLE: &str = "user";
/// Workflow role granted to admin-like role labels.
pub const ADMIN_WORKFLOW_ROLE: &str = "admin";

/// A user's role label and explicit grants, validated at the boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccess {
    pub role: String,
    pub permissions: PermissionSet,
}

impl UserAccess {
    pub fn new<I, S>(role: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            role: role.into().trim().to_string(),
            permissions: normalize_permissions(permissions),
        }
    }

    /// Parses the loosely-typed preferences blob stored on a user record.
    ///
    /// The blob must be an object. `role` must be a string if present.
    /// `permissions` must be an array if present; non-string elements are
    /// dropped.
    pub fn from_preferences(prefs: &Value) -> DomainResult<Self> {
        let object = prefs
            .as_object()
            .ok_or_else(|| DomainError::Validation("preferences must be an object".into()))?;

        let role = match object.get("role") {
            None | Some(Value::Null) => "",
            Some(Value::String(role)) => role.as_str(),
            Some(_) => {
                return Err(DomainError::Validation(
                    "preferences.role must be a string".into(),
                ));
            }
        };

        let permissions = match object.get("permissions") {
            None | Some(Value::Null) => PermissionSet::new(),
            Some(Value::Array(items)) => normalize_permissions(items.iter().filter_map(Value::as_str)),
            Some(_) => {
                return Err(DomainError::Validation(
                    "preferences.permissions must be an array".into(),
                ));
            }
        };

        Ok(Self {
            role: role.trim().to_string(),
            permissions,
        })
    }

    pub fn is_admin(&self) -> bool {
        is_admin_role(&self.role)
    }

    pub fn effective_permissions(&self) -> PermissionSet {
        effective_permissions(&self.role, self.permissions.iter())
    }

    /// Workflow roles: the lower-cased role label, `user`, and `admin` for
    /// admin-like labels. Deduplicated, in that order.
    pub fn workflow_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        let mut push = |role: String| {
            if !role.is_empty() && !roles.contains(&role) {
                roles.push(role);
            }
        };
        push(self.role.to_lowercase());
        push(BASE_WORKFLOW_ROLE.to_string());
        if self.is_admin() {
            push(ADMIN_WORKFLOW_ROLE.to_string());
        }
        roles
    }
}
