//! Permission tokens and the rules that derive a user's effective set.
//!
//! Tokens are plain strings (`module:capability`). Nothing in this module
//! panics or errors: malformed input degrades to an empty set or `false`.

use serde::{Deserialize, Serialize};

pub const BENEFICIARIES_ACCESS: &str = "beneficiaries:access";
pub const DONATIONS_ACCESS: &str = "donations:access";
pub const AID_APPLICATIONS_ACCESS: &str = "aid_applications:access";
pub const SCHOLARSHIPS_ACCESS: &str = "scholarships:access";
pub const MESSAGES_ACCESS: &str = "messages:access";
pub const FINANCE_ACCESS: &str = "finance:access";
pub const REPORTS_ACCESS: &str = "reports:access";
pub const SETTINGS_ACCESS: &str = "settings:access";
pub const WORKFLOW_ACCESS: &str = "workflow:access";
pub const PARTNERS_ACCESS: &str = "partners:access";

pub const USERS_MANAGE: &str = "users:manage";
pub const SETTINGS_MANAGE: &str = "settings:manage";

pub const MODULE_PERMISSIONS: [&str; 10] = [
    BENEFICIARIES_ACCESS,
    DONATIONS_ACCESS,
    AID_APPLICATIONS_ACCESS,
    SCHOLARSHIPS_ACCESS,
    MESSAGES_ACCESS,
    FINANCE_ACCESS,
    REPORTS_ACCESS,
    SETTINGS_ACCESS,
    WORKFLOW_ACCESS,
    PARTNERS_ACCESS,
];

pub const SPECIAL_PERMISSIONS: [&str; 2] = [USERS_MANAGE, SETTINGS_MANAGE];

/// Upper-cased substrings that mark a role label as administrative.
///
/// Matching is by substring, so localized labels such as "Dernek Başkanı"
/// qualify. It also means any label containing "director" qualifies.
pub const ADMIN_ROLE_MARKERS: [&str; 4] = ["ADMIN", "BAŞKAN", "PRESIDENT", "DIRECTOR"];

const WILDCARD: &str = "*";

/// Insertion-ordered set of permission tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct PermissionSet {
    items: Vec<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token unless it is the wildcard, blank, or already present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, permission: &str) -> bool {
        let permission = permission.trim();
        if permission.is_empty() || permission == WILDCARD || self.contains(permission) {
            return false;
        }
        self.items.push(permission.to_string());
        true
    }

    pub fn extend<I, S>(&mut self, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for permission in permissions {
            self.insert(permission.as_ref());
        }
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.items.iter().any(|item| item == permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

impl From<Vec<String>> for PermissionSet {
    fn from(value: Vec<String>) -> Self {
        normalize_permissions(value)
    }
}

impl From<PermissionSet> for Vec<String> {
    fn from(value: PermissionSet) -> Self {
        value.items
    }
}

impl<S: AsRef<str>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        normalize_permissions(iter)
    }
}

pub fn normalize_permissions<I, S>(permissions: I) -> PermissionSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = PermissionSet::new();
    set.extend(permissions);
    set
}

pub fn is_admin_role(role: &str) -> bool {
    let role = role.trim().to_uppercase();
    ADMIN_ROLE_MARKERS.iter().any(|marker| role.contains(*marker))
}

/// Explicit grants, widened to the full catalog for admin-like roles.
pub fn effective_permissions<I, S>(role: &str, explicit: I) -> PermissionSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut permissions = normalize_permissions(explicit);
    if is_admin_role(role) {
        permissions.extend(MODULE_PERMISSIONS);
        permissions.extend(SPECIAL_PERMISSIONS);
    }
    permissions
}

pub fn has_permission<S: AsRef<str>>(permissions: &[S], required: &str) -> bool {
    permissions.iter().any(|item| item.as_ref() == required)
}

pub fn has_any_permission<S, R>(permissions: &[S], required: &[R]) -> bool
where
    S: AsRef<str>,
    R: AsRef<str>,
{
    required
        .iter()
        .any(|needed| has_permission(permissions, needed.as_ref()))
}

pub fn has_all_permissions<S, R>(permissions: &[S], required: &[R]) -> bool
where
    S: AsRef<str>,
    R: AsRef<str>,
{
    required
        .iter()
        .all(|needed| has_permission(permissions, needed.as_ref()))
}

pub fn permission_label(permission: &str) -> Option<&'static str> {
    let label = match permission {
        BENEFICIARIES_ACCESS => "Hak Sahipleri",
        DONATIONS_ACCESS => "Bağışlar",
        AID_APPLICATIONS_ACCESS => "Yardım Başvuruları",
        SCHOLARSHIPS_ACCESS => "Burslar",
        MESSAGES_ACCESS => "Mesajlaşma",
        FINANCE_ACCESS => "Finans",
        REPORTS_ACCESS => "Raporlar",
        SETTINGS_ACCESS => "Ayarlar",
        WORKFLOW_ACCESS => "Görev & Toplantılar",
        PARTNERS_ACCESS => "Ortak Yönetimi",
        USERS_MANAGE => "Kullanıcı Yönetimi",
        SETTINGS_MANAGE => "Ayar Yönetimi",
        _ => return None,
    };
    Some(label)
}
