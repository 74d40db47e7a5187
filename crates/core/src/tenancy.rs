use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    TenantAdmin,
    Manager,
    User,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantAdmin => "TENANT_ADMIN",
            Self::Manager => "MANAGER",
            Self::User => "USER",
            Self::Viewer => "VIEWER",
        }
    }
}

/// Caller identity supplied by the auth/session layer.
///
/// Every offer operation takes this by reference, and every storage query
/// derives its tenant predicate from it. There is no way to reach an offer
/// without naming the tenant that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self { tenant_id: TenantId(tenant_id.into()), user_id: UserId(user_id.into()), role }
    }

    /// Actor label recorded on activity entries.
    pub fn actor(&self) -> String {
        format!("user:{}", self.user_id.0)
    }
}
