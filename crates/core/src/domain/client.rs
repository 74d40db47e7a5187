use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::tenancy::{TenantContext, TenantId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    #[default]
    Lead,
    Active,
    Inactive,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for ClientStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LEAD" => Ok(Self::Lead),
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            _ => Err(DomainError::validation(
                "client.status",
                format!("unknown client status `{value}`"),
            )),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub company_name: String,
    pub email: Option<String>,
    pub vat_number: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub status: ClientStatus,
}

/// Recipient organisation of offers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub tenant_id: TenantId,
    pub company_name: String,
    pub email: Option<String>,
    pub vat_number: Option<String>,
    pub phone: Option<String>,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
}

fn normalize(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

impl Client {
    pub fn create(
        ctx: &TenantContext,
        draft: NewClient,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let company_name = draft.company_name.trim().to_string();
        if company_name.is_empty() {
            return Err(DomainError::validation("client.company_name", "is required"));
        }
        let email = normalize(draft.email);
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(DomainError::validation(
                    "client.email",
                    format!("`{email}` is not an email address"),
                ));
            }
        }

        Ok(Self {
            id: ClientId::generate(),
            tenant_id: ctx.tenant_id.clone(),
            company_name,
            email,
            vat_number: normalize(draft.vat_number),
            phone: normalize(draft.phone),
            status: draft.status,
            created_at: now,
        })
    }
}
