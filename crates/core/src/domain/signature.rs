use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::offer::{Offer, OfferId};
use crate::errors::DomainError;
use crate::tenancy::TenantId;

pub const UNKNOWN_ORIGIN: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureId(pub String);

impl SignatureId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Network origin and client agent of the request that carried a signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestProvenance {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl RequestProvenance {
    /// The first `X-Forwarded-For` hop wins, then `X-Real-IP`.
    pub fn from_headers(
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let real_ip = real_ip.map(str::trim).filter(|value| !value.is_empty());

        Self {
            ip_address: forwarded.or(real_ip).unwrap_or(UNKNOWN_ORIGIN).to_string(),
            user_agent: user_agent
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInput {
    pub signer_name: String,
    pub signer_email: String,
    /// Opaque signature data as captured by the signing surface.
    pub payload: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    pub offer_id: OfferId,
    pub tenant_id: TenantId,
    pub signer_name: String,
    pub signer_email: String,
    pub payload: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub signed_at: DateTime<Utc>,
}

impl Signature {
    pub fn capture(
        offer: &Offer,
        input: SignatureInput,
        provenance: RequestProvenance,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let signer_name = input.signer_name.trim().to_string();
        if signer_name.is_empty() {
            return Err(DomainError::validation("signature.signer_name", "is required"));
        }
        let signer_email = input.signer_email.trim().to_string();
        if !signer_email.contains('@') {
            return Err(DomainError::validation(
                "signature.signer_email",
                format!("`{signer_email}` is not an email address"),
            ));
        }
        if input.payload.trim().is_empty() {
            return Err(DomainError::validation("signature.payload", "is required"));
        }

        Ok(Self {
            id: SignatureId::generate(),
            offer_id: offer.id.clone(),
            tenant_id: offer.tenant_id.clone(),
            signer_name,
            signer_email,
            payload: input.payload,
            ip_address: provenance.ip_address,
            user_agent: provenance.user_agent,
            signed_at: now,
        })
    }
}

/// Answer of the public signature status query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStatus {
    pub has_signed: bool,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl From<Option<&Signature>> for SignatureStatus {
    fn from(signature: Option<&Signature>) -> Self {
        match signature {
            Some(signature) => Self {
                has_signed: true,
                signer_name: Some(signature.signer_name.clone()),
                signer_email: Some(signature.signer_email.clone()),
                signed_at: Some(signature.signed_at),
            },
            None => Self::default(),
        }
    }
}
