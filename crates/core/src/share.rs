//! Signed public links.
//!
//! A token is `{tenant_id}.{offer_id}.{mac}` where `mac` is the hex
//! HMAC-SHA256 of `{tenant_id}:{offer_id}` under the configured link
//! secret. Verification recomputes the MAC and compares in constant time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::domain::offer::OfferId;
use crate::errors::DomainError;
use crate::tenancy::TenantId;

type HmacSha256 = Hmac<Sha256>;

pub const SHARE_PATH: &str = "shared/offers";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareClaims {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
}

#[derive(Clone, Debug)]
pub struct ShareLinkSigner {
    base_url: String,
    secret: SecretString,
}

impl ShareLinkSigner {
    pub fn new(base_url: impl Into<String>, secret: SecretString) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), secret }
    }

    pub fn token(&self, tenant_id: &TenantId, offer_id: &OfferId) -> Result<String, DomainError> {
        let mac = self.mac(tenant_id, offer_id)?;
        Ok(format!(
            "{}.{}.{}",
            tenant_id.0,
            offer_id.0,
            encode_hex(mac.finalize().into_bytes().as_slice())
        ))
    }

    pub fn link(&self, tenant_id: &TenantId, offer_id: &OfferId) -> Result<String, DomainError> {
        Ok(format!("{}/{SHARE_PATH}/{}", self.base_url, self.token(tenant_id, offer_id)?))
    }

    pub fn verify(&self, token: &str) -> Result<ShareClaims, DomainError> {
        let invalid = || DomainError::validation("share_token", "token is malformed or forged");

        let mut parts = token.rsplitn(3, '.');
        let signature = parts.next().and_then(decode_hex).ok_or_else(invalid)?;
        let offer_id = parts.next().filter(|part| !part.is_empty()).ok_or_else(invalid)?;
        let tenant_id = parts.next().filter(|part| !part.is_empty()).ok_or_else(invalid)?;

        let claims = ShareClaims {
            tenant_id: TenantId(tenant_id.to_string()),
            offer_id: OfferId(offer_id.to_string()),
        };
        self.mac(&claims.tenant_id, &claims.offer_id)?
            .verify_slice(&signature)
            .map_err(|_| invalid())?;
        Ok(claims)
    }

    fn mac(&self, tenant_id: &TenantId, offer_id: &OfferId) -> Result<HmacSha256, DomainError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|error| DomainError::validation("sharing.link_secret", error.to_string()))?;
        mac.update(tenant_id.0.as_bytes());
        mac.update(b":");
        mac.update(offer_id.0.as_bytes());
        Ok(mac)
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 || !raw.is_ascii() {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&raw[index..index + 2], 16).ok())
        .collect()
}
