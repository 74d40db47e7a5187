use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domain::offer::{Offer, OfferId};
use crate::errors::DomainError;
use crate::tenancy::TenantId;

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "Offer {{ offerNumber }} from {{ companyName }}";
pub const DEFAULT_BODY_TEMPLATE: &str = "Dear {{ clientName }},

Please find our offer {{ offerNumber }}: {{ offerTitle }} ({{ total }}).

You can view and sign this offer online at: {{ shareLink }}

Best regards,
{{ companyName }}
";

const SUBJECT: &str = "offer_subject.txt";
const BODY: &str = "offer_body.txt";

/// Values available to notification templates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationVariables {
    pub offer_number: String,
    pub offer_title: String,
    pub client_name: String,
    pub company_name: String,
    pub share_link: String,
    pub total: String,
}

impl NotificationVariables {
    pub fn for_offer(
        offer: &Offer,
        client_name: impl Into<String>,
        company_name: impl Into<String>,
        share_link: impl Into<String>,
    ) -> Self {
        Self {
            offer_number: offer.number.to_string(),
            offer_title: offer.title.clone(),
            client_name: client_name.into(),
            company_name: company_name.into(),
            share_link: share_link.into(),
            total: format!("{} {}", offer.totals().total, offer.currency),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OfferNotification {
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub share_link: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Renders notification subject and body from Tera templates.
#[derive(Clone, Debug)]
pub struct NotificationRenderer {
    tera: Tera,
}

impl NotificationRenderer {
    pub fn new(subject_template: &str, body_template: &str) -> Result<Self, DomainError> {
        let mut tera = Tera::default();
        tera.add_raw_template(SUBJECT, subject_template).map_err(|error| {
            DomainError::validation("notifications.subject_template", error.to_string())
        })?;
        tera.add_raw_template(BODY, body_template).map_err(|error| {
            DomainError::validation("notifications.body_template", error.to_string())
        })?;
        Ok(Self { tera })
    }

    /// Renders `(subject, body)`. A custom subject or message replaces the
    /// configured template and may use the same variables.
    pub fn render(
        &self,
        variables: &NotificationVariables,
        custom_subject: Option<&str>,
        custom_message: Option<&str>,
    ) -> Result<(String, String), DomainError> {
        let context = Context::from_serialize(variables)
            .map_err(|error| DomainError::validation("notifications", error.to_string()))?;

        let subject = match custom_subject {
            Some(template) => one_off("custom_subject", template, &context)?,
            None => self.render_named(SUBJECT, &context)?,
        };
        let body = match custom_message {
            Some(template) => one_off("custom_message", template, &context)?,
            None => self.render_named(BODY, &context)?,
        };
        Ok((subject.trim().to_string(), body))
    }

    fn render_named(&self, name: &str, context: &Context) -> Result<String, DomainError> {
        self.tera
            .render(name, context)
            .map_err(|error| DomainError::validation("notifications", error.to_string()))
    }
}

impl Default for NotificationRenderer {
    fn default() -> Self {
        let mut tera = Tera::default();
        // The built-in templates are constants and always parse.
        let _ = tera.add_raw_template(SUBJECT, DEFAULT_SUBJECT_TEMPLATE);
        let _ = tera.add_raw_template(BODY, DEFAULT_BODY_TEMPLATE);
        Self { tera }
    }
}

fn one_off(field: &str, template: &str, context: &Context) -> Result<String, DomainError> {
    Tera::one_off(template, context, false)
        .map_err(|error| DomainError::validation(field, error.to_string()))
}

/// Delivery transport for offer notifications. Delivery is best effort:
/// callers log a failure and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        notification: &OfferNotification,
    ) -> Result<DeliveryReceipt, NotificationError>;
}

/// Writes notifications to the log instead of a mail transport.
#[derive(Clone, Debug)]
pub struct LogNotifier {
    sender_name: String,
}

impl LogNotifier {
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self { sender_name: sender_name.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        notification: &OfferNotification,
    ) -> Result<DeliveryReceipt, NotificationError> {
        let message_id = format!("msg_{}", Uuid::new_v4().simple());
        info!(
            event_name = "offer.notification_dispatched",
            tenant_id = %notification.tenant_id,
            offer_id = %notification.offer_id,
            sender = %self.sender_name,
            recipient = %notification.recipient,
            subject = %notification.subject,
            message_id = %message_id,
            "offer notification dispatched"
        );
        Ok(DeliveryReceipt { message_id })
    }
}

/// Keeps delivered notifications in memory; can be told to fail.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    delivered: Arc<Mutex<Vec<OfferNotification>>>,
    fail: bool,
}

impl InMemoryNotifier {
    pub fn failing() -> Self {
        Self { delivered: Arc::default(), fail: true }
    }

    pub fn delivered(&self) -> Vec<OfferNotification> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn deliver(
        &self,
        notification: &OfferNotification,
    ) -> Result<DeliveryReceipt, NotificationError> {
        if self.fail {
            return Err(NotificationError::Delivery("transport unavailable".to_owned()));
        }
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(notification.clone()),
            Err(poisoned) => poisoned.into_inner().push(notification.clone()),
        }
        Ok(DeliveryReceipt { message_id: format!("mem_{}", Uuid::new_v4().simple()) })
    }
}
