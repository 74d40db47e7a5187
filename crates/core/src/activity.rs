use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::offer::OfferId;
use crate::errors::DomainError;
use crate::tenancy::TenantId;

pub const SYSTEM_ACTOR: &str = "system";
pub const PUBLIC_LINK_ACTOR: &str = "public-link";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Created,
    Sent,
    Viewed,
    Signed,
    Rejected,
    Expired,
    Restored,
    Duplicated,
    VersionCreated,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 9] = [
        Self::Created,
        Self::Sent,
        Self::Viewed,
        Self::Signed,
        Self::Rejected,
        Self::Expired,
        Self::Restored,
        Self::Duplicated,
        Self::VersionCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Sent => "SENT",
            Self::Viewed => "VIEWED",
            Self::Signed => "SIGNED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Restored => "RESTORED",
            Self::Duplicated => "DUPLICATED",
            Self::VersionCreated => "VERSION_CREATED",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| DomainError::validation("activity.kind", format!("unknown `{value}`")))
    }
}

/// One entry of an offer's activity log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: String,
    pub tenant_id: TenantId,
    pub offer_id: OfferId,
    pub kind: ActivityKind,
    pub actor: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        tenant_id: TenantId,
        offer_id: OfferId,
        kind: ActivityKind,
        actor: impl Into<String>,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            tenant_id,
            offer_id,
            kind,
            actor: actor.into(),
            description: description.into(),
            metadata: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait ActivitySink: Send + Sync {
    fn emit(&self, event: ActivityEvent);
}

/// Collects events in memory. The offer service uses one per operation and
/// drains it into the surrounding transaction.
#[derive(Clone, Default)]
pub struct InMemoryActivitySink {
    events: Arc<Mutex<Vec<ActivityEvent>>>,
}

impl InMemoryActivitySink {
    pub fn events(&self) -> Vec<ActivityEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn drain(&self) -> Vec<ActivityEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ActivitySink for InMemoryActivitySink {
    fn emit(&self, event: ActivityEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ActivityEvent, ActivityKind, ActivitySink, InMemoryActivitySink};
    use crate::domain::offer::OfferId;
    use crate::tenancy::TenantId;

    #[test]
    fn sink_records_and_drains_events() {
        let sink = InMemoryActivitySink::default();
        sink.emit(
            ActivityEvent::new(
                TenantId("tenant-a".to_owned()),
                OfferId("offer-1".to_owned()),
                ActivityKind::VersionCreated,
                "user:u-1",
                "Version 2 created",
                Utc::now(),
            )
            .with_metadata("version", "2"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.get("version").map(String::as_str), Some("2"));

        assert_eq!(sink.drain().len(), 1);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn kind_tags_parse_back() {
        for kind in ActivityKind::ALL {
            assert_eq!(kind.as_str().parse::<ActivityKind>(), Ok(kind));
        }
        assert!("ARCHIVED".parse::<ActivityKind>().is_err());
    }
}
