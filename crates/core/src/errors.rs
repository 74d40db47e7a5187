use serde::Serialize;
use thiserror::Error;

use crate::domain::offer::OfferStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid `{field}`: {message}")]
    Validation { field: String, message: String },
    #[error("invalid offer transition from {from} to {to}")]
    InvalidTransition { from: OfferStatus, to: OfferStatus },
    #[error("{entity} `{id}` not found in offer")]
    UnknownMember { entity: &'static str, id: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }
}

/// Stable, machine-readable error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    NotFound,
    Conflict,
    Persistence,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InvalidTransition => "invalid_transition",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Persistence => "persistence",
            Self::Configuration => "configuration",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::Validation { .. }) => ErrorKind::Validation,
            Self::Domain(DomainError::InvalidTransition { .. }) => ErrorKind::InvalidTransition,
            Self::Domain(DomainError::UnknownMember { .. }) | Self::NotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested offer or record does not exist.",
            Self::Conflict { .. } => {
                "The offer changed or is not in a state that allows this action."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value.kind() {
            ErrorKind::Validation => Self::BadRequest { message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::InvalidTransition | ErrorKind::Conflict => {
                Self::Conflict { message, correlation_id }
            }
            ErrorKind::Persistence => Self::ServiceUnavailable { message, correlation_id },
            ErrorKind::Configuration => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::offer::OfferStatus;
    use crate::errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::validation("quantity", "must not be negative"))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let error = ApplicationError::from(DomainError::InvalidTransition {
            from: OfferStatus::Accepted,
            to: OfferStatus::Sent,
        });

        assert_eq!(error.kind(), ErrorKind::InvalidTransition);
        assert_eq!(error.to_string(), "invalid offer transition from ACCEPTED to SENT");
        assert!(matches!(error.into_interface("req-2"), InterfaceError::Conflict { .. }));
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(ApplicationError::not_found("offer", "o-1").kind().as_str(), "not_found");
        assert_eq!(ApplicationError::Conflict("already signed".into()).kind().as_str(), "conflict");
        assert_eq!(
            ApplicationError::from(DomainError::UnknownMember {
                entity: "article",
                id: "a-1".into()
            })
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("invalid link secret".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
