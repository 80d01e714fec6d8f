use thiserror::Error;

use crate::identity::IdentityError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request state value {0}")]
    InvalidState(i64),
    #[error("invalid request id `{0}`")]
    InvalidRequestId(String),
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("invalid listing filter: {0}")]
    InvalidFilter(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("caller is not authenticated")]
    Unauthenticated,
    #[error("caller `{caller}` may not access requests owned by `{owner}`")]
    Forbidden { caller: String, owner: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request {0} was modified concurrently")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<IdentityError> for ApplicationError {
    fn from(_: IdentityError) -> Self {
        Self::Unauthenticated
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Authentication is required to access this resource.",
            Self::Forbidden { .. } => "You are not allowed to access this reimbursement request.",
            Self::NotFound { .. } => "No matching reimbursement request was found.",
            Self::Conflict { .. } => {
                "The request was changed by someone else. Reload it and try again."
            }
            Self::Internal { .. } => "The request failed to process.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
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
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Processing failures are the only class whose detail stays server-side.
    pub fn is_processing_failure(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Configuration(_))
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Unauthenticated => Self::Unauthorized {
                message: "missing or unrecognised bearer token".to_owned(),
                correlation_id,
            },
            error @ ApplicationError::Forbidden { .. } => {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            error @ ApplicationError::Conflict(_) => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}
