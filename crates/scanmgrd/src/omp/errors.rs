//! Command-level failures and their mapping onto response statuses.

use thiserror::Error;

use scanmgr_types::{ResourceKind, StatusKind};

use crate::backend::BackendError;
use crate::taskctl::ControlError;

/// Failure of one management command.
///
/// Every variant corresponds to exactly one response status; the variant's
/// text becomes the `status_text` the client sees, except for `Internal`
/// and `ServiceDown` whose details are logged rather than leaked.
#[derive(Debug, Error)]
pub enum OmpError {
    /// Malformed or unexpected command shape; user-correctable.
    #[error("{0}")]
    Syntax(String),
    /// The session has not authenticated.
    #[error("authenticate first")]
    Unauthenticated,
    /// The operation is not permitted on this resource.
    #[error("permission denied")]
    Forbidden,
    /// A referenced resource does not exist.
    #[error("failed to find {kind} '{id}'")]
    NotFound { kind: ResourceKind, id: String },
    /// The resource is in use or already active.
    #[error("{0}")]
    Busy(String),
    /// Backend or storage failure; always logged.
    #[error("internal error: {0}")]
    Internal(String),
    /// An upstream service is unavailable.
    #[error("service temporarily down: {0}")]
    ServiceDown(String),
}

impl OmpError {
    /// Builds a syntax error with the given reason text.
    pub fn syntax(reason: impl Into<String>) -> Self {
        Self::Syntax(reason.into())
    }

    /// Builds an internal error with the given detail.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Response status this failure maps to.
    #[must_use]
    pub fn status(&self) -> StatusKind {
        match self {
            Self::Syntax(_) => StatusKind::Syntax,
            Self::Unauthenticated => StatusKind::Unauthenticated,
            Self::Forbidden => StatusKind::Forbidden,
            Self::NotFound { .. } => StatusKind::NotFound,
            Self::Busy(_) => StatusKind::Busy,
            Self::Internal(_) => StatusKind::Internal,
            Self::ServiceDown(_) => StatusKind::ServiceDown,
        }
    }

    /// Text for the `status_text` response attribute.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Syntax(reason) | Self::Busy(reason) => reason.clone(),
            Self::Unauthenticated => StatusKind::Unauthenticated.default_text().to_string(),
            Self::Forbidden => StatusKind::Forbidden.default_text().to_string(),
            Self::NotFound { kind, id } => format!("Failed to find {kind} '{id}'"),
            Self::Internal(_) => StatusKind::Internal.default_text().to_string(),
            Self::ServiceDown(_) => StatusKind::ServiceDown.default_text().to_string(),
        }
    }
}

impl From<BackendError> for OmpError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Storage(detail) => Self::Internal(detail),
            BackendError::Conflict(reason) => Self::Busy(reason),
            BackendError::Invalid(reason) => Self::Syntax(reason),
            BackendError::Unavailable(detail) => Self::ServiceDown(detail),
        }
    }
}

impl From<ControlError> for OmpError {
    fn from(error: ControlError) -> Self {
        match error {
            ControlError::ScanSlotBusy => {
                Self::Busy("A scan is already active in this process".to_string())
            }
            ControlError::TaskActive => Self::Busy("Task is active".to_string()),
            ControlError::WrongState { status } => Self::syntax(format!("Task is {status}")),
            ControlError::ReservedTask => Self::Forbidden,
            ControlError::Backend(backend) => backend.into(),
            ControlError::Worker(detail) => Self::Internal(detail),
        }
    }
}
