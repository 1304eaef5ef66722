//! Response status kinds carried by every command response envelope.

use serde::{Deserialize, Serialize};

/// Outcome class of one management command, mapped onto the numeric
/// `status` attribute of the response element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// The command succeeded.
    Ok,
    /// A resource was created; the response carries its id.
    Created,
    /// The request was accepted and will complete asynchronously.
    Requested,
    /// The command was malformed or failed validation.
    Syntax,
    /// The session has not authenticated.
    Unauthenticated,
    /// The operation is not permitted on this resource.
    Forbidden,
    /// A referenced resource does not exist.
    NotFound,
    /// The resource is in use or already active.
    Busy,
    /// The backend or storage layer failed.
    Internal,
    /// An upstream service is unavailable.
    ServiceDown,
}

impl StatusKind {
    /// Numeric wire code for the `status` attribute.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::Requested => 202,
            Self::Syntax => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Busy => 409,
            Self::Internal => 500,
            Self::ServiceDown => 503,
        }
    }

    /// Canonical `status_text` used when a command supplies no specific text.
    #[must_use]
    pub fn default_text(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "OK, resource created",
            Self::Requested => "OK, request submitted",
            Self::Syntax => "Syntax error",
            Self::Unauthenticated => "Authenticate first",
            Self::Forbidden => "Permission denied",
            Self::NotFound => "Failed to find resource",
            Self::Busy => "Resource busy",
            Self::Internal => "Internal error",
            Self::ServiceDown => "Service temporarily down",
        }
    }

    /// Whether the status reports success (2xx).
    #[must_use]
    pub fn is_success(self) -> bool {
        self.code() < 400
    }
}
